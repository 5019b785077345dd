// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::candidate::CrawlCandidate;

/// The six terminal event kinds a candidate can be dispatched under.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EventKind {
    NetworkError,
    RequestRedirect,
    NonHtmlResponse,
    PageLoadTimeout,
    ResponseError,
    ResponseSuccess,
}

const ALL_EVENT_KINDS: [EventKind; 6] = [
    EventKind::NetworkError,
    EventKind::RequestRedirect,
    EventKind::NonHtmlResponse,
    EventKind::PageLoadTimeout,
    EventKind::ResponseError,
    EventKind::ResponseSuccess,
];

/// The detail carried alongside a terminal event, specific to its kind.
#[derive(Debug, Clone)]
pub enum EventDetail {
    NetworkError { message: String },
    Redirect { redirect_url: Url },
    NonHtmlResponse { mime: String },
    PageLoadTimeout,
    ResponseError { status: u16 },
    ResponseSuccess,
}

/// A terminal event dispatched to user callbacks. Owns a clone of the
/// candidate that produced it, so handlers are free to hold on to the
/// event after the call returns without reaching back into frontier
/// state.
#[derive(Debug, Clone)]
pub struct CrawlEvent {
    pub kind: EventKind,
    pub url: Url,
    pub candidate: CrawlCandidate,
    pub detail: EventDetail,
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback handler failed: {0}")]
    HandlerFailed(String),
}

pub type Handler = Arc<dyn Fn(&CrawlEvent) -> Result<(), CallbackError> + Send + Sync>;

/// Maps (event kind, URL pattern) to user handlers, with one default
/// handler per event kind as a fallback.
pub struct CallbackRegistry {
    patterned: HashMap<EventKind, Vec<(Regex, Handler)>>,
    defaults: HashMap<EventKind, Handler>,
}

impl CallbackRegistry {
    /// Builds a registry whose defaults are all no-ops; override them
    /// with [CallbackRegistry::set_default].
    pub fn new() -> Self {
        let noop: Handler = Arc::new(|_event| Ok(()));
        let defaults = ALL_EVENT_KINDS
            .into_iter()
            .map(|kind| (kind, noop.clone()))
            .collect();
        Self {
            patterned: HashMap::new(),
            defaults,
        }
    }

    /// Registers a handler invoked for any URL fully matching `pattern`,
    /// in addition to any previously-registered handlers for this
    /// event kind. Registration order determines dispatch order.
    pub fn register_custom_callback(&mut self, kind: EventKind, pattern: Regex, handler: Handler) {
        self.patterned
            .entry(kind)
            .or_default()
            .push((pattern, handler));
    }

    pub fn set_default(&mut self, kind: EventKind, handler: Handler) {
        self.defaults.insert(kind, handler);
    }

    /// Dispatches `event`: every registered pattern matching the event's
    /// URL fires, in registration order, and the default is skipped. If
    /// nothing matches, only the default fires. The first handler error
    /// aborts dispatch and propagates.
    pub fn dispatch(&self, event: &CrawlEvent) -> Result<(), CallbackError> {
        let url = event.url.as_str();
        let matching: Vec<&Handler> = self
            .patterned
            .get(&event.kind)
            .into_iter()
            .flatten()
            .filter(|(pattern, _)| full_match(pattern, url))
            .map(|(_, handler)| handler)
            .collect();

        if matching.is_empty() {
            if let Some(default) = self.defaults.get(&event.kind) {
                default(event)?;
            }
        } else {
            for handler in matching {
                handler(event)?;
            }
        }
        Ok(())
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn full_match(pattern: &Regex, text: &str) -> bool {
    pattern
        .find(text)
        .is_some_and(|found| found.start() == 0 && found.end() == text.len())
}
