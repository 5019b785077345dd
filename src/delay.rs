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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use thiserror::Error;

use crate::browser::BrowserSession;

#[derive(Debug, Error)]
pub enum DelayError {
    #[error("browser does not expose Navigation Timing, required for the adaptive delay")]
    NavigationTimingUnsupported,
}

/// A shared cell the crawl loop writes the most recent page-load
/// duration into, and [DelayController::Adaptive] reads from. Kept
/// separate from [crate::browser::BrowserSession] itself so the
/// controller's `next()` never needs mutable access to the browser.
#[derive(Debug, Clone, Default)]
pub struct LoadTimeHandle(Arc<AtomicU64>);

const NO_READING: u64 = u64::MAX;

impl LoadTimeHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(NO_READING)))
    }

    pub fn set(&self, load_time_ms: u64) {
        self.0.store(load_time_ms, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Relaxed) {
            NO_READING => None,
            value => Some(value),
        }
    }
}

/// Computes the inter-request wait. `next()` is pure for Fixed and
/// Random; Adaptive reads the [LoadTimeHandle] the crawl loop keeps
/// updated from the browser's Navigation Timing data.
#[derive(Debug, Clone)]
pub enum DelayController {
    Fixed { delay_ms: u64 },
    Random { min_delay_ms: u64, max_delay_ms: u64 },
    Adaptive {
        min_delay_ms: u64,
        max_delay_ms: u64,
        load_time: LoadTimeHandle,
    },
}

impl DelayController {
    pub fn fixed(delay_ms: u64) -> Self {
        Self::Fixed { delay_ms }
    }

    pub fn random(min_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self::Random {
            min_delay_ms,
            max_delay_ms,
        }
    }

    /// Builds the adaptive controller, probing `session` once for
    /// Navigation Timing support. Returns the controller along with the
    /// handle the caller must keep updated (see
    /// [crate::loop_::CrawlLoop]) after every browser navigation.
    pub fn adaptive<B: BrowserSession>(
        min_delay_ms: u64,
        max_delay_ms: u64,
        session: &mut B,
    ) -> Result<(Self, LoadTimeHandle), DelayError> {
        let supported = session
            .eval("typeof performance !== 'undefined' && typeof performance.timing !== 'undefined'")
            .map(|value| value.trim() == "true")
            .unwrap_or(false);
        if !supported {
            return Err(DelayError::NavigationTimingUnsupported);
        }
        let load_time = LoadTimeHandle::new();
        Ok((
            Self::Adaptive {
                min_delay_ms,
                max_delay_ms,
                load_time: load_time.clone(),
            },
            load_time,
        ))
    }

    /// Returns the next wait, in milliseconds.
    pub fn next(&self) -> u64 {
        match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Random {
                min_delay_ms,
                max_delay_ms,
            } => rand::thread_rng().gen_range(*min_delay_ms..=*max_delay_ms),
            Self::Adaptive {
                min_delay_ms,
                max_delay_ms,
                load_time,
            } => {
                let observed = load_time.get().unwrap_or(*min_delay_ms);
                observed.clamp(*min_delay_ms, *max_delay_ms)
            }
        }
    }
}
