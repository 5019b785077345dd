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

use serde::{Deserialize, Serialize};
use url::Url;

use crate::request::CrawlRequest;

/// A frontier-internal wrapper around a [CrawlRequest] that adds the
/// crawl depth and the URL of the candidate that produced it.
///
/// Seeds have `depth == 1` and no referer; every other candidate has
/// `depth == parent.depth + 1` and `referer_url == Some(parent.request.url)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlCandidate {
    pub(crate) request: CrawlRequest,
    pub(crate) referer_url: Option<Url>,
    pub(crate) depth: u32,
}

impl CrawlCandidate {
    pub fn seed(request: CrawlRequest) -> Self {
        Self {
            request,
            referer_url: None,
            depth: 1,
        }
    }

    pub fn child(request: CrawlRequest, referer_url: Url, depth: u32) -> Self {
        Self {
            request,
            referer_url: Some(referer_url),
            depth,
        }
    }

    pub fn request(&self) -> &CrawlRequest {
        &self.request
    }

    pub fn referer_url(&self) -> Option<&Url> {
        self.referer_url.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn rehydrate(&mut self) {
        self.request.rehydrate_domain();
    }
}
