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

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::{CrawlDomain, DomainError};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request url is not valid: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// An immutable intent to visit one URL, with priority and optional
/// opaque metadata.
///
/// `domain` is derived from `url.host` at construction time (and
/// recomputed on deserialization, since it is not worth persisting
/// twice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    url: Url,
    priority: i64,
    metadata: Option<Arc<serde_json::Value>>,
    #[serde(skip)]
    domain: Option<CrawlDomain>,
}

impl CrawlRequest {
    /// Builds a request, normalizing an empty path to `/` and deriving
    /// the registrable domain. Fails if the host cannot be resolved to a
    /// public-suffix-qualified domain.
    pub fn new(
        mut url: Url,
        priority: i64,
        metadata: Option<Arc<serde_json::Value>>,
    ) -> Result<Self, RequestError> {
        if url.path().is_empty() {
            url.set_path("/");
        }
        let domain = CrawlDomain::from_url(&url)?;
        Ok(Self {
            url,
            priority,
            metadata,
            domain: Some(domain),
        })
    }

    pub fn parse(
        url: &str,
        priority: i64,
        metadata: Option<Arc<serde_json::Value>>,
    ) -> Result<Self, RequestError> {
        Self::new(Url::parse(url)?, priority, metadata)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn metadata(&self) -> Option<&Arc<serde_json::Value>> {
        self.metadata.as_ref()
    }

    /// The registrable domain, recomputing it if this value was just
    /// deserialized and has not been touched yet.
    pub fn domain(&self) -> CrawlDomain {
        match &self.domain {
            Some(domain) => domain.clone(),
            None => CrawlDomain::from_url(&self.url).expect("validated at construction"),
        }
    }

    /// Called once after deserialization to repopulate the derived field.
    pub(crate) fn rehydrate_domain(&mut self) {
        if self.domain.is_none() {
            self.domain = Some(
                CrawlDomain::from_url(&self.url).expect("url was valid when originally built"),
            );
        }
    }

    /// Builds a sibling request for the same logical crawl target, used
    /// when following a redirect: same priority and metadata, new url.
    pub fn with_url(&self, url: Url) -> Result<Self, RequestError> {
        Self::new(url, self.priority, self.metadata.clone())
    }
}

impl PartialEq for CrawlRequest {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.priority == other.priority
    }
}

impl Eq for CrawlRequest {}

impl Hash for CrawlRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.priority.hash(state);
    }
}
