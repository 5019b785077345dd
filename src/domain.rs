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

use std::fmt::{Display, Formatter};

use case_insensitive_string::CaseInsensitiveString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// A normalized, case-folded, public-suffix-qualified registrable domain.
///
/// Two domains are equal iff their label sequences are equal. `contains`
/// is a suffix test: `example.com` contains `blog.example.com`. Case
/// folding is delegated to [CaseInsensitiveString], the same crate the
/// grounding file for this module (`toolkit/domains.rs`) uses for its own
/// domain labels.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CrawlDomain {
    /// Labels ordered as in the host, e.g. `["blog", "example", "com"]`.
    parts: Vec<CaseInsensitiveString>,
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("url has no host")]
    NoHost,
    #[error("host {0:?} is not a public-suffix-qualified domain")]
    NotRegistrable(String),
}

impl CrawlDomain {
    /// Builds a domain from raw, already-ordered labels.
    fn from_labels(parts: Vec<CaseInsensitiveString>) -> Self {
        Self { parts }
    }

    /// Parses the registrable domain out of a URL's host using the public
    /// suffix list.
    pub fn from_url(url: &Url) -> Result<Self, DomainError> {
        let host = url.host_str().ok_or(DomainError::NoHost)?;
        Self::from_host(host)
    }

    /// Parses the registrable domain out of a bare host string.
    pub fn from_host(host: &str) -> Result<Self, DomainError> {
        let domain = psl::domain(host.as_bytes())
            .ok_or_else(|| DomainError::NotRegistrable(host.to_owned()))?;
        let as_str = std::str::from_utf8(domain.as_bytes())
            .map_err(|_| DomainError::NotRegistrable(host.to_owned()))?;
        let parts = as_str.split('.').map(CaseInsensitiveString::new).collect();
        Ok(Self::from_labels(parts))
    }

    /// True iff `other` is the same domain or a subdomain of `self`.
    pub fn contains(&self, other: &CrawlDomain) -> bool {
        if other.parts.len() < self.parts.len() {
            return false;
        }
        let offset = other.parts.len() - self.parts.len();
        other.parts[offset..] == self.parts[..]
    }

    pub fn as_str_parts(&self) -> &[CaseInsensitiveString] {
        &self.parts
    }
}

impl Display for CrawlDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .parts
            .iter()
            .map(|part| part.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}
