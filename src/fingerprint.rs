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

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// A SHA-256 fingerprint of a normalized URL, used for frontier dedup.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct UrlFingerprint(String);

impl UrlFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Computes the fingerprint of `url` per the normalization contract:
    /// lowercase scheme/host, empty path becomes `/` (and a trailing `/`
    /// on a non-root path is likewise collapsed), fragment dropped, query
    /// parameters sorted by (name, value).
    pub fn of(url: &Url) -> Self {
        let normalized = normalize(url);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(HEXLOWER.encode(&hasher.finalize()))
    }
}

fn normalize(url: &Url) -> String {
    let mut normalized = url.clone();

    let _ = normalized.set_scheme(&url.scheme().to_ascii_lowercase());
    if let Some(host) = url.host_str() {
        let _ = normalized.set_host(Some(&host.to_ascii_lowercase()));
    }

    if normalized.path().is_empty() {
        normalized.set_path("/");
    } else {
        let path = normalized.path().to_owned();
        if path.len() > 1 && path.ends_with('/') {
            normalized.set_path(&path[..path.len() - 1]);
        }
    }

    normalized.set_fragment(None);

    let mut pairs: Vec<(String, String)> = normalized
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.cmp(b));

    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        normalized
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    normalized.to_string()
}
