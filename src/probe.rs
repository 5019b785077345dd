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

use std::sync::Arc;

use bytes::Bytes;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use url::Url;

use crate::browser::BrowserCookie;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transport failure while probing {url}: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest_middleware::Error,
    },
}

/// The response to a single HEAD or GET probe. `final_url` equals the
/// requested URL, since the probe never follows redirects itself -- the
/// crawl loop decides what to do with a 3xx.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub final_url: Url,
}

/// The opaque capability the crawl loop consumes for lightweight HTTP
/// probing ahead of a full browser fetch.
pub trait HttpProbe: Send + Sync {
    async fn head(&self, url: &Url) -> Result<ProbeResponse, ProbeError>;

    /// Used only by the `download_file` helper, not the crawl loop proper.
    async fn get(&self, url: &Url) -> Result<(ProbeResponse, Bytes), ProbeError>;

    /// Upserts a cookie observed in the browser into this probe's jar,
    /// replacing any existing cookie of the same name/domain/path.
    fn sync_cookie(&self, cookie: &BrowserCookie);
}

/// A [HttpProbe] built the way the teacher project builds its classic
/// client: no automatic redirects (the crawl loop owns redirect
/// handling), brotli/gzip/deflate negotiation, a dedicated cookie jar,
/// wrapped in `reqwest_middleware` so a retry/throttling layer can be
/// inserted later without changing this trait's contract.
pub struct ReqwestProbe {
    client: ClientWithMiddleware,
    jar: Arc<Jar>,
}

impl ReqwestProbe {
    pub fn new(user_agent: impl AsRef<str>) -> Result<Self, reqwest::Error> {
        let jar = Arc::new(Jar::default());
        let inner = reqwest::Client::builder()
            .user_agent(user_agent.as_ref())
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(jar.clone())
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .build()?;
        let client = reqwest_middleware::ClientBuilder::new(inner).build();
        Ok(Self { client, jar })
    }
}

impl HttpProbe for ReqwestProbe {
    async fn head(&self, url: &Url) -> Result<ProbeResponse, ProbeError> {
        let response =
            self.client
                .head(url.clone())
                .send()
                .await
                .map_err(|source| ProbeError::Transport {
                    url: url.clone(),
                    source,
                })?;
        Ok(ProbeResponse {
            status: response.status(),
            headers: response.headers().clone(),
            final_url: url.clone(),
        })
    }

    async fn get(&self, url: &Url) -> Result<(ProbeResponse, Bytes), ProbeError> {
        let response =
            self.client
                .get(url.clone())
                .send()
                .await
                .map_err(|source| ProbeError::Transport {
                    url: url.clone(),
                    source,
                })?;
        let probe_response = ProbeResponse {
            status: response.status(),
            headers: response.headers().clone(),
            final_url: url.clone(),
        };
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ProbeError::Transport {
                url: url.clone(),
                source: reqwest_middleware::Error::Reqwest(source),
            })?;
        Ok((probe_response, bytes))
    }

    fn sync_cookie(&self, cookie: &BrowserCookie) {
        let Ok(domain_url) = Url::parse(&format!("https://{}{}", cookie.domain, cookie.path))
        else {
            return;
        };
        let mut header_value = format!("{}={}; Domain={}; Path={}", cookie.name, cookie.value, cookie.domain, cookie.path);
        if let Some(expires_at) = cookie.expires {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|since_epoch| since_epoch.as_secs() as i64)
                .unwrap_or(0);
            header_value.push_str(&format!("; Max-Age={}", (expires_at - now).max(0)));
        }
        if cookie.secure {
            header_value.push_str("; Secure");
        }
        if cookie.http_only {
            header_value.push_str("; HttpOnly");
        }
        self.jar.add_cookie_str(&header_value, &domain_url);
    }
}
