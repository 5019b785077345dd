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

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use mime::Mime;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::browser::BrowserSession;
use crate::callback::{CallbackError, CallbackRegistry, CrawlEvent, EventDetail, EventKind};
use crate::candidate::CrawlCandidate;
use crate::delay::{DelayController, LoadTimeHandle};
use crate::frontier::{CrawlFrontier, FrontierError};
use crate::probe::{HttpProbe, ProbeError, ProbeResponse};
use crate::request::{CrawlRequest, RequestError};
use crate::stats::{Outcome, StatsCounter};

/// Requests fed in by [crate::session::SessionController::crawl] while a
/// crawl is running, picked up by the loop between candidates. A plain
/// `Mutex<Vec<_>>` inbox, the same shape as the teacher's
/// `contexts/inmemory.rs::data_urls` field, rather than sharing the
/// frontier itself across the session/loop boundary.
pub type PendingRequests = Arc<Mutex<Vec<CrawlRequest>>>;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("browser session error: {0}")]
    Browser(String),
    #[error(transparent)]
    Frontier(#[from] FrontierError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Callback(#[from] CallbackError),
    #[error("browser session reported no navigation record after a successful open() call")]
    MissingNavigationRecord,
}

/// Drives candidates out of a [CrawlFrontier] one at a time: HEAD probe,
/// redirect/content-type triage, browser fetch, outcome classification,
/// stats and callback dispatch.
///
/// Owns the pacing (the [DelayController]) and the cooperative shutdown
/// signal; everything else it touches is borrowed per call so the same
/// loop can be driven across a resumed session with a fresh frontier.
pub struct CrawlLoop {
    delay: DelayController,
    load_time_handle: Option<LoadTimeHandle>,
    stats: Arc<StatsCounter>,
    cancellation: CancellationToken,
    pending: PendingRequests,
    started: bool,
}

impl CrawlLoop {
    pub fn new(
        delay: DelayController,
        load_time_handle: Option<LoadTimeHandle>,
        stats: Arc<StatsCounter>,
        cancellation: CancellationToken,
        pending: PendingRequests,
    ) -> Self {
        Self {
            delay,
            load_time_handle,
            stats,
            cancellation,
            pending,
            started: false,
        }
    }

    /// Runs until the frontier is empty or `cancellation` fires. Requests
    /// fed in via `pending` are drained into the frontier before every
    /// emptiness check, so a `crawl()` call racing against the tail of the
    /// run is not missed.
    pub async fn run<B, P>(
        &mut self,
        frontier: &mut CrawlFrontier,
        session: &mut B,
        probe: &P,
        callbacks: &CallbackRegistry,
    ) -> Result<(), LoopError>
    where
        B: BrowserSession,
        P: HttpProbe,
    {
        loop {
            if self.cancellation.is_cancelled() {
                debug!("crawl loop stopping: cancellation requested");
                break;
            }
            self.drain_pending(frontier)?;
            if !frontier.has_next_candidate() {
                break;
            }
            self.step(frontier, session, probe, callbacks).await?;
        }
        Ok(())
    }

    /// Feeds every request queued by `crawl()`/`crawl_many()` since the
    /// last drain into the frontier, as seeds (no parent candidate to
    /// derive a referer/depth from).
    fn drain_pending(&self, frontier: &mut CrawlFrontier) -> Result<(), LoopError> {
        let queued: Vec<CrawlRequest> = {
            let mut guard = self.pending.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for request in queued {
            frontier.feed_request(request, true)?;
        }
        Ok(())
    }

    /// Processes exactly one candidate. Returns `false` if the frontier
    /// was already empty.
    pub async fn step<B, P>(
        &mut self,
        frontier: &mut CrawlFrontier,
        session: &mut B,
        probe: &P,
        callbacks: &CallbackRegistry,
    ) -> Result<bool, LoopError>
    where
        B: BrowserSession,
        P: HttpProbe,
    {
        self.drain_pending(frontier)?;
        if !frontier.has_next_candidate() {
            return Ok(false);
        }

        if self.started {
            let wait_ms = self.delay.next();
            if wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
        }
        self.started = true;

        let Some(candidate) = frontier.next_candidate() else {
            return Ok(false);
        };
        let url = candidate.request().url().clone();
        debug!("probing {url}");

        let probe_response = match probe.head(&url).await {
            Ok(response) => response,
            Err(error) => {
                self.finish(
                    callbacks,
                    &candidate,
                    Outcome::NetworkError,
                    EventKind::NetworkError,
                    EventDetail::NetworkError {
                        message: error.to_string(),
                    },
                )?;
                return Ok(true);
            }
        };

        if probe_response.status.is_redirection() {
            if let Some(redirect_url) = resolve_redirect(&probe_response, &url) {
                let redirected = candidate.request().with_url(redirect_url.clone())?;
                frontier.feed_request(redirected, false)?;
                self.finish(
                    callbacks,
                    &candidate,
                    Outcome::RequestRedirect,
                    EventKind::RequestRedirect,
                    EventDetail::Redirect { redirect_url },
                )?;
                return Ok(true);
            }
            // 3xx with no (or unresolvable) Location falls through to
            // content-type classification below.
        }

        let mime = content_type_of(&probe_response);
        if mime != "text/html" {
            self.finish(
                callbacks,
                &candidate,
                Outcome::NonHtmlResponse,
                EventKind::NonHtmlResponse,
                EventDetail::NonHtmlResponse { mime },
            )?;
            return Ok(true);
        }

        self.fetch_with_browser(frontier, session, probe, callbacks, candidate, &url)
            .await?;
        Ok(true)
    }

    async fn fetch_with_browser<B, P>(
        &mut self,
        frontier: &mut CrawlFrontier,
        session: &mut B,
        probe: &P,
        callbacks: &CallbackRegistry,
        candidate: CrawlCandidate,
        url: &Url,
    ) -> Result<(), LoopError>
    where
        B: BrowserSession,
        P: HttpProbe,
    {
        session
            .start_capture()
            .map_err(|error| LoopError::Browser(error.to_string()))?;

        if let Err(error) = session.open(url) {
            self.finish(
                callbacks,
                &candidate,
                Outcome::PageLoadTimeout,
                EventKind::PageLoadTimeout,
                EventDetail::PageLoadTimeout,
            )?;
            warn!("navigation to {url} did not complete: {error}");
            return Ok(());
        }

        let navigation = session
            .last_navigation()
            .map_err(|error| LoopError::Browser(error.to_string()))?;

        crate::cookies::sync_browser_cookies_into_probe(session, probe)
            .map_err(|error| LoopError::Browser(error.to_string()))?;

        // A successful start_capture()+open() must leave a navigation
        // record behind; its absence is a fatal violation of the
        // BrowserSession contract, not a recoverable per-candidate outcome.
        let Some(record) = navigation else {
            return Err(LoopError::MissingNavigationRecord);
        };

        let committed_url = session.current_url().ok();
        let redirect_target = record
            .redirect_url
            .clone()
            .or_else(|| committed_url.filter(|committed| committed != url));

        let (outcome, kind, detail) = if let Some(message) = &record.transport_error {
            (
                Outcome::NetworkError,
                EventKind::NetworkError,
                EventDetail::NetworkError {
                    message: message.clone(),
                },
            )
        } else if let Some(redirect_url) = redirect_target {
            let redirected = candidate.request().with_url(redirect_url.clone())?;
            frontier.feed_request(redirected, false)?;
            (
                Outcome::RequestRedirect,
                EventKind::RequestRedirect,
                EventDetail::Redirect { redirect_url },
            )
        } else if matches!(record.status, Some(status) if status.is_client_error() || status.is_server_error())
        {
            let status = record.status.expect("matched Some above").as_u16();
            (
                Outcome::ResponseError,
                EventKind::ResponseError,
                EventDetail::ResponseError { status },
            )
        } else {
            (
                Outcome::ResponseSuccess,
                EventKind::ResponseSuccess,
                EventDetail::ResponseSuccess,
            )
        };

        if let Some(handle) = &self.load_time_handle {
            if let Some(load_time_ms) = record.load_time_ms {
                handle.set(load_time_ms);
            }
        }

        self.finish(callbacks, &candidate, outcome, kind, detail)
    }

    fn finish(
        &self,
        callbacks: &CallbackRegistry,
        candidate: &CrawlCandidate,
        outcome: Outcome,
        kind: EventKind,
        detail: EventDetail,
    ) -> Result<(), LoopError> {
        self.stats.record_outcome(outcome);
        let event = CrawlEvent {
            kind,
            url: candidate.request().url().clone(),
            candidate: candidate.clone(),
            detail,
        };
        callbacks.dispatch(&event)?;
        Ok(())
    }
}

/// Extracts the media-type token of the `Content-Type` header (its
/// `essence_str`, i.e. `type/subtype` with any `;` parameters and case
/// stripped by the `mime` crate). Defaults to `text/plain` when the
/// header is absent or fails to parse as a [Mime], matching the
/// conservative default a probe-only response warrants.
fn content_type_of(response: &ProbeResponse) -> String {
    response
        .headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Mime>().ok())
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "text/plain".to_string())
}

/// Resolves a redirect's `Location` header against the URL that produced
/// it. Returns `None` if the header is missing or fails to resolve, in
/// which case the caller treats the response as non-redirect content.
fn resolve_redirect(response: &ProbeResponse, base: &Url) -> Option<Url> {
    let location = response
        .headers
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())?;
    base.join(location).ok()
}


/// Exercises [CrawlLoop::step] end to end against mocked [BrowserSession]/
/// [HttpProbe] implementations, rather than the hand-written stub structs
/// the rest of the crate's test modules use -- this is the one seam where
/// every call matters for outcome classification, so the expectations are
/// worth spelling out individually.
#[cfg(test)]
mod mocked {
    use super::*;
    use crate::browser::{BrowserCookie, BrowserError, NavigationRecord};
    use crate::config::CrawlerConfiguration;
    use crate::request::CrawlRequest;
    use mockall::mock;
    use reqwest::header::HeaderMap;

    mock! {
        Session {}

        impl BrowserSession for Session {
            type Error = BrowserError;

            fn open(&mut self, url: &Url) -> Result<(), BrowserError>;
            fn current_url(&self) -> Result<Url, BrowserError>;
            fn cookies(&self) -> Result<Vec<BrowserCookie>, BrowserError>;
            fn start_capture(&mut self) -> Result<(), BrowserError>;
            fn last_navigation(&self) -> Result<Option<NavigationRecord>, BrowserError>;
            fn eval(&mut self, script: &str) -> Result<String, BrowserError>;
            fn close(&mut self) -> Result<(), BrowserError>;
        }
    }

    mock! {
        Probe {}

        impl HttpProbe for Probe {
            async fn head(&self, url: &Url) -> Result<ProbeResponse, ProbeError>;
            async fn get(&self, url: &Url) -> Result<(ProbeResponse, bytes::Bytes), ProbeError>;
            fn sync_cookie(&self, cookie: &BrowserCookie);
        }
    }

    fn html_response(url: &Url) -> ProbeResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "text/html; charset=utf-8".parse().unwrap(),
        );
        ProbeResponse {
            status: StatusCode::OK,
            headers,
            final_url: url.clone(),
        }
    }

    fn seeded_frontier(stats: Arc<StatsCounter>) -> CrawlFrontier {
        let configuration = CrawlerConfiguration::builder()
            .seed(CrawlRequest::parse("https://example.com/", 0, None).unwrap())
            .build()
            .unwrap();
        let mut frontier = CrawlFrontier::new(&configuration, stats);
        frontier
            .feed_seeds(configuration.crawl_seeds().iter().cloned())
            .unwrap();
        frontier
    }

    #[tokio::test]
    async fn successful_navigation_is_classified_as_response_success() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));
        probe.expect_sync_cookie().returning(|_| {});

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session.expect_open().returning(|_| Ok(()));
        session.expect_cookies().returning(Vec::new);
        session
            .expect_current_url()
            .returning(|| Ok(Url::parse("https://example.com/").unwrap()));
        session.expect_last_navigation().returning(|| {
            Ok(Some(NavigationRecord {
                requested_url: Url::parse("https://example.com/").unwrap(),
                status: Some(StatusCode::OK),
                redirect_url: None,
                transport_error: None,
                load_time_ms: Some(42),
            }))
        });

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        let processed = crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        assert!(processed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.response_success, 1);
        assert_eq!(snapshot.network_error + snapshot.response_error, 0);
    }

    #[tokio::test]
    async fn committed_url_diverging_from_requested_is_classified_as_redirect() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));
        probe.expect_sync_cookie().returning(|_| {});

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session.expect_open().returning(|_| Ok(()));
        session.expect_cookies().returning(Vec::new);
        session
            .expect_current_url()
            .returning(|| Ok(Url::parse("https://example.com/landed").unwrap()));
        session.expect_last_navigation().returning(|| {
            Ok(Some(NavigationRecord {
                requested_url: Url::parse("https://example.com/").unwrap(),
                status: Some(StatusCode::OK),
                redirect_url: None,
                transport_error: None,
                load_time_ms: Some(10),
            }))
        });

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        assert_eq!(stats.snapshot().request_redirect, 1);
        // The redirected URL must have been re-admitted as a new candidate.
        assert!(frontier.has_next_candidate());
        let next = frontier.next_candidate().unwrap();
        assert_eq!(next.request().url().as_str(), "https://example.com/landed");
    }

    #[tokio::test]
    async fn missing_navigation_record_after_successful_open_is_fatal() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session.expect_open().returning(|_| Ok(()));
        session.expect_cookies().returning(Vec::new);
        session.expect_last_navigation().returning(|| Ok(None));

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        let error = crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap_err();

        assert!(matches!(error, LoopError::MissingNavigationRecord));
    }

    #[tokio::test]
    async fn navigation_with_transport_error_is_classified_as_network_error() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));
        probe.expect_sync_cookie().returning(|_| {});

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session.expect_open().returning(|_| Ok(()));
        session.expect_cookies().returning(Vec::new);
        session
            .expect_current_url()
            .returning(|| Ok(Url::parse("https://example.com/").unwrap()));
        session.expect_last_navigation().returning(|| {
            Ok(Some(NavigationRecord {
                requested_url: Url::parse("https://example.com/").unwrap(),
                status: None,
                redirect_url: None,
                transport_error: Some("dns resolution failed".to_string()),
                load_time_ms: None,
            }))
        });

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        assert_eq!(stats.snapshot().network_error, 1);
    }

    /// A transport error takes priority over a divergent committed URL,
    /// even though both signals are present on the same navigation record.
    #[tokio::test]
    async fn transport_error_outranks_a_concurrent_redirect_signal() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));
        probe.expect_sync_cookie().returning(|_| {});

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session.expect_open().returning(|_| Ok(()));
        session.expect_cookies().returning(Vec::new);
        session
            .expect_current_url()
            .returning(|| Ok(Url::parse("https://example.com/landed").unwrap()));
        session.expect_last_navigation().returning(|| {
            Ok(Some(NavigationRecord {
                requested_url: Url::parse("https://example.com/").unwrap(),
                status: None,
                redirect_url: None,
                transport_error: Some("connection reset".to_string()),
                load_time_ms: None,
            }))
        });

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.network_error, 1);
        assert_eq!(snapshot.request_redirect, 0);
    }

    #[tokio::test]
    async fn open_failure_is_classified_as_page_load_timeout() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| Ok(html_response(url)));

        let mut session = MockSession::new();
        session.expect_start_capture().returning(|| Ok(()));
        session
            .expect_open()
            .returning(|_| Err(BrowserError::Timeout));

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        assert_eq!(stats.snapshot().page_load_timeout, 1);
    }

    #[tokio::test]
    async fn non_html_response_skips_the_browser_entirely() {
        let mut probe = MockProbe::new();
        probe.expect_head().returning(|url| {
            let mut headers = HeaderMap::new();
            headers.insert(
                reqwest::header::CONTENT_TYPE,
                "application/pdf".parse().unwrap(),
            );
            Ok(ProbeResponse {
                status: StatusCode::OK,
                headers,
                final_url: url.clone(),
            })
        });

        // No start_capture/open expectations: the browser must never be
        // touched for a non-HTML response.
        let mut session = MockSession::new();

        let stats = Arc::new(StatsCounter::new());
        let mut frontier = seeded_frontier(stats.clone());
        let callbacks = CallbackRegistry::new();
        let mut crawl_loop = CrawlLoop::new(
            DelayController::fixed(0),
            None,
            stats.clone(),
            CancellationToken::new(),
            Arc::new(std::sync::Mutex::new(Vec::new())),
        );

        crawl_loop
            .step(&mut frontier, &mut session, &probe, &callbacks)
            .await
            .unwrap();

        assert_eq!(stats.snapshot().non_html_response, 1);
    }
}
