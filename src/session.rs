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

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::browser::BrowserSession;
use crate::callback::{CallbackRegistry, EventKind, Handler};
use crate::config::{CrawlerConfiguration, DelayStrategy};
use crate::delay::{DelayController, DelayError, LoadTimeHandle};
use crate::frontier::{CrawlFrontier, FrontierError, FrontierState};
use crate::loop_::{CrawlLoop, LoopError, PendingRequests};
use crate::probe::{HttpProbe, ProbeError, ProbeResponse};
use crate::request::CrawlRequest;
use crate::stats::{StatsCounter, StatsSnapshot};

type LifecycleHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is already running")]
    AlreadyRunning,
    #[error("session is not running")]
    NotRunning,
    #[error("resume requires a previously saved configuration, or snapshot() was called before any start()")]
    MissingConfiguration,
    #[error(transparent)]
    Frontier(#[from] FrontierError),
    #[error(transparent)]
    Delay(#[from] DelayError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("failed to encode or decode a session snapshot: {0}")]
    Snapshot(#[from] Box<bincode::ErrorKind>),
    #[error("failed to write downloaded file: {0}")]
    Io(#[from] std::io::Error),
}

/// The bundle persisted by [SessionController::snapshot] and restored by
/// [SessionController::resume]: configuration, frontier state, and
/// accumulated stats/run duration. The running [CrawlLoop] itself is not
/// part of the bundle -- it is rebuilt fresh on resume from the delay
/// strategy in `configuration`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionSnapshot {
    configuration: CrawlerConfiguration,
    frontier: FrontierState,
    stats: StatsSnapshot,
    run_duration_ms: u64,
}

/// Owns the full lifecycle of a crawl: seeding the frontier, driving the
/// [CrawlLoop] to completion or cancellation, and snapshotting/resuming
/// state across process restarts.
///
/// A [BrowserSession] is never stored across calls -- it is handed in by
/// the caller to [SessionController::start]/[SessionController::resume]
/// for the duration of that call only, matching the "opaque external
/// capability" contract the rest of the crate follows.
pub struct SessionController<P: HttpProbe> {
    configuration: Option<CrawlerConfiguration>,
    frontier: Option<CrawlFrontier>,
    pending: PendingRequests,
    stats: Arc<StatsCounter>,
    callbacks: CallbackRegistry,
    probe: P,
    cancellation: CancellationToken,
    running: Arc<AtomicBool>,
    run_duration: Duration,
    on_browser_init: Option<LifecycleHook>,
    on_start: Option<LifecycleHook>,
    on_stop: Option<LifecycleHook>,
}

impl<P: HttpProbe> SessionController<P> {
    pub fn new(probe: P) -> Self {
        Self {
            configuration: None,
            frontier: None,
            pending: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(StatsCounter::new()),
            callbacks: CallbackRegistry::new(),
            probe,
            cancellation: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            run_duration: Duration::ZERO,
            on_browser_init: None,
            on_start: None,
            on_stop: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn crawler_configuration(&self) -> Option<&CrawlerConfiguration> {
        self.configuration.as_ref()
    }

    pub fn crawl_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn register_custom_callback(&mut self, kind: EventKind, pattern: Regex, handler: Handler) {
        self.callbacks.register_custom_callback(kind, pattern, handler);
    }

    pub fn on_response_success(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::ResponseSuccess, handler);
    }

    pub fn on_response_error(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::ResponseError, handler);
    }

    pub fn on_network_error(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::NetworkError, handler);
    }

    pub fn on_request_redirect(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::RequestRedirect, handler);
    }

    pub fn on_non_html_response(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::NonHtmlResponse, handler);
    }

    pub fn on_page_load_timeout(&mut self, handler: Handler) {
        self.callbacks.set_default(EventKind::PageLoadTimeout, handler);
    }

    /// Registers a hook fired once per [SessionController::start]/
    /// [SessionController::resume] call, right before the browser session
    /// handed to that call is first used.
    pub fn on_browser_init(&mut self, hook: LifecycleHook) {
        self.on_browser_init = Some(hook);
    }

    pub fn on_start(&mut self, hook: LifecycleHook) {
        self.on_start = Some(hook);
    }

    /// Registers a hook fired on every exit path out of the crawl loop:
    /// frontier drained, `stop()` requested, or a fatal loop error.
    pub fn on_stop(&mut self, hook: LifecycleHook) {
        self.on_stop = Some(hook);
    }

    /// Queues one additional request to be admitted into the running
    /// frontier, the same way a configured seed is: no referer, depth 1.
    /// The crawl loop drains this queue between candidates, so a request
    /// fed in mid-run is picked up without needing direct access to the
    /// frontier the loop is driving. Takes `&self`, like [Self::stop], so
    /// it can be called from another task while [Self::start]/
    /// [Self::resume] is still awaiting the loop. Returns
    /// [SessionError::NotRunning] if no session is active.
    pub fn crawl(&self, request: CrawlRequest) -> Result<(), SessionError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SessionError::NotRunning);
        }
        self.pending.lock().unwrap().push(request);
        Ok(())
    }

    pub fn crawl_many(&self, requests: impl IntoIterator<Item = CrawlRequest>) -> Result<(), SessionError> {
        for request in requests {
            self.crawl(request)?;
        }
        Ok(())
    }

    /// Downloads `source` directly through the probe's HTTP client,
    /// bypassing the frontier and the browser entirely, and writes the
    /// body to `destination`. Only valid while a session is running.
    pub async fn download_file(&self, source: &Url, destination: &Path) -> Result<ProbeResponse, SessionError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SessionError::NotRunning);
        }
        let (response, bytes) = self.probe.get(source).await?;
        tokio::fs::write(destination, &bytes).await?;
        Ok(response)
    }

    /// Starts a fresh session: seeds the frontier from `configuration`'s
    /// seed set and drives the crawl loop until it drains or [Self::stop]
    /// is called. Fails if a session is already running.
    pub async fn start<B: BrowserSession>(
        &mut self,
        configuration: CrawlerConfiguration,
        session: &mut B,
    ) -> Result<(), SessionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning);
        }
        self.cancellation = CancellationToken::new();
        self.pending.lock().unwrap().clear();

        let mut frontier = CrawlFrontier::new(&configuration, self.stats.clone());
        if let Err(error) = frontier.feed_seeds(configuration.crawl_seeds().iter().cloned()) {
            self.running.store(false, Ordering::SeqCst);
            return Err(error.into());
        }

        let result = self.drive(configuration, frontier, session).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Restores a session from a [Self::snapshot] and drives it the same
    /// way [Self::start] does, without re-admitting the original seeds
    /// (the frontier's queue already reflects the saved state).
    pub async fn resume<B: BrowserSession>(
        &mut self,
        snapshot: &[u8],
        session: &mut B,
    ) -> Result<(), SessionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return Err(SessionError::AlreadyRunning);
        }
        self.cancellation = CancellationToken::new();
        self.pending.lock().unwrap().clear();

        let bundle: SessionSnapshot = bincode::deserialize(snapshot)?;
        let mut configuration = bundle.configuration;
        configuration.rehydrate();
        self.stats = Arc::new(StatsCounter::restore(bundle.stats));
        self.run_duration = Duration::from_millis(bundle.run_duration_ms);
        let frontier = CrawlFrontier::from_state(&configuration, self.stats.clone(), bundle.frontier);

        let result = self.drive(configuration, frontier, session).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn drive<B: BrowserSession>(
        &mut self,
        configuration: CrawlerConfiguration,
        mut frontier: CrawlFrontier,
        session: &mut B,
    ) -> Result<(), SessionError> {
        if let Some(hook) = &self.on_browser_init {
            hook();
        }
        let (delay, load_time_handle) = build_delay(&configuration, session)?;
        if let Some(hook) = &self.on_start {
            hook();
        }
        info!("crawl session starting");

        let mut crawl_loop = CrawlLoop::new(
            delay,
            load_time_handle,
            self.stats.clone(),
            self.cancellation.clone(),
            self.pending.clone(),
        );
        let started_at = Instant::now();
        let outcome = crawl_loop
            .run(&mut frontier, session, &self.probe, &self.callbacks)
            .await;
        self.run_duration += started_at.elapsed();
        self.frontier = Some(frontier);
        self.configuration = Some(configuration);

        if let Some(hook) = &self.on_stop {
            hook();
        }
        info!("crawl session stopped");
        Ok(outcome?)
    }

    /// Requests cancellation of the running crawl loop. The loop observes
    /// this cooperatively between candidates; it does not interrupt an
    /// in-flight probe or browser navigation.
    pub fn stop(&self) -> Result<(), SessionError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SessionError::NotRunning);
        }
        self.cancellation.cancel();
        Ok(())
    }

    /// Serializes configuration, frontier state, and stats into a bincode
    /// bundle. Available once at least one [Self::start]/[Self::resume]
    /// call has completed (successfully or not), since that is the point
    /// at which `configuration`/`frontier` are populated.
    pub fn snapshot(&self) -> Result<Vec<u8>, SessionError> {
        let configuration = self
            .configuration
            .clone()
            .ok_or(SessionError::MissingConfiguration)?;
        let frontier = self
            .frontier
            .as_ref()
            .ok_or(SessionError::MissingConfiguration)?
            .to_state();
        let bundle = SessionSnapshot {
            configuration,
            frontier,
            stats: self.stats.snapshot(),
            run_duration_ms: self.run_duration.as_millis() as u64,
        };
        Ok(bincode::serialize(&bundle)?)
    }
}

fn build_delay<B: BrowserSession>(
    configuration: &CrawlerConfiguration,
    session: &mut B,
) -> Result<(DelayController, Option<LoadTimeHandle>), SessionError> {
    match configuration.delay_strategy() {
        DelayStrategy::Fixed => Ok((DelayController::fixed(configuration.fixed_delay_ms()), None)),
        DelayStrategy::Random => Ok((
            DelayController::random(configuration.min_delay_ms(), configuration.max_delay_ms()),
            None,
        )),
        DelayStrategy::Adaptive => {
            let (controller, handle) = DelayController::adaptive(
                configuration.min_delay_ms(),
                configuration.max_delay_ms(),
                session,
            )?;
            Ok((controller, Some(handle)))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::browser::{BrowserCookie, NavigationRecord};
    use crate::probe::ReqwestProbe;
    use reqwest::StatusCode;

    struct StubSession {
        urls: Vec<Url>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("stub session error")]
    struct StubError;

    impl BrowserSession for StubSession {
        type Error = StubError;

        fn open(&mut self, url: &Url) -> Result<(), Self::Error> {
            self.urls.push(url.clone());
            Ok(())
        }

        fn current_url(&self) -> Result<Url, Self::Error> {
            self.urls.last().cloned().ok_or(StubError)
        }

        fn cookies(&self) -> Result<Vec<BrowserCookie>, Self::Error> {
            Ok(Vec::new())
        }

        fn start_capture(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn last_navigation(&self) -> Result<Option<NavigationRecord>, Self::Error> {
            Ok(self.urls.last().map(|url| NavigationRecord {
                requested_url: url.clone(),
                status: Some(StatusCode::OK),
                redirect_url: None,
                transport_error: None,
                load_time_ms: Some(120),
            }))
        }

        fn eval(&mut self, _script: &str) -> Result<String, Self::Error> {
            Ok("false".to_string())
        }

        fn close(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn crawl_before_start_is_rejected() {
        let mut controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        assert!(matches!(
            controller
                .crawl(CrawlRequest::parse("https://example.com/", 0, None).unwrap())
                .unwrap_err(),
            SessionError::NotRunning
        ));
    }

    /// Regression test for the bug where `crawl()` read `self.frontier`,
    /// which stayed `None` for the entire duration of a running crawl
    /// (`drive()` only populates it after the loop returns) -- `crawl()`
    /// now only depends on `running`, matching `stop()`'s own gate.
    #[tokio::test]
    async fn crawl_succeeds_while_a_session_is_marked_running() {
        let mut controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        controller.running.store(true, Ordering::SeqCst);
        controller
            .crawl(CrawlRequest::parse("https://example.com/extra", 0, None).unwrap())
            .unwrap();
        assert_eq!(controller.pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn download_file_before_start_is_rejected() {
        let controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        let destination = std::env::temp_dir().join(format!(
            "politesse-download-before-start-{}.bin",
            std::process::id()
        ));
        assert!(matches!(
            controller
                .download_file(&Url::parse("https://example.com/file").unwrap(), &destination)
                .await
                .unwrap_err(),
            SessionError::NotRunning
        ));
    }

    #[tokio::test]
    async fn start_while_already_running_is_rejected() {
        let mut controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        let config = CrawlerConfiguration::builder().build().unwrap();
        let mut session = StubSession { urls: Vec::new() };

        controller.running.store(true, Ordering::SeqCst);
        assert!(matches!(
            controller.start(config, &mut session).await.unwrap_err(),
            SessionError::AlreadyRunning
        ));
        assert!(controller.is_running(), "a rejected start must not clear the flag it didn't set");
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        assert!(matches!(controller.stop().unwrap_err(), SessionError::NotRunning));
    }

    #[tokio::test]
    async fn snapshot_before_any_run_is_rejected() {
        let controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        assert!(matches!(
            controller.snapshot().unwrap_err(),
            SessionError::MissingConfiguration
        ));
    }

    /// A seedless configuration drains the frontier before the loop ever
    /// touches the probe, so `start()` completes without any network I/O
    /// -- the snapshot/resume path is what's under test here, not the
    /// crawl itself.
    #[tokio::test]
    async fn snapshot_round_trips_through_a_file_on_disk() {
        let path = std::env::temp_dir().join(format!(
            "politesse-session-snapshot-{}-{}.bin",
            std::process::id(),
            "round_trip"
        ));
        let _cleanup = scopeguard::guard(path.clone(), |path| {
            let _ = std::fs::remove_file(path);
        });

        let mut controller = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        let config = CrawlerConfiguration::builder().fixed_delay(0).build().unwrap();
        let mut session = StubSession { urls: Vec::new() };
        controller.start(config, &mut session).await.unwrap();

        std::fs::write(&path, controller.snapshot().unwrap()).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let mut resumed = SessionController::new(ReqwestProbe::new("test-agent/1.0").unwrap());
        let mut resumed_session = StubSession { urls: Vec::new() };
        resumed.resume(&bytes, &mut resumed_session).await.unwrap();

        assert_eq!(resumed.crawl_stats(), controller.crawl_stats());
    }
}
