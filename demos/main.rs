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

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;
use url::Url;

use politesse::{
    BrowserCookie, BrowserSession, CrawlDomain, CrawlRequest, CrawlStrategy, CrawlerConfiguration,
    NavigationRecord, ReqwestProbe, SessionController,
};

/// A minimal session demonstrating the crawl engine end to end against
/// a real HTTP client. Build with `--features chrome` for a session
/// backed by an actual headless Chromium instance.
#[derive(Debug, Parser)]
#[command(name = "politesse-crawl")]
struct Args {
    /// Seed URL; may be repeated.
    #[arg(long = "seed")]
    seeds: Vec<String>,

    #[arg(long, default_value = "breadth-first")]
    strategy: String,

    /// 0 means unbounded.
    #[arg(long, default_value_t = 0)]
    max_depth: u32,

    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Write a resumable snapshot here when the crawl finishes or is
    /// cancelled.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,

    /// Resume from a snapshot written by a previous run, instead of
    /// starting fresh from `--seed`.
    #[arg(long)]
    resume_from: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    allowed_domains: Vec<String>,
}

fn init_logging() -> anyhow::Result<()> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} {t} - {m}{n}")))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn load_file_config() -> anyhow::Result<FileConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("politesse").required(false))
        .add_source(config::Environment::with_prefix("POLITESSE"))
        .build()?;
    Ok(settings.try_deserialize().unwrap_or_default())
}

/// Stands in for a real browser when the crate is built without the
/// `chrome` feature: every candidate that reaches the browser stage is
/// treated as a bare success, with no cookies or navigation timing.
struct NoBrowserSession;

#[derive(Debug, thiserror::Error)]
#[error("no browser backend configured; rebuild with --features chrome")]
struct NoBrowserError;

impl BrowserSession for NoBrowserSession {
    type Error = NoBrowserError;

    fn open(&mut self, _url: &Url) -> Result<(), Self::Error> {
        Ok(())
    }

    fn current_url(&self) -> Result<Url, Self::Error> {
        Err(NoBrowserError)
    }

    fn cookies(&self) -> Result<Vec<BrowserCookie>, Self::Error> {
        Ok(Vec::new())
    }

    fn start_capture(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn last_navigation(&self) -> Result<Option<NavigationRecord>, Self::Error> {
        Ok(None)
    }

    fn eval(&mut self, _script: &str) -> Result<String, Self::Error> {
        Ok("false".to_string())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(feature = "chrome")]
async fn launch_browser_session() -> anyhow::Result<politesse::ChromiumoxideSession> {
    use futures::StreamExt;

    let config = chromiumoxide::BrowserConfig::builder()
        .build()
        .map_err(|message| anyhow::anyhow!(message))?;
    let (browser, mut handler) = chromiumoxide::Browser::launch(config).await?;
    tokio::spawn(async move { while handler.next().await.is_some() {} });
    let page = browser.new_page("about:blank").await?;
    Ok(politesse::ChromiumoxideSession::new(browser, page))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = Args::parse();
    let file_config = load_file_config()?;

    let mut builder = CrawlerConfiguration::builder()
        .strategy(if args.strategy == "depth-first" {
            CrawlStrategy::DepthFirst
        } else {
            CrawlStrategy::BreadthFirst
        })
        .max_crawl_depth(args.max_depth)
        .fixed_delay(args.delay_ms);

    for seed in &args.seeds {
        builder = builder.seed(CrawlRequest::parse(seed, 0, None)?);
    }
    for domain in &file_config.allowed_domains {
        builder = builder.allow_domain(CrawlDomain::from_host(domain)?);
    }
    if !file_config.allowed_domains.is_empty() {
        builder = builder.filter_offsite_requests(true);
    }
    let configuration = builder.build()?;

    let probe = ReqwestProbe::new("politesse-crawl/0.1")?;
    let mut controller = SessionController::new(probe);
    controller.on_response_success(Arc::new(|event| {
        info!("fetched {}", event.url);
        Ok(())
    }));
    controller.on_network_error(Arc::new(|event| {
        warn!("network error fetching {}", event.url);
        Ok(())
    }));

    #[cfg(feature = "chrome")]
    let mut session = launch_browser_session().await?;
    #[cfg(not(feature = "chrome"))]
    let mut session = NoBrowserSession;

    if let Some(path) = &args.resume_from {
        let bytes = std::fs::read(path)?;
        controller.resume(&bytes, &mut session).await?;
    } else {
        controller.start(configuration, &mut session).await?;
    }

    let stats = controller.crawl_stats();
    info!(
        "crawl finished: processed={} remaining={} errors={}",
        stats.processed,
        stats.remaining,
        stats.network_error + stats.response_error
    );

    if let Some(path) = &args.snapshot_out {
        std::fs::write(path, controller.snapshot()?)?;
        info!("snapshot written to {}", path.display());
    }

    Ok(())
}
