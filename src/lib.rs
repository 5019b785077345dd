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

//! A politeness-aware crawl engine: a priority frontier, a per-candidate
//! crawl loop, and a session controller, built against two opaque
//! external capabilities the caller supplies -- [browser::BrowserSession]
//! for full page rendering and [probe::HttpProbe] for lightweight HEAD/GET
//! probing.
//!
//! The engine itself never opens a socket or a browser tab; it only
//! decides what to fetch next, in what order, how far apart, and what to
//! do with the result.

pub mod browser;
pub mod callback;
pub mod candidate;
pub mod config;
pub mod cookies;
pub mod delay;
pub mod domain;
pub mod fingerprint;
pub mod frontier;
pub mod loop_;
pub mod probe;
pub mod request;
pub mod session;
pub mod stats;

pub use browser::{BrowserCookie, BrowserError, BrowserSession, NavigationRecord};
pub use callback::{CallbackError, CallbackRegistry, CrawlEvent, EventDetail, EventKind, Handler};
pub use candidate::CrawlCandidate;
pub use config::{ConfigError, CrawlStrategy, CrawlerConfiguration, CrawlerConfigurationBuilder, DelayStrategy};
pub use delay::{DelayController, DelayError, LoadTimeHandle};
pub use domain::{CrawlDomain, DomainError};
pub use fingerprint::UrlFingerprint;
pub use frontier::{Admission, CrawlFrontier, FrontierError, FrontierState};
pub use loop_::{CrawlLoop, LoopError};
pub use probe::{HttpProbe, ProbeError, ProbeResponse, ReqwestProbe};
pub use request::{CrawlRequest, RequestError};
pub use session::{SessionController, SessionError};
pub use stats::{Outcome, StatsCounter, StatsSnapshot};

#[cfg(feature = "chrome")]
pub use browser::ChromiumoxideSession;
