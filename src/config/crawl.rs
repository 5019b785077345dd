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

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CrawlDomain;
use crate::request::CrawlRequest;

/// Ordering strategy for the frontier's priority queue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum CrawlStrategy {
    BreadthFirst,
    DepthFirst,
}

/// Which [crate::delay::DelayController] variant to build.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum DelayStrategy {
    Fixed,
    Random,
    Adaptive,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("delay range is inverted: min ({min}) must be < max ({max})")]
    InvertedDelayRange { min: u64, max: u64 },
    #[error("delay strategy {0:?} requires min_delay_ms < max_delay_ms")]
    MissingDelayRange(DelayStrategy),
}

/// Immutable-after-construction configuration for a crawl session.
///
/// Build it through [CrawlerConfigurationBuilder]; direct field access is
/// read-only, matching the "safe for concurrent getters" rule in the
/// concurrency model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfiguration {
    allowed_crawl_domains: HashSet<CrawlDomain>,
    crawl_seeds: HashSet<CrawlRequest>,
    strategy: CrawlStrategy,
    filter_duplicate_requests: bool,
    filter_offsite_requests: bool,
    max_crawl_depth: u32,
    delay_strategy: DelayStrategy,
    fixed_delay_ms: u64,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl CrawlerConfiguration {
    pub fn builder() -> CrawlerConfigurationBuilder {
        CrawlerConfigurationBuilder::default()
    }

    pub fn allowed_crawl_domains(&self) -> &HashSet<CrawlDomain> {
        &self.allowed_crawl_domains
    }

    pub fn crawl_seeds(&self) -> &HashSet<CrawlRequest> {
        &self.crawl_seeds
    }

    pub fn strategy(&self) -> CrawlStrategy {
        self.strategy
    }

    pub fn filter_duplicate_requests(&self) -> bool {
        self.filter_duplicate_requests
    }

    pub fn filter_offsite_requests(&self) -> bool {
        self.filter_offsite_requests
    }

    pub fn max_crawl_depth(&self) -> u32 {
        self.max_crawl_depth
    }

    pub fn delay_strategy(&self) -> DelayStrategy {
        self.delay_strategy
    }

    pub fn fixed_delay_ms(&self) -> u64 {
        self.fixed_delay_ms
    }

    pub fn min_delay_ms(&self) -> u64 {
        self.min_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Rehydrates derived fields on every seed request after a
    /// deserialization from a snapshot.
    pub(crate) fn rehydrate(&mut self) {
        let seeds: HashSet<CrawlRequest> = self
            .crawl_seeds
            .drain()
            .map(|mut request| {
                request.rehydrate_domain();
                request
            })
            .collect();
        self.crawl_seeds = seeds;
    }
}

/// Builder for [CrawlerConfiguration]; mirrors the teacher's
/// `CrawlConfig`/`Default` split, but validates the delay range at
/// `build()` time since an inverted range is a programmer error, not a
/// recoverable runtime condition.
#[derive(Debug, Clone)]
pub struct CrawlerConfigurationBuilder {
    allowed_crawl_domains: HashSet<CrawlDomain>,
    crawl_seeds: HashSet<CrawlRequest>,
    strategy: CrawlStrategy,
    filter_duplicate_requests: bool,
    filter_offsite_requests: bool,
    max_crawl_depth: u32,
    delay_strategy: DelayStrategy,
    fixed_delay_ms: u64,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for CrawlerConfigurationBuilder {
    fn default() -> Self {
        Self {
            allowed_crawl_domains: HashSet::new(),
            crawl_seeds: HashSet::new(),
            strategy: CrawlStrategy::BreadthFirst,
            filter_duplicate_requests: true,
            filter_offsite_requests: false,
            max_crawl_depth: 0,
            delay_strategy: DelayStrategy::Fixed,
            fixed_delay_ms: 0,
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl CrawlerConfigurationBuilder {
    pub fn allow_domain(mut self, domain: CrawlDomain) -> Self {
        self.allowed_crawl_domains.insert(domain);
        self
    }

    pub fn seed(mut self, request: CrawlRequest) -> Self {
        self.crawl_seeds.insert(request);
        self
    }

    pub fn seeds(mut self, requests: impl IntoIterator<Item = CrawlRequest>) -> Self {
        self.crawl_seeds.extend(requests);
        self
    }

    pub fn strategy(mut self, strategy: CrawlStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn filter_duplicate_requests(mut self, value: bool) -> Self {
        self.filter_duplicate_requests = value;
        self
    }

    pub fn filter_offsite_requests(mut self, value: bool) -> Self {
        self.filter_offsite_requests = value;
        self
    }

    pub fn max_crawl_depth(mut self, value: u32) -> Self {
        self.max_crawl_depth = value;
        self
    }

    pub fn fixed_delay(mut self, delay_ms: u64) -> Self {
        self.delay_strategy = DelayStrategy::Fixed;
        self.fixed_delay_ms = delay_ms;
        self
    }

    pub fn random_delay(mut self, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.delay_strategy = DelayStrategy::Random;
        self.min_delay_ms = min_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn adaptive_delay(mut self, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.delay_strategy = DelayStrategy::Adaptive;
        self.min_delay_ms = min_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn build(self) -> Result<CrawlerConfiguration, ConfigError> {
        if matches!(
            self.delay_strategy,
            DelayStrategy::Random | DelayStrategy::Adaptive
        ) && self.min_delay_ms >= self.max_delay_ms
        {
            return Err(ConfigError::InvertedDelayRange {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }

        Ok(CrawlerConfiguration {
            allowed_crawl_domains: self.allowed_crawl_domains,
            crawl_seeds: self.crawl_seeds,
            strategy: self.strategy,
            filter_duplicate_requests: self.filter_duplicate_requests,
            filter_offsite_requests: self.filter_offsite_requests,
            max_crawl_depth: self.max_crawl_depth,
            delay_strategy: self.delay_strategy,
            fixed_delay_ms: self.fixed_delay_ms,
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
        })
    }
}
