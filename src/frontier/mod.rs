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

mod heap_entry;

use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::CrawlCandidate;
use crate::config::{CrawlStrategy, CrawlerConfiguration};
use crate::fingerprint::UrlFingerprint;
use crate::request::CrawlRequest;
use crate::stats::StatsCounter;

use heap_entry::HeapEntry;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("a non-seed request was fed before any candidate had been dequeued")]
    NoCurrentCandidate,
}

/// The outcome of [CrawlFrontier::feed_request], mirroring the four
/// branches of the admission pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Admission {
    Admitted,
    FilteredOffsite,
    FilteredDuplicate,
    FilteredDepthExceeded,
}

/// The serializable half of the frontier's state: everything except the
/// stats counter, which the session controller snapshots separately.
#[derive(Debug, Serialize, Deserialize)]
pub struct FrontierState {
    fingerprints: HashSet<UrlFingerprint>,
    queue: Vec<CrawlCandidate>,
    current_candidate: Option<CrawlCandidate>,
}

/// The priority queue plus dedup/offsite filter set. Admits requests
/// under the configured filter policy, deduplicates them, orders them
/// by the configured strategy, and emits the next candidate.
pub struct CrawlFrontier {
    strategy: CrawlStrategy,
    filter_duplicate_requests: bool,
    filter_offsite_requests: bool,
    allowed_crawl_domains: HashSet<crate::domain::CrawlDomain>,
    max_crawl_depth: u32,
    fingerprints: HashSet<UrlFingerprint>,
    queue: BinaryHeap<HeapEntry>,
    current_candidate: Option<CrawlCandidate>,
    stats: Arc<StatsCounter>,
}

impl CrawlFrontier {
    /// Builds an empty frontier from `config`. Seeds are not admitted
    /// here -- call [CrawlFrontier::feed_seeds] on a fresh session only,
    /// never on resume.
    pub fn new(config: &CrawlerConfiguration, stats: Arc<StatsCounter>) -> Self {
        Self {
            strategy: config.strategy(),
            filter_duplicate_requests: config.filter_duplicate_requests(),
            filter_offsite_requests: config.filter_offsite_requests(),
            allowed_crawl_domains: config.allowed_crawl_domains().clone(),
            max_crawl_depth: config.max_crawl_depth(),
            fingerprints: HashSet::new(),
            queue: BinaryHeap::new(),
            current_candidate: None,
            stats,
        }
    }

    /// Restores a frontier from a previously saved [FrontierState],
    /// rebuilding the comparator from `strategy` -- the comparator
    /// itself is never serialized.
    pub fn from_state(config: &CrawlerConfiguration, stats: Arc<StatsCounter>, state: FrontierState) -> Self {
        let strategy = config.strategy();
        let mut queue = BinaryHeap::with_capacity(state.queue.len());
        for mut candidate in state.queue {
            candidate.rehydrate();
            queue.push(HeapEntry::new(candidate, strategy));
        }
        let current_candidate = state.current_candidate.map(|mut candidate| {
            candidate.rehydrate();
            candidate
        });
        Self {
            strategy,
            filter_duplicate_requests: config.filter_duplicate_requests(),
            filter_offsite_requests: config.filter_offsite_requests(),
            allowed_crawl_domains: config.allowed_crawl_domains().clone(),
            max_crawl_depth: config.max_crawl_depth(),
            fingerprints: state.fingerprints,
            queue,
            current_candidate,
            stats,
        }
    }

    pub fn to_state(&self) -> FrontierState {
        FrontierState {
            fingerprints: self.fingerprints.clone(),
            queue: self.queue.iter().map(|entry| entry.candidate().clone()).collect(),
            current_candidate: self.current_candidate.clone(),
        }
    }

    /// Feeds every seed in `seeds` into the frontier. Only ever called
    /// once, on a fresh (non-resumed) session.
    pub fn feed_seeds(&mut self, seeds: impl IntoIterator<Item = CrawlRequest>) -> Result<(), FrontierError> {
        for seed in seeds {
            self.feed_request(seed, true)?;
        }
        Ok(())
    }

    /// Runs `request` through the admission pipeline: offsite filter,
    /// dedup filter, depth check (non-seeds only), then enqueue.
    pub fn feed_request(&mut self, request: CrawlRequest, is_seed: bool) -> Result<Admission, FrontierError> {
        if self.filter_offsite_requests && !self.allowed_crawl_domains.is_empty() {
            let domain = request.domain();
            let allowed = self
                .allowed_crawl_domains
                .iter()
                .any(|allowed| allowed.contains(&domain));
            if !allowed {
                self.stats.record_filtered_offsite();
                return Ok(Admission::FilteredOffsite);
            }
        }

        if self.filter_duplicate_requests {
            let fingerprint = UrlFingerprint::of(request.url());
            if self.fingerprints.contains(&fingerprint) {
                self.stats.record_filtered_duplicate();
                return Ok(Admission::FilteredDuplicate);
            }
            self.fingerprints.insert(fingerprint);
        }

        let candidate = if is_seed {
            CrawlCandidate::seed(request)
        } else {
            let current = self
                .current_candidate
                .as_ref()
                .ok_or(FrontierError::NoCurrentCandidate)?;
            let next_depth = current.depth() + 1;
            if self.max_crawl_depth != 0 && next_depth > self.max_crawl_depth {
                self.stats.record_filtered_depth_exceeded();
                return Ok(Admission::FilteredDepthExceeded);
            }
            CrawlCandidate::child(request, current.request().url().clone(), next_depth)
        };

        self.queue.push(HeapEntry::new(candidate, self.strategy));
        self.stats.record_remaining_crawl_candidate();
        Ok(Admission::Admitted)
    }

    pub fn has_next_candidate(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pops the highest-priority candidate and sets it as the current
    /// candidate (the referer source for any children it produces).
    pub fn next_candidate(&mut self) -> Option<CrawlCandidate> {
        let candidate = self.queue.pop()?.into_candidate();
        self.current_candidate = Some(candidate.clone());
        Some(candidate)
    }

    pub fn current_candidate(&self) -> Option<&CrawlCandidate> {
        self.current_candidate.as_ref()
    }

    /// Clears fingerprints and the queue. Counters and the current
    /// candidate are untouched.
    pub fn reset(&mut self) {
        self.fingerprints.clear();
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CrawlerConfiguration;
    use crate::domain::CrawlDomain;

    fn stats() -> Arc<StatsCounter> {
        Arc::new(StatsCounter::new())
    }

    fn request(url: &str) -> CrawlRequest {
        CrawlRequest::parse(url, 0, None).unwrap()
    }

    #[test]
    fn dedup_with_query_reorder() {
        let config = CrawlerConfiguration::builder().build().unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats.clone());
        let a = request("http://EX.com/a?x=1&y=2");
        let b = request("http://ex.com/a/?y=2&x=1");
        assert_eq!(frontier.feed_request(a, true).unwrap(), Admission::Admitted);
        assert_eq!(
            frontier.feed_request(b, true).unwrap(),
            Admission::FilteredDuplicate
        );
        assert_eq!(stats.snapshot().filtered_duplicate, 1);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn offsite_rejection() {
        let config = CrawlerConfiguration::builder()
            .allow_domain(CrawlDomain::from_host("example.com").unwrap())
            .filter_offsite_requests(true)
            .build()
            .unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats.clone());
        let onsite = request("https://blog.example.com/p");
        let offsite = request("https://other.test/p");
        assert_eq!(
            frontier.feed_request(onsite, true).unwrap(),
            Admission::Admitted
        );
        assert_eq!(
            frontier.feed_request(offsite, true).unwrap(),
            Admission::FilteredOffsite
        );
        assert_eq!(stats.snapshot().filtered_offsite, 1);
        let next = frontier.next_candidate().unwrap();
        assert_eq!(next.depth(), 1);
    }

    #[test]
    fn depth_limit_scenario() {
        let config = CrawlerConfiguration::builder()
            .max_crawl_depth(3)
            .build()
            .unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats.clone());

        frontier.feed_request(request("https://s.example/"), true).unwrap();
        let seed = frontier.next_candidate().unwrap();
        assert_eq!(seed.depth(), 1);

        frontier
            .feed_request(request("https://s.example/a"), false)
            .unwrap();
        let child = frontier.next_candidate().unwrap();
        assert_eq!(child.depth(), 2);

        frontier
            .feed_request(request("https://s.example/a/b"), false)
            .unwrap();
        let grandchild = frontier.next_candidate().unwrap();
        assert_eq!(grandchild.depth(), 3);

        let admission = frontier
            .feed_request(request("https://s.example/a/b/c"), false)
            .unwrap();
        assert_eq!(admission, Admission::FilteredDepthExceeded);
        assert_eq!(stats.snapshot().filtered_depth_exceeded, 1);
    }

    #[test]
    fn breadth_first_orders_by_depth_then_priority_desc() {
        let config = CrawlerConfiguration::builder()
            .strategy(CrawlStrategy::BreadthFirst)
            .build()
            .unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats);

        frontier
            .feed_request(CrawlRequest::parse("https://s.example/", 0, None).unwrap(), true)
            .unwrap();
        frontier.next_candidate().unwrap();
        frontier
            .feed_request(
                CrawlRequest::parse("https://s.example/low", 1, None).unwrap(),
                false,
            )
            .unwrap();
        frontier
            .feed_request(
                CrawlRequest::parse("https://s.example/high", 5, None).unwrap(),
                false,
            )
            .unwrap();

        let first = frontier.next_candidate().unwrap();
        let second = frontier.next_candidate().unwrap();
        assert_eq!(first.depth(), second.depth());
        assert!(first.request().priority() > second.request().priority());
    }

    #[test]
    fn depth_first_pops_deepest_first() {
        let config = CrawlerConfiguration::builder()
            .strategy(CrawlStrategy::DepthFirst)
            .build()
            .unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats);

        frontier
            .feed_request(request("https://s.example/"), true)
            .unwrap();
        let seed = frontier.next_candidate().unwrap();
        assert_eq!(seed.depth(), 1);

        // Two depth-2 siblings, queued while `seed` is still current.
        frontier
            .feed_request(request("https://s.example/a"), false)
            .unwrap();
        frontier
            .feed_request(request("https://s.example/b"), false)
            .unwrap();

        // Dequeue one of them and queue its child, so the frontier now
        // holds one depth-2 candidate and one depth-3 candidate at once.
        let one_sibling = frontier.next_candidate().unwrap();
        assert_eq!(one_sibling.depth(), 2);
        frontier
            .feed_request(request("https://s.example/a/b"), false)
            .unwrap();

        let next = frontier.next_candidate().unwrap();
        assert_eq!(next.depth(), 3, "DFS should dequeue the deeper candidate first");
    }

    #[test]
    fn snapshot_round_trips_queue_contents() {
        let config = CrawlerConfiguration::builder().build().unwrap();
        let stats = stats();
        let mut frontier = CrawlFrontier::new(&config, stats.clone());
        frontier
            .feed_request(request("https://s.example/a"), true)
            .unwrap();
        frontier
            .feed_request(request("https://s.example/b"), true)
            .unwrap();

        let state = frontier.to_state();
        let restored = CrawlFrontier::from_state(&config, stats, state);
        assert_eq!(restored.len(), 2);
    }
}
