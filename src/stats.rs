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

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Thread-safe counters for every terminal outcome and every filter
/// decision. Writes come from the single crawl loop; reads (via
/// [StatsCounter::snapshot]) may come from any thread.
#[derive(Debug, Default)]
pub struct StatsCounter {
    remaining: AtomicI64,
    processed: AtomicU64,
    response_success: AtomicU64,
    page_load_timeout: AtomicU64,
    request_redirect: AtomicU64,
    non_html_response: AtomicU64,
    response_error: AtomicU64,
    network_error: AtomicU64,
    filtered_duplicate: AtomicU64,
    filtered_offsite: AtomicU64,
    filtered_depth_exceeded: AtomicU64,
}

/// A value-copy of [StatsCounter] taken at a single instant.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub remaining: i64,
    pub processed: u64,
    pub response_success: u64,
    pub page_load_timeout: u64,
    pub request_redirect: u64,
    pub non_html_response: u64,
    pub response_error: u64,
    pub network_error: u64,
    pub filtered_duplicate: u64,
    pub filtered_offsite: u64,
    pub filtered_depth_exceeded: u64,
}

/// The six terminal outcomes a candidate can conclude with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    ResponseSuccess,
    PageLoadTimeout,
    RequestRedirect,
    NonHtmlResponse,
    ResponseError,
    NetworkError,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the frontier on every successful admission.
    pub fn record_remaining_crawl_candidate(&self) {
        self.remaining.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a terminal outcome: increments its own counter, decrements
    /// `remaining` (never below zero), increments `processed`.
    pub fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::ResponseSuccess => &self.response_success,
            Outcome::PageLoadTimeout => &self.page_load_timeout,
            Outcome::RequestRedirect => &self.request_redirect,
            Outcome::NonHtmlResponse => &self.non_html_response,
            Outcome::ResponseError => &self.response_error,
            Outcome::NetworkError => &self.network_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
        let previous = self.remaining.fetch_sub(1, Ordering::Relaxed);
        assert!(
            previous > 0,
            "remaining must stay >= 0: an outcome was recorded without a matching admission"
        );
    }

    pub fn record_filtered_duplicate(&self) {
        self.filtered_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered_offsite(&self) {
        self.filtered_offsite.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered_depth_exceeded(&self) {
        self.filtered_depth_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a consistent value copy. Since every counter is an
    /// independent atomic, "consistent" here means read in one batch
    /// with `Acquire` ordering -- good enough given the single-writer
    /// discipline the loop enforces.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            remaining: self.remaining.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            response_success: self.response_success.load(Ordering::Acquire),
            page_load_timeout: self.page_load_timeout.load(Ordering::Acquire),
            request_redirect: self.request_redirect.load(Ordering::Acquire),
            non_html_response: self.non_html_response.load(Ordering::Acquire),
            response_error: self.response_error.load(Ordering::Acquire),
            network_error: self.network_error.load(Ordering::Acquire),
            filtered_duplicate: self.filtered_duplicate.load(Ordering::Acquire),
            filtered_offsite: self.filtered_offsite.load(Ordering::Acquire),
            filtered_depth_exceeded: self.filtered_depth_exceeded.load(Ordering::Acquire),
        }
    }

    pub(crate) fn restore(snapshot: StatsSnapshot) -> Self {
        Self {
            remaining: AtomicI64::new(snapshot.remaining),
            processed: AtomicU64::new(snapshot.processed),
            response_success: AtomicU64::new(snapshot.response_success),
            page_load_timeout: AtomicU64::new(snapshot.page_load_timeout),
            request_redirect: AtomicU64::new(snapshot.request_redirect),
            non_html_response: AtomicU64::new(snapshot.non_html_response),
            response_error: AtomicU64::new(snapshot.response_error),
            network_error: AtomicU64::new(snapshot.network_error),
            filtered_duplicate: AtomicU64::new(snapshot.filtered_duplicate),
            filtered_offsite: AtomicU64::new(snapshot.filtered_offsite),
            filtered_depth_exceeded: AtomicU64::new(snapshot.filtered_depth_exceeded),
        }
    }
}
