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

use std::cmp::Ordering;

use crate::candidate::CrawlCandidate;
use crate::config::CrawlStrategy;

/// Wraps a candidate with the strategy it should be ordered under inside
/// a [std::collections::BinaryHeap]. The heap is a max-heap, so `Ord`
/// here is defined so that "pops first" means "compares greater".
///
/// Every entry in a given heap carries the same strategy -- it travels
/// with the entry rather than living on the heap itself only because a
/// plain `BinaryHeap<CrawlCandidate>` has no strategy to consult.
pub(super) struct HeapEntry {
    candidate: CrawlCandidate,
    strategy: CrawlStrategy,
}

impl HeapEntry {
    pub(super) fn new(candidate: CrawlCandidate, strategy: CrawlStrategy) -> Self {
        Self { candidate, strategy }
    }

    pub(super) fn candidate(&self) -> &CrawlCandidate {
        &self.candidate
    }

    pub(super) fn into_candidate(self) -> CrawlCandidate {
        self.candidate
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let depth_order = match self.strategy {
            // Breadth-first: shallower candidates pop first.
            CrawlStrategy::BreadthFirst => other.candidate.depth().cmp(&self.candidate.depth()),
            // Depth-first: deeper candidates pop first.
            CrawlStrategy::DepthFirst => self.candidate.depth().cmp(&other.candidate.depth()),
        };
        depth_order.then_with(|| {
            self.candidate
                .request()
                .priority()
                .cmp(&other.candidate.request().priority())
        })
    }
}
