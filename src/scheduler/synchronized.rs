// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tokio::time::Instant;

use super::{NodeTable, Readiness, ReportScheduler};
use crate::handler::HandlerId;

/// Coalesces reports to reduce wake-ups.
///
/// Whenever at least one subscription is due, every other subscription whose
/// minimum interval has already elapsed reports in the same wake-up, even if
/// it is neither dirty nor at its max deadline yet. Their deadlines then
/// restart together, so later wake-ups tend to line up.
#[derive(Debug, Default)]
pub struct SynchronizedScheduler {
    nodes: NodeTable,
}

impl SynchronizedScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportScheduler for SynchronizedScheduler {
    fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    fn nodes_mut(&mut self) -> &mut NodeTable {
        &mut self.nodes
    }

    fn reportable(&self, now: Instant, candidates: &[Readiness]) -> Vec<HandlerId> {
        if self.nodes.fired(now, candidates).next().is_none() {
            return Vec::new();
        }
        candidates
            .iter()
            .filter(|r| {
                self.nodes.get(r.handler).is_some_and(|node| {
                    node.is_reportable(now, r) || now >= node.min_timestamp()
                })
            })
            .map(|r| r.handler)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::scheduler::tests::idle;

    fn scheduler(start: Instant) -> SynchronizedScheduler {
        let mut scheduler = SynchronizedScheduler::new();
        scheduler.register(HandlerId::from_raw(1), start, Duration::ZERO, Duration::from_secs(10));
        scheduler.register(HandlerId::from_raw(2), start, Duration::from_secs(2), Duration::from_secs(60));
        scheduler.register(HandlerId::from_raw(3), start, Duration::from_secs(30), Duration::from_secs(60));
        scheduler
    }

    #[test]
    fn nothing_due_means_nobody_reports() {
        let start = Instant::now();
        let scheduler = scheduler(start);
        let at = start + Duration::from_secs(5);
        assert!(scheduler.reportable(at, &[idle(1), idle(2), idle(3)]).is_empty());
    }

    #[test]
    fn due_handler_pulls_in_those_past_min() {
        let start = Instant::now();
        let scheduler = scheduler(start);
        let at = start + Duration::from_secs(10);
        assert_eq!(
            scheduler.reportable(at, &[idle(1), idle(2), idle(3)]),
            vec![HandlerId::from_raw(1), HandlerId::from_raw(2)]
        );
    }
}
