// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Report timing.
//!
//! Every established subscription gets a [`SchedulerNode`] holding two
//! absolute deadlines computed from its last report:
//!
//! - `min_timestamp = last_report + min_interval`: a dirty subscription may
//!   not report earlier, unless an urgent event is pending.
//! - `max_timestamp = last_report + max_interval`: the subscription must
//!   report by then, even with nothing to say, to prove liveness.
//!
//! Nodes are keyed by [`HandlerId`], so removing a handler can never leave a
//! node pointing at something that no longer exists, and iterating the table
//! visits handlers in registration order.
//!
//! The policy deciding who reports on a given wake-up is pluggable through
//! [`ReportScheduler`]; see [`IndependentScheduler`] and
//! [`SynchronizedScheduler`].

mod independent;
mod synchronized;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

pub use independent::IndependentScheduler;
pub use synchronized::SynchronizedScheduler;

use crate::config::SchedulerPolicy;
use crate::handler::HandlerId;

/// Deadlines of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerNode {
    last_report: Instant,
    min_interval: Duration,
    max_interval: Duration,
    min_timestamp: Instant,
    max_timestamp: Instant,
}

impl SchedulerNode {
    /// Creates a node whose last report happened at `now`.
    #[must_use]
    pub fn new(now: Instant, min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            last_report: now,
            min_interval,
            max_interval,
            min_timestamp: now + min_interval,
            max_timestamp: now + max_interval,
        }
    }

    /// Earliest instant a non-urgent report may be sent.
    #[must_use]
    pub fn min_timestamp(&self) -> Instant {
        self.min_timestamp
    }

    /// Instant by which a report must be sent.
    #[must_use]
    pub fn max_timestamp(&self) -> Instant {
        self.max_timestamp
    }

    /// Instant of the last completed report.
    #[must_use]
    pub fn last_report(&self) -> Instant {
        self.last_report
    }

    /// Returns `true` if the subscription may report at `now`.
    #[must_use]
    pub fn is_reportable(&self, now: Instant, readiness: &Readiness) -> bool {
        (readiness.dirty && now >= self.min_timestamp)
            || now >= self.max_timestamp
            || readiness.urgent
    }

    /// Next instant at which [`is_reportable`](Self::is_reportable) could turn true.
    #[must_use]
    pub fn next_deadline(&self, now: Instant, readiness: &Readiness) -> Instant {
        if readiness.urgent {
            now
        } else if readiness.dirty {
            self.min_timestamp.min(self.max_timestamp)
        } else {
            self.max_timestamp
        }
    }

    fn reset(&mut self, now: Instant) {
        *self = Self::new(now, self.min_interval, self.max_interval);
    }
}

/// What the engine knows about one handler when asking the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// The handler being described.
    pub handler: HandlerId,
    /// Something the handler is interested in changed since its last report.
    pub dirty: bool,
    /// An urgent event is pending for the handler.
    pub urgent: bool,
}

/// Scheduler nodes in registration order.
#[derive(Debug, Default)]
pub struct NodeTable {
    nodes: BTreeMap<HandlerId, SchedulerNode>,
}

impl NodeTable {
    /// Looks up a node.
    #[must_use]
    pub fn get(&self, handler: HandlerId) -> Option<&SchedulerNode> {
        self.nodes.get(&handler)
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Candidates whose node is reportable at `now`, in the order given.
    fn fired<'a>(
        &'a self,
        now: Instant,
        candidates: &'a [Readiness],
    ) -> impl Iterator<Item = &'a Readiness> {
        candidates.iter().filter(move |r| {
            self.nodes
                .get(&r.handler)
                .is_some_and(|node| node.is_reportable(now, r))
        })
    }
}

/// Policy deciding which subscriptions report on a wake-up.
///
/// Implementations only choose *who* reports; the deadline bookkeeping is
/// shared through the provided methods.
pub trait ReportScheduler: Send + fmt::Debug {
    /// The node table.
    fn nodes(&self) -> &NodeTable;

    /// Mutable access to the node table.
    fn nodes_mut(&mut self) -> &mut NodeTable;

    /// Handlers that should start a report at `now`, in registration order.
    ///
    /// `candidates` lists the handlers that are free to report, in ascending
    /// [`HandlerId`] order.
    fn reportable(&self, now: Instant, candidates: &[Readiness]) -> Vec<HandlerId>;

    /// Earliest instant at which [`reportable`](Self::reportable) could
    /// return something for `candidates`.
    fn next_wakeup(&self, now: Instant, candidates: &[Readiness]) -> Option<Instant> {
        candidates
            .iter()
            .filter_map(|r| self.nodes().get(r.handler).map(|n| n.next_deadline(now, r)))
            .min()
    }

    /// Starts tracking a subscription whose first report completed at `now`.
    fn register(
        &mut self,
        handler: HandlerId,
        now: Instant,
        min_interval: Duration,
        max_interval: Duration,
    ) {
        self.nodes_mut()
            .nodes
            .insert(handler, SchedulerNode::new(now, min_interval, max_interval));
    }

    /// Stops tracking a subscription. Returns `true` if it was tracked.
    fn unregister(&mut self, handler: HandlerId) -> bool {
        self.nodes_mut().nodes.remove(&handler).is_some()
    }

    /// Recomputes both deadlines after a completed report.
    fn on_report_sent(&mut self, handler: HandlerId, now: Instant) {
        if let Some(node) = self.nodes_mut().nodes.get_mut(&handler) {
            node.reset(now);
        }
    }

    /// Changes the minimum interval, shifting the min deadline only if it
    /// has not elapsed yet.
    fn set_interval_timestamps(
        &mut self,
        handler: HandlerId,
        now: Instant,
        min_interval: Duration,
    ) -> bool {
        let Some(node) = self.nodes_mut().nodes.get_mut(&handler) else {
            return false;
        };
        node.min_interval = min_interval;
        if node.min_timestamp > now {
            node.min_timestamp = (node.last_report + min_interval).max(now);
        }
        true
    }

    /// Changes the maximum interval, shifting the max deadline only if it
    /// has not elapsed yet.
    fn set_max_interval(&mut self, handler: HandlerId, now: Instant, max_interval: Duration) -> bool {
        let Some(node) = self.nodes_mut().nodes.get_mut(&handler) else {
            return false;
        };
        node.max_interval = max_interval;
        if node.max_timestamp > now {
            node.max_timestamp = (node.last_report + max_interval).max(now);
        }
        true
    }
}

/// Creates the scheduler for a configured policy.
#[must_use]
pub fn for_policy(policy: SchedulerPolicy) -> Box<dyn ReportScheduler> {
    match policy {
        SchedulerPolicy::Independent => Box::new(IndependentScheduler::new()),
        SchedulerPolicy::Synchronized => Box::new(SynchronizedScheduler::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn idle(handler: u64) -> Readiness {
        Readiness {
            handler: HandlerId::from_raw(handler),
            dirty: false,
            urgent: false,
        }
    }

    #[test]
    fn node_deadlines_follow_intervals() {
        let now = Instant::now();
        let node = SchedulerNode::new(now, Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(node.min_timestamp() - now, Duration::from_secs(2));
        assert_eq!(node.max_timestamp() - now, Duration::from_secs(10));
    }

    #[test]
    fn dirty_waits_for_min_interval() {
        let now = Instant::now();
        let node = SchedulerNode::new(now, Duration::from_secs(2), Duration::from_secs(10));
        let dirty = Readiness {
            dirty: true,
            ..idle(1)
        };
        assert!(!node.is_reportable(now + Duration::from_secs(1), &dirty));
        assert!(node.is_reportable(now + Duration::from_secs(2), &dirty));
        assert_eq!(node.next_deadline(now, &dirty), now + Duration::from_secs(2));
    }

    #[test]
    fn max_interval_forces_report() {
        let now = Instant::now();
        let node = SchedulerNode::new(now, Duration::from_secs(2), Duration::from_secs(10));
        assert!(!node.is_reportable(now + Duration::from_secs(9), &idle(1)));
        assert!(node.is_reportable(now + Duration::from_secs(10), &idle(1)));
    }

    #[test]
    fn urgent_bypasses_min_interval() {
        let now = Instant::now();
        let node = SchedulerNode::new(now, Duration::from_secs(5), Duration::from_secs(10));
        let urgent = Readiness {
            urgent: true,
            ..idle(1)
        };
        assert!(node.is_reportable(now, &urgent));
        assert_eq!(node.next_deadline(now, &urgent), now);
    }

    #[test]
    fn set_interval_timestamps_only_shifts_future_deadline() {
        let mut scheduler = IndependentScheduler::new();
        let id = HandlerId::from_raw(1);
        let start = Instant::now();
        scheduler.register(id, start, Duration::from_secs(5), Duration::from_secs(60));

        // Future deadline is moved.
        scheduler.set_interval_timestamps(id, start + Duration::from_secs(1), Duration::from_secs(3));
        let node = *scheduler.nodes().get(id).unwrap();
        assert_eq!(node.min_timestamp(), start + Duration::from_secs(3));

        // Elapsed deadline stays elapsed.
        let later = start + Duration::from_secs(4);
        scheduler.set_interval_timestamps(id, later, Duration::from_secs(30));
        assert_eq!(
            scheduler.nodes().get(id).unwrap().min_timestamp(),
            start + Duration::from_secs(3)
        );
    }

    #[test]
    fn report_resets_both_deadlines() {
        let mut scheduler = IndependentScheduler::new();
        let id = HandlerId::from_raw(1);
        let start = Instant::now();
        scheduler.register(id, start, Duration::from_secs(1), Duration::from_secs(10));
        let later = start + Duration::from_secs(10);
        scheduler.on_report_sent(id, later);
        let node = scheduler.nodes().get(id).unwrap();
        assert_eq!(node.last_report(), later);
        assert_eq!(node.max_timestamp(), later + Duration::from_secs(10));
    }

    #[test]
    fn next_wakeup_is_earliest_deadline() {
        let mut scheduler = IndependentScheduler::new();
        let start = Instant::now();
        scheduler.register(HandlerId::from_raw(1), start, Duration::ZERO, Duration::from_secs(30));
        scheduler.register(HandlerId::from_raw(2), start, Duration::ZERO, Duration::from_secs(10));
        let wakeup = scheduler.next_wakeup(start, &[idle(1), idle(2)]);
        assert_eq!(wakeup, Some(start + Duration::from_secs(10)));
        assert_eq!(scheduler.next_wakeup(start, &[]), None);
    }

    #[test]
    fn unregister_removes_node() {
        let mut scheduler = for_policy(SchedulerPolicy::Synchronized);
        let id = HandlerId::from_raw(7);
        scheduler.register(id, Instant::now(), Duration::ZERO, Duration::from_secs(1));
        assert!(scheduler.unregister(id));
        assert!(!scheduler.unregister(id));
        assert!(scheduler.nodes().is_empty());
    }
}
