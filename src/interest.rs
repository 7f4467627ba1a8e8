// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dirty set: which paths changed and are owed a report.
//!
//! Every [`set_dirty`](InterestRegistry::set_dirty) call is stamped with a
//! new generation. A read handler remembers the generation it last reported
//! up to; anything dirtied after that is still owed to it. This keeps marks
//! that race with an in-flight report: the report clears only what was dirty
//! when it started.

use crate::path::{ClusterId, EndpointId, PathFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyEntry {
    filter: PathFilter,
    generation: u64,
}

/// Registry of dirty path filters.
#[derive(Debug)]
pub struct InterestRegistry {
    entries: Vec<DirtyEntry>,
    generation: u64,
    capacity: usize,
}

impl InterestRegistry {
    /// Creates an empty registry holding at most `capacity` distinct filters.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            generation: 0,
            capacity: capacity.max(1),
        }
    }

    /// Generation stamped on the most recent mark, or 0 if none.
    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// Number of distinct dirty filters held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks every path matched by `filter` dirty and returns the new generation.
    ///
    /// Marking the same filter twice keeps a single entry. When the registry
    /// is full, all entries collapse into one wildcard so no mark is lost.
    pub fn set_dirty(&mut self, filter: PathFilter) -> u64 {
        self.generation += 1;
        let generation = self.generation;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.filter == filter) {
            entry.generation = generation;
            return generation;
        }

        self.entries.retain(|e| !filter.covers(&e.filter));
        self.entries.push(DirtyEntry { filter, generation });

        if self.entries.len() > self.capacity {
            tracing::debug!(
                capacity = self.capacity,
                "Dirty set overflow, collapsing to wildcard"
            );
            self.entries.clear();
            self.entries.push(DirtyEntry {
                filter: PathFilter::wildcard(),
                generation,
            });
        }
        generation
    }

    /// Returns `true` if anything dirtied after `since` intersects one of `filters`.
    #[must_use]
    pub fn is_dirty_for(&self, since: u64, filters: &[PathFilter]) -> bool {
        self.newer_than(since)
            .any(|e| filters.iter().any(|f| f.intersect(&e.filter).is_some()))
    }

    /// Returns `true` if anything dirtied after `since` touches the cluster instance.
    #[must_use]
    pub fn is_cluster_dirty(&self, since: u64, endpoint: EndpointId, cluster: ClusterId) -> bool {
        self.newer_than(since)
            .any(|e| e.filter.touches_cluster(endpoint, cluster))
    }

    /// Narrows `filters` to what was dirtied after `since`.
    ///
    /// The result holds each intersection once; an intersection already
    /// covered by another one is dropped.
    #[must_use]
    pub fn dirty_filters_for(&self, since: u64, filters: &[PathFilter]) -> Vec<PathFilter> {
        let mut narrowed: Vec<PathFilter> = Vec::new();
        for entry in self.newer_than(since) {
            for filter in filters {
                let Some(both) = filter.intersect(&entry.filter) else {
                    continue;
                };
                if narrowed.iter().any(|n| n.covers(&both)) {
                    continue;
                }
                narrowed.retain(|n| !both.covers(n));
                narrowed.push(both);
            }
        }
        narrowed
    }

    /// Drops entries every handler has already reported.
    pub fn collect_garbage(&mut self, oldest_reported: u64) {
        self.entries.retain(|e| e.generation > oldest_reported);
    }

    fn newer_than(&self, since: u64) -> impl Iterator<Item = &DirtyEntry> {
        self.entries.iter().filter(move |e| e.generation > since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onoff() -> PathFilter {
        PathFilter::concrete(EndpointId(1), ClusterId(6), 0)
    }

    #[test]
    fn marks_are_seen_after_their_generation() {
        let mut registry = InterestRegistry::new(8);
        let before = registry.current_generation();
        let generation = registry.set_dirty(onoff());

        assert!(registry.is_dirty_for(before, &[PathFilter::wildcard()]));
        assert!(!registry.is_dirty_for(generation, &[PathFilter::wildcard()]));
    }

    #[test]
    fn set_dirty_twice_keeps_one_entry() {
        let mut registry = InterestRegistry::new(8);
        registry.set_dirty(onoff());
        registry.set_dirty(onoff());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.dirty_filters_for(0, &[PathFilter::wildcard()]),
            vec![onoff()]
        );
    }

    #[test]
    fn broader_mark_replaces_narrower() {
        let mut registry = InterestRegistry::new(8);
        registry.set_dirty(onoff());
        registry.set_dirty(PathFilter::cluster(EndpointId(1), ClusterId(6)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn overflow_collapses_to_wildcard() {
        let mut registry = InterestRegistry::new(2);
        for id in 0..3 {
            registry.set_dirty(PathFilter::concrete(EndpointId(1), ClusterId(6), id));
        }
        assert_eq!(registry.len(), 1);
        assert!(registry.is_dirty_for(0, &[PathFilter::cluster(EndpointId(9), ClusterId(9))]));
    }

    #[test]
    fn dirty_filters_are_narrowed_to_interest() {
        let mut registry = InterestRegistry::new(8);
        registry.set_dirty(PathFilter::wildcard().with_endpoint(EndpointId(1)));
        let interest = [PathFilter::wildcard().with_cluster(ClusterId(6))];
        assert_eq!(
            registry.dirty_filters_for(0, &interest),
            vec![PathFilter::cluster(EndpointId(1), ClusterId(6))]
        );
    }

    #[test]
    fn cluster_dirty_check() {
        let mut registry = InterestRegistry::new(8);
        registry.set_dirty(onoff());
        assert!(registry.is_cluster_dirty(0, EndpointId(1), ClusterId(6)));
        assert!(!registry.is_cluster_dirty(0, EndpointId(1), ClusterId(8)));
    }

    #[test]
    fn garbage_collection_keeps_unreported_marks() {
        let mut registry = InterestRegistry::new(8);
        let first = registry.set_dirty(onoff());
        registry.set_dirty(PathFilter::concrete(EndpointId(2), ClusterId(6), 0));
        registry.collect_garbage(first);
        assert_eq!(registry.len(), 1);
    }
}
