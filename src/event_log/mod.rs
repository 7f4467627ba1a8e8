// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Priority-tiered, size-bounded event storage.
//!
//! Events are kept in one ring per [`Priority`] tier. Each ring starts with
//! the byte capacity configured for its tier. When a ring is full, it first
//! reclaims capacity from strictly lower tiers (evicting their oldest events
//! as needed), and only then evicts its own oldest events. Critical events
//! never evict other critical events: once every tier has been reclaimed by
//! the critical ring and that ring is full, logging fails with
//! [`Error::NoStorage`](crate::Error::NoStorage).
//!
//! Event numbers are assigned from a single counter shared by all tiers, so
//! readers can ask for "everything since N" regardless of priority.
//!
//! # Examples
//!
//! ```
//! use im_reporting::config::EventLogConfig;
//! use im_reporting::event_log::{EventLog, Priority};
//! use im_reporting::path::{ClusterId, ConcretePath, EndpointId};
//!
//! let mut log = EventLog::new(&EventLogConfig::default());
//! let path = ConcretePath::new(EndpointId(1), ClusterId(0x3B), 1);
//! let first = log
//!     .log_event(Priority::Info, path, &serde_json::json!({"position": 1}), chrono::Utc::now(), None)
//!     .unwrap();
//!
//! let mut cursor = log.events_since(first, Priority::Debug);
//! assert!(cursor.next(&log).is_some());
//! assert!(cursor.next(&log).is_none());
//! ```

mod cursor;
mod tier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cursor::{CursorItem, EventCursor};

use crate::config::EventLogConfig;
use crate::error::{Error, Result};
use crate::message::codec;
use crate::path::{ConcretePath, FabricIndex};
use tier::Tier;

/// Fixed bookkeeping cost charged per stored event, on top of its payload.
pub const RECORD_OVERHEAD: usize = 24;

/// Priority tier of an event. Tiers are ordered `Debug < Info < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Diagnostic detail, first to be evicted.
    Debug,
    /// Ordinary operational events.
    Info,
    /// Events that must survive as long as possible.
    Critical,
}

impl Priority {
    /// All tiers from lowest to highest.
    pub const ALL: [Self; 3] = [Self::Debug, Self::Info, Self::Critical];

    const fn index(self) -> usize {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Critical => 2,
        }
    }
}

/// One stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Globally monotonic event number.
    pub number: u64,
    /// Tier the event was logged at.
    pub priority: Priority,
    /// Concrete path of the event.
    pub path: ConcretePath,
    /// Wall-clock time the event was logged.
    pub timestamp: DateTime<Utc>,
    /// Fabric the event is scoped to, if any.
    pub fabric_index: Option<FabricIndex>,
    /// Serialized event payload.
    pub payload: Vec<u8>,
}

impl EventRecord {
    /// Bytes this record is charged against its ring.
    #[must_use]
    pub fn storage_size(&self) -> usize {
        self.payload.len() + RECORD_OVERHEAD
    }

    /// Decodes the stored payload.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the stored bytes are not a valid container.
    pub fn data(&self) -> std::result::Result<Value, crate::error::ParseError> {
        codec::decode(&self.payload)
    }
}

/// Priority-tiered event log.
#[derive(Debug)]
pub struct EventLog {
    tiers: [Tier; 3],
    next_number: u64,
    /// Highest evicted event number per priority.
    evicted_through: [Option<u64>; 3],
}

impl EventLog {
    /// Creates an empty log with the configured tier capacities.
    #[must_use]
    pub fn new(config: &EventLogConfig) -> Self {
        Self {
            tiers: [
                Tier::new(config.debug_capacity),
                Tier::new(config.info_capacity),
                Tier::new(config.critical_capacity),
            ],
            next_number: 0,
            evicted_through: [None; 3],
        }
    }

    /// Number the next logged event will receive.
    #[must_use]
    pub fn next_event_number(&self) -> u64 {
        self.next_number
    }

    /// Total number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Tier::len).sum()
    }

    /// Returns `true` if no event is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(used, capacity)` in bytes for one tier's ring.
    #[must_use]
    pub fn tier_usage(&self, priority: Priority) -> (usize, usize) {
        let tier = &self.tiers[priority.index()];
        (tier.used(), tier.capacity())
    }

    /// Stores an event and returns its number.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoStorage` if the event cannot be stored even after
    /// every permitted eviction, and `Error::Parse` if the payload cannot be
    /// encoded. Existing events are left intact in both cases, except for
    /// evictions that were already permitted.
    pub fn log_event(
        &mut self,
        priority: Priority,
        path: ConcretePath,
        data: &Value,
        timestamp: DateTime<Utc>,
        fabric_index: Option<FabricIndex>,
    ) -> Result<u64> {
        let payload = codec::encode(data)?;
        let size = payload.len() + RECORD_OVERHEAD;
        let p = priority.index();

        let reachable: usize = self.tiers[..=p].iter().map(Tier::capacity).sum();
        if size > reachable {
            tracing::warn!(?priority, size, reachable, "Event larger than its tier can ever hold");
            return Err(Error::NoStorage);
        }

        self.make_room(p, size)?;

        let number = self.next_number;
        self.next_number += 1;
        self.tiers[p].push(EventRecord {
            number,
            priority,
            path,
            timestamp,
            fabric_index,
            payload,
        });
        tracing::trace!(number, ?priority, %path, "Logged event");
        Ok(number)
    }

    fn make_room(&mut self, p: usize, size: usize) -> Result<()> {
        while self.tiers[p].free() < size {
            let shortfall = size - self.tiers[p].free();

            if let Some(lower) = (0..p).find(|&l| self.tiers[l].capacity() > 0) {
                let free = self.tiers[lower].free();
                if free > 0 {
                    let moved = free.min(shortfall);
                    self.tiers[lower].shrink(moved);
                    self.tiers[p].grow(moved);
                } else {
                    self.evict_oldest(lower);
                }
                continue;
            }

            if p == Priority::Critical.index() || self.tiers[p].is_empty() {
                return Err(Error::NoStorage);
            }
            self.evict_oldest(p);
        }
        Ok(())
    }

    fn evict_oldest(&mut self, tier: usize) {
        if let Some(record) = self.tiers[tier].pop_oldest() {
            tracing::trace!(number = record.number, priority = ?record.priority, "Evicted event");
            let slot = &mut self.evicted_through[record.priority.index()];
            *slot = Some(slot.map_or(record.number, |n| n.max(record.number)));
        }
    }

    /// Returns a forward-only cursor over events numbered `from` or higher
    /// whose priority is at least `floor`.
    #[must_use]
    pub fn events_since(&self, from: u64, floor: Priority) -> EventCursor {
        EventCursor::new(from, floor)
    }

    /// Returns `true` if any stored event numbered `from` or higher satisfies `predicate`.
    pub fn any_since(&self, from: u64, mut predicate: impl FnMut(&EventRecord) -> bool) -> bool {
        self.tiers
            .iter()
            .any(|tier| tier.iter_from(from).any(&mut predicate))
    }

    /// Oldest stored record with number `>= from` among tiers at or above `floor`.
    fn first_at_or_after(&self, from: u64, floor: Priority) -> Option<&EventRecord> {
        Priority::ALL
            .iter()
            .filter(|p| **p >= floor)
            .filter_map(|p| self.tiers[p.index()].iter_from(from).next())
            .min_by_key(|record| record.number)
    }

    /// Last number in `from..before` that may belong to an evicted event at
    /// or above `floor`.
    ///
    /// Each ring evicts oldest first, so a tier has lost every event numbered
    /// up to its `evicted_through` mark and none above it.
    fn evicted_within(&self, from: u64, before: u64, floor: Priority) -> Option<u64> {
        let last = before.checked_sub(1)?;
        Priority::ALL
            .iter()
            .filter(|p| **p >= floor)
            .filter_map(|p| self.evicted_through[p.index()])
            .filter(|&evicted| evicted >= from)
            .map(|evicted| evicted.min(last))
            .filter(|&n| n >= from)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{ClusterId, EndpointId};
    use serde_json::json;

    fn path() -> ConcretePath {
        ConcretePath::new(EndpointId(1), ClusterId(0x3B), 1)
    }

    fn config(debug: usize, info: usize, critical: usize) -> EventLogConfig {
        EventLogConfig {
            debug_capacity: debug,
            info_capacity: info,
            critical_capacity: critical,
        }
    }

    /// Payload whose stored size is exactly `RECORD_OVERHEAD + 10`.
    fn ten_byte_payload() -> Value {
        json!("12345678")
    }

    const SLOT: usize = RECORD_OVERHEAD + 10;

    fn log(log: &mut EventLog, priority: Priority) -> Result<u64> {
        log.log_event(priority, path(), &ten_byte_payload(), Utc::now(), None)
    }

    #[test]
    fn numbers_are_monotonic_across_tiers() {
        let mut event_log = EventLog::new(&EventLogConfig::default());
        let a = log(&mut event_log, Priority::Debug).unwrap();
        let b = log(&mut event_log, Priority::Critical).unwrap();
        let c = log(&mut event_log, Priority::Info).unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(event_log.next_event_number(), 3);
    }

    #[test]
    fn debug_evicts_oldest_debug() {
        let mut event_log = EventLog::new(&config(2 * SLOT, SLOT, SLOT));
        log(&mut event_log, Priority::Debug).unwrap();
        log(&mut event_log, Priority::Debug).unwrap();
        log(&mut event_log, Priority::Debug).unwrap();
        assert_eq!(event_log.len(), 2);
        assert_eq!(event_log.evicted_through[0], Some(0));
    }

    #[test]
    fn higher_tier_reclaims_lower_tier_first() {
        let mut event_log = EventLog::new(&config(SLOT, SLOT, SLOT));
        let debug = log(&mut event_log, Priority::Debug).unwrap();
        let info = log(&mut event_log, Priority::Info).unwrap();
        // Info ring is full: the next info event takes the debug ring's space.
        log(&mut event_log, Priority::Info).unwrap();

        assert_eq!(event_log.evicted_through[0], Some(debug));
        assert_eq!(event_log.evicted_through[1], None);
        assert!(event_log.any_since(info, |r| r.number == info));
        assert_eq!(event_log.tier_usage(Priority::Debug), (0, 0));
        assert_eq!(event_log.tier_usage(Priority::Info), (2 * SLOT, 2 * SLOT));
    }

    #[test]
    fn lower_tier_never_reclaims_from_higher() {
        let mut event_log = EventLog::new(&config(SLOT, SLOT, SLOT));
        log(&mut event_log, Priority::Info).unwrap();
        log(&mut event_log, Priority::Debug).unwrap();
        log(&mut event_log, Priority::Debug).unwrap();
        assert_eq!(event_log.tier_usage(Priority::Info), (SLOT, SLOT));
        assert_eq!(event_log.len(), 2);
    }

    #[test]
    fn critical_fails_only_when_everything_is_critical() {
        let mut event_log = EventLog::new(&config(SLOT, SLOT, SLOT));
        log(&mut event_log, Priority::Debug).unwrap();
        log(&mut event_log, Priority::Info).unwrap();
        for _ in 0..3 {
            log(&mut event_log, Priority::Critical).unwrap();
        }
        assert_eq!(event_log.len(), 3);
        let before = event_log.len();
        assert!(matches!(log(&mut event_log, Priority::Critical), Err(Error::NoStorage)));
        assert_eq!(event_log.len(), before);
    }

    #[test]
    fn oversized_event_is_rejected_without_eviction() {
        let mut event_log = EventLog::new(&config(SLOT, SLOT, SLOT));
        log(&mut event_log, Priority::Debug).unwrap();
        let huge = json!("x".repeat(10 * SLOT));
        let result = event_log.log_event(Priority::Info, path(), &huge, Utc::now(), None);
        assert!(matches!(result, Err(Error::NoStorage)));
        assert_eq!(event_log.len(), 1);
    }

    #[test]
    fn stored_payload_decodes() {
        let mut event_log = EventLog::new(&EventLogConfig::default());
        let number = log(&mut event_log, Priority::Info).unwrap();
        let mut cursor = event_log.events_since(number, Priority::Debug);
        let Some(CursorItem::Event(record)) = cursor.next(&event_log) else {
            panic!("expected an event");
        };
        assert_eq!(record.data().unwrap(), ten_byte_payload());
        assert_eq!(record.storage_size(), SLOT);
    }
}
