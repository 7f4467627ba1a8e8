// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forward-only reader over the event log.

use super::{EventLog, EventRecord, Priority};

/// One step of an [`EventCursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorItem {
    /// The next matching event.
    Event(EventRecord),
    /// Events in `first..=last` were evicted before they could be read.
    Gap {
        /// First missing event number.
        first: u64,
        /// Last missing event number.
        last: u64,
    },
}

/// Lazy, forward-only, non-restartable sequence of events.
///
/// The cursor does not borrow the log, so the log may keep receiving and
/// evicting events between two calls to [`next`](Self::next). Evictions that
/// overtake the cursor surface as a single [`CursorItem::Gap`].
#[derive(Debug)]
pub struct EventCursor {
    next_number: u64,
    floor: Priority,
}

impl EventCursor {
    pub(super) fn new(from: u64, floor: Priority) -> Self {
        Self {
            next_number: from,
            floor,
        }
    }

    /// Number of the next event this cursor would yield.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.next_number
    }

    /// Advances the cursor.
    ///
    /// Returns `None` once every stored event has been consumed; events
    /// logged later are yielded by subsequent calls. A gap never covers a
    /// stored event: it ends before the next stored match, and may take in
    /// numbers that belonged to tiers below the floor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, log: &EventLog) -> Option<CursorItem> {
        let stored = log.first_at_or_after(self.next_number, self.floor);
        let before = stored.map_or(log.next_event_number(), |record| record.number);

        if let Some(last) = log.evicted_within(self.next_number, before, self.floor) {
            let first = self.next_number;
            self.next_number = last + 1;
            tracing::warn!(first, last, "Event cursor overtaken by eviction");
            return Some(CursorItem::Gap { first, last });
        }

        let record = stored?.clone();
        self.next_number = record.number + 1;
        Some(CursorItem::Event(record))
    }
}
