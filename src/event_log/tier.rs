// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-bounded ring holding the events of one priority tier.

use std::collections::VecDeque;

use super::EventRecord;

/// Ring of events ordered by event number.
///
/// `used <= capacity` holds between public operations.
#[derive(Debug)]
pub(super) struct Tier {
    capacity: usize,
    used: usize,
    entries: VecDeque<EventRecord>,
}

impl Tier {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            entries: VecDeque::new(),
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn used(&self) -> usize {
        self.used
    }

    pub(super) fn free(&self) -> usize {
        self.capacity - self.used
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gives up `bytes` of free capacity. Caller guarantees `bytes <= free()`.
    pub(super) fn shrink(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.free());
        self.capacity -= bytes;
    }

    pub(super) fn grow(&mut self, bytes: usize) {
        self.capacity += bytes;
    }

    /// Appends a record. Caller guarantees it fits.
    pub(super) fn push(&mut self, record: EventRecord) {
        debug_assert!(record.storage_size() <= self.free());
        self.used += record.storage_size();
        self.entries.push_back(record);
    }

    pub(super) fn pop_oldest(&mut self) -> Option<EventRecord> {
        let record = self.entries.pop_front()?;
        self.used -= record.storage_size();
        Some(record)
    }

    /// Records numbered `from` or higher, oldest first.
    pub(super) fn iter_from(&self, from: u64) -> impl Iterator<Item = &EventRecord> {
        let start = self.entries.partition_point(|record| record.number < from);
        self.entries.range(start..)
    }
}
