// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time sources.
//!
//! The engine reads time only inside the calls it is given, through a
//! [`Clock`]. [`SystemClock`] follows the tokio clock (and therefore obeys
//! `tokio::time::pause`); [`ManualClock`] only moves when told to.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for all scheduling decisions.
    fn now(&self) -> Instant;

    /// Wall-clock time used to timestamp events.
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Clock backed by the tokio runtime and the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug)]
struct ManualState {
    start: Instant,
    start_wall: DateTime<Utc>,
    elapsed: Duration,
}

/// Clock that only advances through [`advance`](Self::advance).
///
/// Clones share the same time, so two engines wired together in a test
/// observe one timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                start: Instant::now(),
                start_wall: Utc::now(),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.state.lock().elapsed += by;
    }

    /// Time elapsed since the clock was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock();
        state.start + state.elapsed
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let state = self.state.lock();
        let elapsed =
            chrono::Duration::from_std(state.elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        state.start_wall + elapsed
    }
}
