// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry policy for automatic resubscription.
//!
//! Waits grow along the Fibonacci sequence: the n-th attempt waits
//! `fib(n + 1)` wait steps, so with a one second step the waits run
//! 1, 1, 2, 3, 5, 8 ... seconds. The Fibonacci index stops growing at
//! [`max_fibonacci_step`](ResubscribePolicy::max_fibonacci_step) and every
//! wait is capped at [`max_wait`](ResubscribePolicy::max_wait).

use std::time::Duration;

const DEFAULT_RETRY_BUDGET: u32 = 10;
const DEFAULT_MAX_FIBONACCI_STEP: u32 = 14;

/// When and how often a failed subscription is re-established.
///
/// A subscription that fails with a retryable error (timeout, lost session,
/// unknown subscription id, busy peer) is re-established with the same
/// parameters after [`wait_before`](Self::wait_before) has elapsed, as long
/// as the retry budget allows another attempt.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use im_reporting::client::ResubscribePolicy;
///
/// let policy = ResubscribePolicy::default();
/// assert_eq!(policy.wait_before(0), Duration::from_secs(1));
/// assert_eq!(policy.wait_before(4), Duration::from_secs(5));
///
/// assert!(!ResubscribePolicy::disabled().allows_attempt(0));
///
/// let policy = ResubscribePolicy::new()
///     .with_retry_budget(5)
///     .with_wait_step(Duration::from_millis(500))
///     .with_max_wait(Duration::from_secs(30));
/// assert!(!policy.allows_attempt(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResubscribePolicy {
    retry_budget: Option<u32>,
    wait_step: Duration,
    max_fibonacci_step: u32,
    max_wait: Duration,
}

impl ResubscribePolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with an empty retry budget: failures are final.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_retry_budget(0)
    }

    /// Allows at most `budget` attempts between two established subscriptions.
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = Some(budget);
        self
    }

    /// Keeps resubscribing for as long as failures are retryable.
    #[must_use]
    pub fn with_unlimited_retries(mut self) -> Self {
        self.retry_budget = None;
        self
    }

    /// Sets the duration of one Fibonacci unit.
    #[must_use]
    pub fn with_wait_step(mut self, step: Duration) -> Self {
        self.wait_step = step;
        self
    }

    /// Sets the index past which the Fibonacci sequence stops growing.
    #[must_use]
    pub fn with_max_fibonacci_step(mut self, step: u32) -> Self {
        self.max_fibonacci_step = step;
        self
    }

    /// Caps every wait.
    #[must_use]
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Attempts allowed before giving up, `None` if unlimited.
    #[must_use]
    pub fn retry_budget(&self) -> Option<u32> {
        self.retry_budget
    }

    /// Duration of one Fibonacci unit.
    #[must_use]
    pub fn wait_step(&self) -> Duration {
        self.wait_step
    }

    /// Index past which waits stop growing.
    #[must_use]
    pub fn max_fibonacci_step(&self) -> u32 {
        self.max_fibonacci_step
    }

    /// Upper bound of any wait.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Returns `true` if attempt number `attempt` (0-based) is within budget.
    #[must_use]
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.retry_budget.is_none_or(|budget| attempt < budget)
    }

    /// Wait before attempt number `attempt` (0-based).
    #[must_use]
    pub fn wait_before(&self, attempt: u32) -> Duration {
        let units = fibonacci(attempt.min(self.max_fibonacci_step).saturating_add(1));
        self.wait_step
            .checked_mul(units)
            .map_or(self.max_wait, |wait| wait.min(self.max_wait))
    }
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            retry_budget: Some(DEFAULT_RETRY_BUDGET),
            wait_step: Duration::from_secs(1),
            max_fibonacci_step: DEFAULT_MAX_FIBONACCI_STEP,
            max_wait: Duration::from_secs(60),
        }
    }
}

/// `fib(0) = 0`, `fib(1) = 1`; saturates instead of overflowing.
fn fibonacci(n: u32) -> u32 {
    let (mut current, mut next) = (0u32, 1u32);
    for _ in 0..n {
        (current, next) = (next, current.saturating_add(next));
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_sequence() {
        let first: Vec<u32> = (0..10).map(fibonacci).collect();
        assert_eq!(first, vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34]);
        assert_eq!(fibonacci(u32::MAX), u32::MAX);
    }

    #[test]
    fn waits_follow_fibonacci_and_cap() {
        let policy = ResubscribePolicy::default();
        let waits: Vec<u64> = (0..12).map(|n| policy.wait_before(n).as_secs()).collect();
        assert_eq!(waits, vec![1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 60, 60]);
    }

    #[test]
    fn fibonacci_step_limit_freezes_growth() {
        let policy = ResubscribePolicy::new()
            .with_max_fibonacci_step(3)
            .with_wait_step(Duration::from_millis(100));
        assert_eq!(policy.wait_before(3), Duration::from_millis(300));
        assert_eq!(policy.wait_before(50), Duration::from_millis(300));
    }

    #[test]
    fn huge_step_saturates_at_max_wait() {
        let policy = ResubscribePolicy::new()
            .with_wait_step(Duration::MAX)
            .with_max_wait(Duration::from_secs(90));
        assert_eq!(policy.wait_before(5), Duration::from_secs(90));
    }

    #[test]
    fn retry_budget_bounds_attempts() {
        let policy = ResubscribePolicy::new().with_retry_budget(2);
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(1));
        assert!(!policy.allows_attempt(2));
        assert!(ResubscribePolicy::new().with_unlimited_retries().allows_attempt(u32::MAX - 1));
    }

    #[test]
    fn disabled_has_no_budget() {
        let policy = ResubscribePolicy::disabled();
        assert_eq!(policy.retry_budget(), Some(0));
        assert!(!policy.allows_attempt(0));
    }
}
