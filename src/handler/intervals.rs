// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription interval negotiation.

use std::time::Duration;

use crate::error::{Error, Result};

/// Reporting intervals of one subscription, in seconds.
///
/// After negotiation `min_interval_floor <= effective_max <=
/// max(publisher_limit, subscriber_requested_max)` always holds, and
/// [`set_max_reporting_interval`](Self::set_max_reporting_interval) keeps it
/// that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionIntervals {
    /// Minimum seconds between two reports, as requested.
    pub min_interval_floor: u16,
    /// Maximum seconds between two reports the subscriber asked for.
    pub subscriber_requested_max: u16,
    /// Publisher-side limit: the idle-mode duration of an ICD, otherwise the
    /// configured publisher maximum.
    pub publisher_limit: u16,
    effective_max: u16,
}

impl SubscriptionIntervals {
    /// Negotiates the max interval for a subscription.
    ///
    /// A regular publisher takes the subscriber's ceiling as is. An ICD
    /// (`idle_mode_duration` set) must not wake more often than its idle
    /// mode allows: it picks the smallest multiple of the idle duration that
    /// is at least the floor, as long as that stays within the ceiling, and
    /// the ceiling otherwise. A ceiling below the idle duration is raised to
    /// the idle duration.
    ///
    /// # Examples
    ///
    /// ```
    /// use im_reporting::handler::SubscriptionIntervals;
    ///
    /// let icd = SubscriptionIntervals::negotiate(305, 605, 3600, Some(300)).unwrap();
    /// assert_eq!(icd.effective_max(), 600);
    ///
    /// let regular = SubscriptionIntervals::negotiate(1, 20, 3600, None).unwrap();
    /// assert_eq!(regular.effective_max(), 20);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the floor exceeds the ceiling.
    pub fn negotiate(
        min_interval_floor: u16,
        max_interval_ceiling: u16,
        publisher_max_interval_limit: u16,
        idle_mode_duration: Option<u16>,
    ) -> Result<Self> {
        if min_interval_floor > max_interval_ceiling {
            return Err(Error::InvalidArgument(format!(
                "min interval floor {min_interval_floor} > max interval ceiling {max_interval_ceiling}"
            )));
        }

        let (publisher_limit, effective_max) = match idle_mode_duration {
            Some(idle) if idle > 0 => (
                idle,
                icd_max_interval(min_interval_floor, max_interval_ceiling, idle),
            ),
            _ => (publisher_max_interval_limit, max_interval_ceiling),
        };

        Ok(Self {
            min_interval_floor,
            subscriber_requested_max: max_interval_ceiling,
            publisher_limit,
            effective_max,
        })
    }

    /// Negotiated max interval in seconds.
    #[must_use]
    pub fn effective_max(&self) -> u16 {
        self.effective_max
    }

    /// Largest value the max interval may take.
    #[must_use]
    pub fn upper_bound(&self) -> u16 {
        self.publisher_limit.max(self.subscriber_requested_max)
    }

    /// Minimum interval as a duration.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_interval_floor))
    }

    /// Maximum interval as a duration.
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.effective_max))
    }

    /// Overrides the negotiated max interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `seconds` is below the floor or
    /// above [`upper_bound`](Self::upper_bound).
    pub fn set_max_reporting_interval(&mut self, seconds: u16) -> Result<()> {
        if seconds < self.min_interval_floor || seconds > self.upper_bound() {
            return Err(Error::InvalidArgument(format!(
                "max interval {seconds} outside {}..={}",
                self.min_interval_floor,
                self.upper_bound()
            )));
        }
        self.effective_max = seconds;
        Ok(())
    }
}

fn icd_max_interval(floor: u16, ceiling: u16, idle: u16) -> u16 {
    if ceiling < idle {
        return idle;
    }
    let multiple = u32::from(floor).div_ceil(u32::from(idle)).max(1) * u32::from(idle);
    match u16::try_from(multiple) {
        Ok(m) if m <= ceiling => m,
        _ => ceiling,
    }
}
