// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration.
//!
//! # Examples
//!
//! ```
//! use im_reporting::config::{EngineConfig, SchedulerPolicy};
//!
//! // Defaults
//! let config = EngineConfig::default();
//! assert_eq!(config.max_payload_size, 1024);
//!
//! // Builder style
//! let config = EngineConfig::new()
//!     .with_max_payload_size(512)
//!     .with_idle_mode_duration(300)
//!     .with_scheduler(SchedulerPolicy::Synchronized);
//!
//! // From JSON, missing fields take their defaults
//! let config = EngineConfig::from_json(r#"{"max_read_handlers": 4}"#).unwrap();
//! assert_eq!(config.max_read_handlers, 4);
//! assert_eq!(config.max_payload_size, 1024);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Which report scheduling policy the engine uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    /// Every subscription is evaluated on its own deadlines.
    #[default]
    Independent,
    /// Subscriptions whose minimum interval has elapsed are coalesced into
    /// the wake-up of whichever subscription fires first.
    Synchronized,
}

/// Byte capacity of each event log tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Capacity of the debug ring.
    pub debug_capacity: usize,
    /// Capacity of the info ring.
    pub info_capacity: usize,
    /// Capacity of the critical ring.
    pub critical_capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            debug_capacity: 1024,
            info_capacity: 1024,
            critical_capacity: 1024,
        }
    }
}

/// Configuration of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum encoded size of one message payload, in bytes.
    pub max_payload_size: usize,
    /// Maximum number of concurrent read handlers (reads and subscriptions).
    pub max_read_handlers: usize,
    /// Maximum number of attribute plus event paths in one request.
    pub max_paths_per_request: usize,
    /// Maximum number of concurrent read clients.
    pub max_read_clients: usize,
    /// Maximum number of distinct dirty filters before they collapse into a wildcard.
    pub dirty_set_capacity: usize,
    /// Largest max interval, in seconds, this publisher ever selects.
    pub publisher_max_interval_limit: u16,
    /// Idle-mode duration in seconds; `Some` makes this publisher an ICD.
    pub idle_mode_duration: Option<u16>,
    /// Extra seconds a client waits past the max interval before giving up.
    pub liveness_margin: u16,
    /// Report scheduling policy.
    pub scheduler: SchedulerPolicy,
    /// Event log tier capacities.
    pub event_log: EventLogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1024,
            max_read_handlers: 16,
            max_paths_per_request: 32,
            max_read_clients: 16,
            dirty_set_capacity: 64,
            publisher_max_interval_limit: 3600,
            idle_mode_duration: None,
            liveness_margin: 10,
            scheduler: SchedulerPolicy::Independent,
            event_log: EventLogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub fn with_max_payload_size(mut self, bytes: usize) -> Self {
        self.max_payload_size = bytes;
        self
    }

    /// Sets the read handler pool size.
    #[must_use]
    pub fn with_max_read_handlers(mut self, count: usize) -> Self {
        self.max_read_handlers = count;
        self
    }

    /// Sets the maximum number of paths per request.
    #[must_use]
    pub fn with_max_paths_per_request(mut self, count: usize) -> Self {
        self.max_paths_per_request = count;
        self
    }

    /// Sets the read client pool size.
    #[must_use]
    pub fn with_max_read_clients(mut self, count: usize) -> Self {
        self.max_read_clients = count;
        self
    }

    /// Sets the dirty set capacity.
    #[must_use]
    pub fn with_dirty_set_capacity(mut self, count: usize) -> Self {
        self.dirty_set_capacity = count;
        self
    }

    /// Marks this publisher as an ICD with the given idle-mode duration in seconds.
    #[must_use]
    pub fn with_idle_mode_duration(mut self, seconds: u16) -> Self {
        self.idle_mode_duration = Some(seconds);
        self
    }

    /// Sets the client liveness margin in seconds.
    #[must_use]
    pub fn with_liveness_margin(mut self, seconds: u16) -> Self {
        self.liveness_margin = seconds;
        self
    }

    /// Sets the scheduling policy.
    #[must_use]
    pub fn with_scheduler(mut self, policy: SchedulerPolicy) -> Self {
        self.scheduler = policy;
        self
    }

    /// Sets the event log tier capacities.
    #[must_use]
    pub fn with_event_log(mut self, event_log: EventLogConfig) -> Self {
        self.event_log = event_log;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_read_handlers, 16);
        assert_eq!(config.publisher_max_interval_limit, 3600);
        assert_eq!(config.idle_mode_duration, None);
        assert_eq!(config.scheduler, SchedulerPolicy::Independent);
    }

    #[test]
    fn builder_sets_fields() {
        let config = EngineConfig::new()
            .with_max_payload_size(256)
            .with_idle_mode_duration(300)
            .with_scheduler(SchedulerPolicy::Synchronized);
        assert_eq!(config.max_payload_size, 256);
        assert_eq!(config.idle_mode_duration, Some(300));
        assert_eq!(config.scheduler, SchedulerPolicy::Synchronized);
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = EngineConfig::from_json(
            r#"{"scheduler": "synchronized", "event_log": {"critical_capacity": 4096}}"#,
        )
        .unwrap();
        assert_eq!(config.scheduler, SchedulerPolicy::Synchronized);
        assert_eq!(config.event_log.critical_capacity, 4096);
        assert_eq!(config.event_log.debug_capacity, 1024);
        assert_eq!(config.max_payload_size, 1024);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(EngineConfig::from_json("{not json").is_err());
    }
}
