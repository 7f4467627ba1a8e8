// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine builder.

use std::sync::Arc;

use crate::callback::{ApplicationCallback, DefaultApplicationCallback};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::data_model::{DataModel, InMemoryDataModel};
use crate::error::{Error, Result};
use crate::lifecycle::EventBus;
use crate::reporting;
use crate::transport::Transport;

use super::Engine;

/// Builder for an [`Engine`].
///
/// Only the transport is mandatory. The clock defaults to [`SystemClock`],
/// the data model to an empty [`InMemoryDataModel`] and the application
/// callback to [`DefaultApplicationCallback`].
///
/// # Examples
///
/// ```
/// use im_reporting::config::EngineConfig;
/// use im_reporting::transport::MemoryTransport;
/// use im_reporting::{Engine, InMemoryDataModel, ManualClock};
///
/// let (transport, _outbox) = MemoryTransport::new();
/// let engine = Engine::builder(EngineConfig::default())
///     .with_transport(transport)
///     .with_clock(ManualClock::new())
///     .with_data_model(InMemoryDataModel::new())
///     .build()
///     .unwrap();
/// assert_eq!(engine.num_active_read_handlers(), 0);
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<Box<dyn Transport>>,
    model: Option<Box<dyn DataModel>>,
    app: Option<Box<dyn ApplicationCallback>>,
    event_capacity: Option<usize>,
}

impl EngineBuilder {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            transport: None,
            model: None,
            app: None,
            event_capacity: None,
        }
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets the outbound transport.
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets the data model reports are read from.
    #[must_use]
    pub fn with_data_model(mut self, model: impl DataModel + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    /// Sets the publisher application hooks.
    #[must_use]
    pub fn with_application_callback(mut self, app: impl ApplicationCallback + 'static) -> Self {
        self.app = Some(Box::new(app));
        self
    }

    /// Sets the lifecycle event bus capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if no transport was given or the
    /// payload limit cannot hold a report carrying a single attribute status.
    pub fn build(self) -> Result<Engine> {
        let transport = self
            .transport
            .ok_or_else(|| Error::InvalidArgument("engine needs a transport".to_string()))?;
        let minimum = reporting::minimum_payload_size()?;
        if self.config.max_payload_size < minimum {
            return Err(Error::InvalidArgument(format!(
                "max payload size must be at least {minimum} bytes"
            )));
        }

        let events = self
            .event_capacity
            .map_or_else(EventBus::new, EventBus::with_capacity);

        Ok(Engine::assemble(
            self.config,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            transport,
            self.model
                .unwrap_or_else(|| Box::new(InMemoryDataModel::new())),
            self.app
                .unwrap_or_else(|| Box::new(DefaultApplicationCallback)),
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn build_requires_transport() {
        let result = EngineBuilder::new(EngineConfig::default()).build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn build_rejects_zero_payload() {
        let (transport, _) = MemoryTransport::new();
        let result = EngineBuilder::new(EngineConfig::new().with_max_payload_size(0))
            .with_transport(transport)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_payload_below_one_status() {
        let minimum = reporting::minimum_payload_size().unwrap();
        let (transport, _) = MemoryTransport::new();
        let result = EngineBuilder::new(EngineConfig::new().with_max_payload_size(minimum - 1))
            .with_transport(transport)
            .build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let (transport, _) = MemoryTransport::new();
        let result = EngineBuilder::new(EngineConfig::new().with_max_payload_size(minimum))
            .with_transport(transport)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn build_with_defaults() {
        let (transport, _) = MemoryTransport::new();
        let engine = EngineBuilder::new(EngineConfig::default())
            .with_transport(transport)
            .with_event_capacity(4)
            .build()
            .unwrap();
        assert_eq!(engine.in_flight_reports(), 0);
        assert_eq!(engine.num_read_clients(), 0);
    }
}
