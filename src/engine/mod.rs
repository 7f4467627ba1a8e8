// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reporting engine.
//!
//! One [`Engine`] value owns everything: sessions, the event log, the dirty
//! set, the report scheduler, every read handler (publisher side) and every
//! read client (subscriber side). It never blocks and never reads the clock
//! outside the calls it is given; an outer loop (see
//! [`EngineDriver`](crate::EngineDriver)) feeds it inbound messages and
//! calls [`Engine::tick`] whenever [`Engine::next_wakeup`] says so.
//!
//! # Examples
//!
//! ```
//! use im_reporting::config::EngineConfig;
//! use im_reporting::path::{ClusterId, EndpointId, PathFilter};
//! use im_reporting::session::PeerId;
//! use im_reporting::transport::MemoryTransport;
//! use im_reporting::{Engine, InMemoryDataModel, ManualClock};
//!
//! let model = InMemoryDataModel::new();
//! model.set_attribute(EndpointId(1), ClusterId(6), 0, serde_json::json!(false));
//!
//! let (transport, _outbox) = MemoryTransport::new();
//! let mut engine = Engine::builder(EngineConfig::default())
//!     .with_transport(transport)
//!     .with_clock(ManualClock::new())
//!     .with_data_model(model.clone())
//!     .build()
//!     .unwrap();
//!
//! let _session = engine.add_session(PeerId::new(0x1122, 1));
//!
//! // The application changed a value: store it, then mark it dirty.
//! model.set_attribute(EndpointId(1), ClusterId(6), 0, serde_json::json!(true));
//! engine.set_dirty(PathFilter::concrete(EndpointId(1), ClusterId(6), 0));
//! engine.tick();
//! ```

mod builder;
mod client;
mod server;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub use builder::EngineBuilder;

use crate::callback::ApplicationCallback;
use crate::client::{ClientId, ClientState, ReadClient};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::data_model::DataModel;
use crate::error::{Error, Result, TransportError};
use crate::event_log::{EventLog, Priority};
use crate::handler::{HandlerId, InteractionKind, ReadHandler};
use crate::interest::InterestRegistry;
use crate::lifecycle::{EngineEvent, EventBus, TerminationReason};
use crate::message::{ExchangeId, Message, MessageType, StatusCode};
use crate::path::{ConcretePath, FabricIndex, PathFilter};
use crate::scheduler::{self, ReportScheduler};
use crate::session::{ExchangeKey, PeerId, SessionId, SessionTable};
use crate::transport::Transport;

/// Read/subscribe interaction engine.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    transport: Box<dyn Transport>,
    model: Box<dyn DataModel>,
    app: Box<dyn ApplicationCallback>,
    sessions: SessionTable,
    event_log: EventLog,
    registry: InterestRegistry,
    scheduler: Box<dyn ReportScheduler>,
    handlers: BTreeMap<HandlerId, ReadHandler>,
    clients: HashMap<ClientId, ReadClient>,
    next_handler: u64,
    next_subscription: u32,
    next_exchange: u16,
    in_flight_reports: usize,
    events: EventBus,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .field("clients", &self.clients.len())
            .field("in_flight_reports", &self.in_flight_reports)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Allocates the next exchange id opened by this engine.
fn allocate_exchange(counter: &mut u16) -> ExchangeId {
    *counter = counter.wrapping_add(1);
    ExchangeId(*counter)
}

impl Engine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    fn assemble(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        transport: Box<dyn Transport>,
        model: Box<dyn DataModel>,
        app: Box<dyn ApplicationCallback>,
        events: EventBus,
    ) -> Self {
        Self {
            event_log: EventLog::new(&config.event_log),
            registry: InterestRegistry::new(config.dirty_set_capacity),
            scheduler: scheduler::for_policy(config.scheduler),
            config,
            clock,
            transport,
            model,
            app,
            sessions: SessionTable::default(),
            handlers: BTreeMap::new(),
            clients: HashMap::new(),
            next_handler: 0,
            next_subscription: 0,
            next_exchange: 0,
            in_flight_reports: 0,
            events,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of live read handlers, reads and subscriptions alike.
    #[must_use]
    pub fn num_active_read_handlers(&self) -> usize {
        self.handlers.len()
    }

    /// Number of live read handlers serving subscriptions.
    #[must_use]
    pub fn num_subscriptions(&self) -> usize {
        self.handlers
            .values()
            .filter(|h| h.kind() == InteractionKind::Subscribe)
            .count()
    }

    /// Number of report chunks sent and not yet acknowledged.
    #[must_use]
    pub fn in_flight_reports(&self) -> usize {
        self.in_flight_reports
    }

    /// Looks up a read handler.
    #[must_use]
    pub fn handler(&self, id: HandlerId) -> Option<&ReadHandler> {
        self.handlers.get(&id)
    }

    /// Read handlers in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &ReadHandler> {
        self.handlers.values()
    }

    /// Number of live read clients.
    #[must_use]
    pub fn num_read_clients(&self) -> usize {
        self.clients.len()
    }

    /// Looks up a read client.
    #[must_use]
    pub fn client(&self, id: ClientId) -> Option<&ReadClient> {
        self.clients.get(&id)
    }

    /// State of a read client, `None` once it is gone.
    #[must_use]
    pub fn client_state(&self, id: ClientId) -> Option<ClientState> {
        self.clients.get(&id).map(ReadClient::state)
    }

    /// The event log.
    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Subscribes to lifecycle events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Registers a secure session with `peer`.
    pub fn add_session(&mut self, peer: PeerId) -> SessionId {
        let id = self.sessions.add(peer);
        tracing::debug!(session = %id, %peer, "Session added");
        id
    }

    /// Makes a defunct session usable again.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::UnknownSession` if the session does not exist.
    pub fn revive_session(&mut self, session: SessionId) -> Result<()> {
        if self.sessions.revive(session) {
            Ok(())
        } else {
            Err(TransportError::UnknownSession.into())
        }
    }

    /// Marks a session defunct and tears down everything running on it.
    ///
    /// Handlers are removed at once without sending anything. Clients fail
    /// with a session error, which subscriptions may recover from.
    pub fn mark_session_defunct(&mut self, session: SessionId) {
        if !self.sessions.mark_defunct(session) {
            return;
        }
        tracing::debug!(%session, "Session defunct");

        let handlers: Vec<HandlerId> = self
            .handlers
            .values()
            .filter(|h| h.session() == session)
            .map(ReadHandler::id)
            .collect();
        for id in handlers {
            self.teardown_handler(id, TerminationReason::SessionDefunct);
        }

        let clients: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.session() == session && c.state() != ClientState::Idle)
            .map(ReadClient::id)
            .collect();
        let error = Error::Transport(TransportError::SessionDefunct);
        for id in clients {
            self.fail_client(id, &error);
        }
    }

    /// Removes a fabric: its sessions, handlers and clients go away.
    pub fn remove_fabric(&mut self, fabric_index: FabricIndex) {
        let sessions = self.sessions.remove_fabric(fabric_index);
        tracing::debug!(fabric_index, sessions = sessions.len(), "Fabric removed");

        let handlers: Vec<HandlerId> = self
            .handlers
            .values()
            .filter(|h| h.peer().fabric_index == fabric_index || sessions.contains(&h.session()))
            .map(ReadHandler::id)
            .collect();
        for id in handlers {
            self.teardown_handler(id, TerminationReason::FabricRemoved);
        }

        let clients: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| sessions.contains(&c.session()))
            .map(ReadClient::id)
            .collect();
        let error = Error::Transport(TransportError::UnknownSession);
        for id in clients {
            if let Some(mut client) = self.clients.remove(&id) {
                client.abort(&error);
            }
        }
    }

    // =========================================================================
    // Data changes
    // =========================================================================

    /// Marks every path matched by `filter` as changed.
    ///
    /// Subscriptions interested in the path report it on their next
    /// eligible wake-up. A report already being chunked restarts the
    /// affected cluster so it carries the new value.
    pub fn set_dirty(&mut self, filter: PathFilter) {
        let generation = self.registry.set_dirty(filter);
        tracing::trace!(?filter, generation, "Path marked dirty");
        for handler in self.handlers.values_mut() {
            handler.on_dirty(&filter);
        }
    }

    /// Logs an event and returns its number.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoStorage` if the event log cannot hold the event.
    pub fn log_event(
        &mut self,
        priority: Priority,
        path: ConcretePath,
        data: &Value,
        fabric_index: Option<FabricIndex>,
    ) -> Result<u64> {
        self.event_log
            .log_event(priority, path, data, self.clock.wall_clock(), fabric_index)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handles a message received on `session`.
    ///
    /// Messages on a known exchange go to the handler or client that owns
    /// it. Otherwise read and subscribe requests create a handler,
    /// unsolicited reports are routed by subscription id and anything else is
    /// answered with `InvalidAction`. A status is never answered with a status.
    pub fn on_message_received(&mut self, session: SessionId, message: Message) {
        if !self.sessions.is_active(session) {
            tracing::debug!(%session, "Dropping message on inactive session");
            return;
        }
        let key = ExchangeKey::inbound(message.exchange, message.from_initiator);
        tracing::trace!(
            %session,
            exchange = %message.exchange,
            msg_type = ?message.msg_type,
            "Message received"
        );

        if let Some(id) = self
            .handlers
            .values()
            .find(|h| h.is_on_exchange(session, key))
            .map(ReadHandler::id)
        {
            self.on_handler_message(id, session, key, &message);
            return;
        }
        if let Some(id) = self
            .clients
            .values()
            .find(|c| c.is_on_exchange(session, key))
            .map(ReadClient::id)
        {
            self.on_client_message(id, session, key, &message);
            return;
        }

        match (message.from_initiator, message.msg_type) {
            (true, MessageType::ReadRequest) => {
                self.on_request(session, key, InteractionKind::Read, &message);
            }
            (true, MessageType::SubscribeRequest) => {
                self.on_request(session, key, InteractionKind::Subscribe, &message);
            }
            (true, MessageType::ReportData) => self.on_unsolicited_report(session, key, &message),
            (_, MessageType::StatusResponse) => {
                tracing::debug!(%session, exchange = %message.exchange, "Ignoring stray status");
            }
            (_, msg_type) => {
                tracing::debug!(%session, ?msg_type, "Unexpected message outside any exchange");
                self.reply_status(session, key, StatusCode::InvalidAction);
            }
        }
    }

    /// Handles the transport giving up on a message sent on `exchange`.
    pub fn on_response_timeout(&mut self, session: SessionId, exchange: ExchangeId) {
        let on_exchange = |key: Option<ExchangeKey>| key.is_some_and(|k| k.id == exchange);

        let handlers: Vec<HandlerId> = self
            .handlers
            .values()
            .filter(|h| h.session() == session && on_exchange(h.exchange()))
            .map(ReadHandler::id)
            .collect();
        for id in handlers {
            self.teardown_handler(id, TerminationReason::TransportFailure);
        }

        let clients: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.session() == session && on_exchange(c.exchange()))
            .map(ReadClient::id)
            .collect();
        let error = Error::Transport(TransportError::Timeout);
        for id in clients {
            self.fail_client(id, &error);
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Runs client timers, then reports.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.service_clients(now);
        self.run_reports();
    }

    /// Continues pending chunked reports and starts every subscription report
    /// the scheduler finds due.
    pub fn run_reports(&mut self) {
        let now = self.clock.now();
        let pending: Vec<HandlerId> = self
            .handlers
            .values()
            .filter(|h| h.has_pending_chunk())
            .map(ReadHandler::id)
            .collect();
        for id in pending {
            self.pump_chunk(id);
        }
        self.start_due_reports(now);
    }

    /// Earliest instant [`tick`](Self::tick) has something to do, if any.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<Instant> {
        let now = self.clock.now();
        if self.handlers.values().any(ReadHandler::has_pending_chunk) {
            return Some(now);
        }
        let reports = self.scheduler.next_wakeup(now, &self.readiness());
        let clients = self
            .clients
            .values()
            .filter_map(ReadClient::next_deadline)
            .min();
        reports.into_iter().chain(clients).min()
    }

    // =========================================================================
    // Subscription management
    // =========================================================================

    /// Tears down the subscription `subscription_id` of `peer`.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` if no such subscription exists.
    pub fn shutdown_subscription(&mut self, peer: PeerId, subscription_id: u32) -> Result<()> {
        let id = self
            .handlers
            .values()
            .find(|h| h.peer() == peer && h.subscription_id() == Some(subscription_id))
            .map(ReadHandler::id)
            .ok_or(Error::HandlerNotFound)?;
        self.teardown_handler(id, TerminationReason::Shutdown);
        Ok(())
    }

    /// Overrides the max interval of an idle subscription.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` for an unknown handler,
    /// `Error::IncorrectState` unless the handler is idle and
    /// `Error::InvalidArgument` for an out-of-range value.
    pub fn set_max_reporting_interval(&mut self, handler: HandlerId, seconds: u16) -> Result<()> {
        let now = self.clock.now();
        let entry = self
            .handlers
            .get_mut(&handler)
            .ok_or(Error::HandlerNotFound)?;
        entry.set_max_reporting_interval(seconds)?;
        if let Some(intervals) = entry.intervals() {
            self.scheduler
                .set_max_interval(handler, now, intervals.max_interval());
        }
        Ok(())
    }

    /// Changes the minimum interval of a subscription, shifting its min
    /// deadline only if that has not elapsed yet.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` if the subscription is not scheduled.
    pub fn set_interval_timestamps(&mut self, handler: HandlerId, min_interval: Duration) -> Result<()> {
        let now = self.clock.now();
        if self
            .scheduler
            .set_interval_timestamps(handler, now, min_interval)
        {
            Ok(())
        } else {
            Err(Error::HandlerNotFound)
        }
    }

    /// Tears down every handler and client.
    pub fn shutdown(&mut self) {
        let handlers: Vec<HandlerId> = self.handlers.keys().copied().collect();
        for id in handlers {
            self.teardown_handler(id, TerminationReason::Shutdown);
        }
        for (_, mut client) in self.clients.drain() {
            client.finish();
        }
        tracing::debug!("Engine shut down");
    }

    // =========================================================================
    // Outbound helpers
    // =========================================================================

    fn send(&mut self, session: SessionId, message: Message) -> std::result::Result<(), TransportError> {
        if !self.sessions.is_active(session) {
            return Err(if self.sessions.peer(session).is_some() {
                TransportError::SessionDefunct
            } else {
                TransportError::UnknownSession
            });
        }
        self.transport.send(session, message)
    }

    fn reply_status(&mut self, session: SessionId, key: ExchangeKey, status: StatusCode) {
        let message = match Message::status(key.id, key.locally_initiated, status) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode status response");
                return;
            }
        };
        if let Err(e) = self.send(session, message) {
            tracing::debug!(%session, error = %e, ?status, "Status response not sent");
        }
    }
}
