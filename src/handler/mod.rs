// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server side of one read or subscribe transaction.
//!
//! A [`ReadHandler`] walks this state machine:
//!
//! ```text
//! Idle -> AwaitingRequestProcessing -> GeneratingReports <-> AwaitingReportAck
//!                                            ^                     |
//!                                            +------- Idle <-------+   (subscribe)
//!                                                                  |
//!                                                              Terminated (read,
//!                                                              teardown)
//! ```
//!
//! A read ends after its single (possibly chunked) report. A subscription
//! sends a priming report followed by a `SubscribeResponse`, then cycles
//! between `Idle` and `GeneratingReports` until it is torn down. At most one
//! report message is in flight at any time.

mod intervals;
mod request;

use std::fmt;

pub use intervals::SubscriptionIntervals;
pub use request::Interest;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event_log::EventLog;
use crate::interest::InterestRegistry;
use crate::message::{
    ExchangeId, Message, MessageType, ReadRequest, ReportData, SubscribeRequest, SubscribeResponse,
};
use crate::path::{FabricIndex, PathFilter};
use crate::reporting::{ReportScope, ReportTransaction, Sources, event_wanted};
use crate::session::{ExchangeKey, PeerId, SessionId};

/// Engine-local identifier of a read handler.
///
/// Ids are allocated in increasing order and never reused, so ordering by
/// id is registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Creates an id from its raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.0)
    }
}

/// Kind of interaction a handler or client serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    /// One-shot read.
    Read,
    /// Ongoing subscription.
    Subscribe,
}

/// Protocol state of a [`ReadHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerState {
    /// No report in progress.
    Idle,
    /// The request is being parsed and negotiated.
    AwaitingRequestProcessing,
    /// A report is being produced; the next chunk may be sent.
    GeneratingReports,
    /// A chunk was sent and its acknowledgement is pending.
    AwaitingReportAck,
    /// The transaction is over.
    Terminated,
}

/// What an acknowledged chunk leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// The report has more chunks.
    MoreChunks,
    /// The priming report is complete; a `SubscribeResponse` is owed.
    PrimingComplete,
    /// A later report is complete.
    ReportComplete,
}

/// Server-side state of one read or subscribe transaction.
#[derive(Debug)]
pub struct ReadHandler {
    id: HandlerId,
    kind: InteractionKind,
    session: SessionId,
    peer: PeerId,
    exchange: Option<ExchangeKey>,
    subscription_id: Option<u32>,
    intervals: Option<SubscriptionIntervals>,
    interest: Interest,
    state: HandlerState,
    report_in_flight: bool,
    primed: bool,
    reported_generation: u64,
    next_event: u64,
    transaction: Option<ReportTransaction>,
    last_report_chunks: u32,
}

impl ReadHandler {
    pub(crate) fn new(
        id: HandlerId,
        kind: InteractionKind,
        session: SessionId,
        peer: PeerId,
        exchange: ExchangeKey,
        generation: u64,
    ) -> Self {
        Self {
            id,
            kind,
            session,
            peer,
            exchange: Some(exchange),
            subscription_id: None,
            intervals: None,
            interest: Interest::default(),
            state: HandlerState::Idle,
            report_in_flight: false,
            primed: false,
            reported_generation: generation,
            next_event: 0,
            transaction: None,
            last_report_chunks: 0,
        }
    }

    /// Handler id.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Read or subscribe.
    #[must_use]
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Session the handler reports on.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Peer that issued the request.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Subscription id, for subscriptions.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u32> {
        self.subscription_id
    }

    /// Negotiated intervals, for subscriptions.
    #[must_use]
    pub fn intervals(&self) -> Option<&SubscriptionIntervals> {
        self.intervals.as_ref()
    }

    /// Parsed interest of the request.
    #[must_use]
    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Returns `true` while a sent chunk awaits its acknowledgement.
    #[must_use]
    pub fn is_report_in_flight(&self) -> bool {
        self.report_in_flight
    }

    /// Returns `true` once the subscription's priming report is complete.
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Dirty generation the handler has reported up to.
    #[must_use]
    pub fn reported_generation(&self) -> u64 {
        self.reported_generation
    }

    /// Number of messages the last completed report took.
    #[must_use]
    pub fn last_report_chunks(&self) -> u32 {
        self.last_report_chunks
    }

    pub(crate) fn exchange(&self) -> Option<ExchangeKey> {
        self.exchange
    }

    pub(crate) fn is_on_exchange(&self, session: SessionId, key: ExchangeKey) -> bool {
        self.session == session && self.exchange == Some(key)
    }

    fn fabric_filter(&self) -> Option<FabricIndex> {
        self.interest
            .fabric_filtered
            .then_some(self.peer.fabric_index)
    }

    // ========================================================================
    // Request processing
    // ========================================================================

    /// Parses a read request and prepares the report.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncorrectState` if the handler is not a fresh read
    /// handler, `Error::ResourceExhausted` for too many paths and
    /// `Error::Parse` for malformed paths. The handler is terminated on error.
    pub fn process_read_request(&mut self, request: &ReadRequest, max_paths: usize) -> Result<()> {
        if self.kind != InteractionKind::Read || self.state != HandlerState::Idle || self.primed {
            return Err(Error::IncorrectState("read request on a busy handler"));
        }
        self.state = HandlerState::AwaitingRequestProcessing;

        let parsed = Interest::parse(&request.attribute_requests, &request.event_requests, max_paths);
        self.interest = match parsed {
            Ok(interest) => interest,
            Err(e) => {
                self.state = HandlerState::Terminated;
                return Err(e);
            }
        };
        self.interest.data_version_filters = request.data_version_filters.clone();
        self.interest.fabric_filtered = request.is_fabric_filtered;
        self.interest.event_min = request.event_min.unwrap_or(0);
        self.next_event = self.interest.event_min;

        tracing::debug!(handler = %self.id, peer = %self.peer, "Read request accepted");
        self.state = HandlerState::GeneratingReports;
        Ok(())
    }

    /// Parses a subscribe request and negotiates its intervals.
    ///
    /// The handler stays in `AwaitingRequestProcessing` so the application
    /// can still adjust the intervals; [`start_reporting`](Self::start_reporting)
    /// moves it on.
    ///
    /// # Errors
    ///
    /// As for [`process_read_request`](Self::process_read_request), plus
    /// `Error::InvalidArgument` if the requested floor exceeds the ceiling.
    pub fn process_subscribe_request(
        &mut self,
        request: &SubscribeRequest,
        config: &EngineConfig,
        subscription_id: u32,
    ) -> Result<()> {
        if self.kind != InteractionKind::Subscribe || self.state != HandlerState::Idle || self.primed
        {
            return Err(Error::IncorrectState("subscribe request on a busy handler"));
        }
        self.state = HandlerState::AwaitingRequestProcessing;

        let result = Interest::parse(
            &request.attribute_requests,
            &request.event_requests,
            config.max_paths_per_request,
        )
        .and_then(|interest| {
            let intervals = SubscriptionIntervals::negotiate(
                request.min_interval_floor,
                request.max_interval_ceiling,
                config.publisher_max_interval_limit,
                config.idle_mode_duration,
            )?;
            Ok((interest, intervals))
        });
        let (interest, intervals) = match result {
            Ok(parsed) => parsed,
            Err(e) => {
                self.state = HandlerState::Terminated;
                return Err(e);
            }
        };

        self.interest = interest;
        self.interest.data_version_filters = request.data_version_filters.clone();
        self.interest.fabric_filtered = request.is_fabric_filtered;
        self.interest.event_min = request.event_min.unwrap_or(0);
        self.next_event = self.interest.event_min;
        self.intervals = Some(intervals);
        self.subscription_id = Some(subscription_id);

        tracing::debug!(
            handler = %self.id,
            peer = %self.peer,
            subscription_id,
            min = intervals.min_interval_floor,
            max = intervals.effective_max(),
            "Subscribe request negotiated"
        );
        Ok(())
    }

    pub(crate) fn intervals_mut(&mut self) -> Option<&mut SubscriptionIntervals> {
        self.intervals.as_mut()
    }

    /// Leaves request processing and starts the priming report.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncorrectState` unless a request was just processed.
    pub fn start_reporting(&mut self) -> Result<()> {
        if self.state != HandlerState::AwaitingRequestProcessing {
            return Err(Error::IncorrectState("no request being processed"));
        }
        self.state = HandlerState::GeneratingReports;
        Ok(())
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Returns `true` if anything of interest changed since the last report.
    #[must_use]
    pub fn is_dirty(&self, registry: &InterestRegistry, event_log: &EventLog) -> bool {
        registry.is_dirty_for(self.reported_generation, &self.interest.attributes)
            || (!self.interest.events.is_empty()
                && event_log.any_since(self.next_event, |record| {
                    event_wanted(record, &self.interest.events, self.fabric_filter())
                }))
    }

    /// Returns `true` if an event matching an urgent interest is pending.
    #[must_use]
    pub fn has_urgent_events(&self, event_log: &EventLog) -> bool {
        let urgent: Vec<_> = self.interest.events.iter().filter(|i| i.urgent).copied().collect();
        !urgent.is_empty()
            && event_log.any_since(self.next_event, |record| {
                event_wanted(record, &urgent, self.fabric_filter())
            })
    }

    /// Returns `true` if an established subscription is free to start a new report.
    #[must_use]
    pub fn should_start_reporting(&self) -> bool {
        self.kind == InteractionKind::Subscribe
            && self.primed
            && self.state == HandlerState::Idle
            && !self.report_in_flight
    }

    /// Returns `true` if the next chunk of the current report may be built now.
    #[must_use]
    pub fn has_pending_chunk(&self) -> bool {
        self.state == HandlerState::GeneratingReports && !self.report_in_flight
    }

    /// Opens a report transaction if none is running.
    ///
    /// A report after priming opens a new exchange, allocated by `open_exchange`.
    pub(crate) fn begin_transaction(
        &mut self,
        registry: &InterestRegistry,
        event_log: &EventLog,
        open_exchange: impl FnOnce() -> ExchangeId,
    ) {
        if self.transaction.is_some() {
            return;
        }
        let priming = !self.primed;
        let filters = if priming {
            self.interest.attributes.clone()
        } else {
            registry.dirty_filters_for(self.reported_generation, &self.interest.attributes)
        };
        if !priming {
            self.exchange = Some(ExchangeKey::local(open_exchange()));
            self.state = HandlerState::GeneratingReports;
        }
        self.transaction = Some(ReportTransaction::new(
            filters,
            priming,
            registry,
            event_log,
            self.next_event,
            !self.interest.events.is_empty(),
        ));
    }

    /// Builds the next chunk of the running transaction.
    pub(crate) fn build_chunk(&mut self, sources: &Sources<'_>) -> Result<ReportData> {
        let scope = ReportScope {
            subscription_id: self.subscription_id,
            since_generation: self.reported_generation,
            data_version_filters: &self.interest.data_version_filters,
            event_interests: &self.interest.events,
            fabric_filter: self.fabric_filter(),
        };
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(Error::IncorrectState("no report transaction"))?;
        let mut report = transaction.build_chunk(&scope, sources)?;
        if self.kind == InteractionKind::Read && !report.more_chunked_messages {
            report.suppress_response = true;
        }
        Ok(report)
    }

    /// Wraps a report chunk for sending and marks it in flight.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncorrectState` if the handler is not generating a
    /// report or a chunk is already in flight, and `Error::Parse` if the
    /// report cannot be encoded.
    pub fn send_report_data(&mut self, report: &ReportData) -> Result<Message> {
        if self.state != HandlerState::GeneratingReports || self.report_in_flight {
            return Err(Error::IncorrectState("report already in flight"));
        }
        let exchange = self
            .exchange
            .ok_or(Error::IncorrectState("no exchange to report on"))?;
        let message = Message::encode(
            exchange.id,
            exchange.locally_initiated,
            MessageType::ReportData,
            report,
        )?;
        self.report_in_flight = true;
        self.state = HandlerState::AwaitingReportAck;
        Ok(message)
    }

    /// Handles the acknowledgement of the chunk in flight.
    pub(crate) fn on_report_acked(&mut self) -> Result<AckOutcome> {
        if self.state != HandlerState::AwaitingReportAck {
            return Err(Error::IncorrectState("no report awaiting acknowledgement"));
        }
        self.report_in_flight = false;

        let complete = self
            .transaction
            .as_ref()
            .is_none_or(ReportTransaction::is_complete);
        if !complete {
            self.state = HandlerState::GeneratingReports;
            return Ok(AckOutcome::MoreChunks);
        }

        let priming = self.finish_transaction();
        if priming && self.kind == InteractionKind::Subscribe {
            return Ok(AckOutcome::PrimingComplete);
        }
        self.exchange = None;
        self.state = HandlerState::Idle;
        Ok(AckOutcome::ReportComplete)
    }

    /// Records the running transaction as delivered. Returns `true` if it was
    /// the priming report.
    pub(crate) fn finish_transaction(&mut self) -> bool {
        let Some(transaction) = self.transaction.take() else {
            return false;
        };
        self.reported_generation = self.reported_generation.max(transaction.snapshot_generation());
        self.next_event = self.next_event.max(transaction.event_limit());
        self.last_report_chunks = transaction.chunks();
        tracing::trace!(
            handler = %self.id,
            chunks = transaction.chunks(),
            generation = self.reported_generation,
            "Report transaction complete"
        );
        transaction.is_priming()
    }

    /// Builds the `SubscribeResponse` that ends the priming phase.
    pub(crate) fn subscribe_response(&mut self) -> Result<Message> {
        let (Some(subscription_id), Some(intervals)) = (self.subscription_id, self.intervals) else {
            return Err(Error::IncorrectState("not a subscription"));
        };
        let exchange = self
            .exchange
            .ok_or(Error::IncorrectState("no exchange to respond on"))?;
        let message = Message::encode(
            exchange.id,
            exchange.locally_initiated,
            MessageType::SubscribeResponse,
            &SubscribeResponse {
                subscription_id,
                max_interval: intervals.effective_max(),
            },
        )?;
        self.primed = true;
        self.exchange = None;
        self.state = HandlerState::Idle;
        Ok(message)
    }

    /// Forwards a dirty mark to the running transaction.
    pub(crate) fn on_dirty(&mut self, filter: &PathFilter) {
        let interested = self
            .interest
            .attributes
            .iter()
            .any(|f| f.intersect(filter).is_some());
        if interested && let Some(transaction) = self.transaction.as_mut() {
            transaction.on_dirty(filter);
        }
    }

    /// Overrides the negotiated max interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncorrectState` unless the handler is an idle
    /// subscription, and `Error::InvalidArgument` if `seconds` is out of range.
    pub fn set_max_reporting_interval(&mut self, seconds: u16) -> Result<()> {
        if self.state != HandlerState::Idle {
            return Err(Error::IncorrectState("max interval can only change while idle"));
        }
        let intervals = self
            .intervals
            .as_mut()
            .ok_or(Error::IncorrectState("not a subscription"))?;
        intervals.set_max_reporting_interval(seconds)
    }

    /// Ends the handler. Returns `true` if a chunk was in flight.
    pub(crate) fn terminate(&mut self) -> bool {
        let was_in_flight = self.report_in_flight;
        self.report_in_flight = false;
        self.transaction = None;
        self.exchange = None;
        self.state = HandlerState::Terminated;
        was_in_flight
    }
}
