// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publisher side: read handlers, report chunking and scheduling.

use tokio::time::Instant;

use crate::error::Result;
use crate::handler::{AckOutcome, HandlerId, InteractionKind, ReadHandler};
use crate::lifecycle::{EngineEvent, TerminationReason};
use crate::message::{Message, MessageType, ReadRequest, StatusCode, StatusResponse, SubscribeRequest};
use crate::reporting::Sources;
use crate::scheduler::Readiness;
use crate::session::{ExchangeKey, SessionId};

use super::{Engine, allocate_exchange};

impl Engine {
    // =========================================================================
    // Requests
    // =========================================================================

    /// Creates a handler for an inbound read or subscribe request.
    pub(super) fn on_request(
        &mut self,
        session: SessionId,
        key: ExchangeKey,
        kind: InteractionKind,
        message: &Message,
    ) {
        let Some(peer) = self.sessions.peer(session) else {
            return;
        };
        self.next_handler += 1;
        let id = HandlerId::from_raw(self.next_handler);
        let mut handler = ReadHandler::new(
            id,
            kind,
            session,
            peer,
            key,
            self.registry.current_generation(),
        );

        let keep_subscriptions = match self.accept_request(&mut handler, message) {
            Ok(keep) => keep,
            Err(e) => {
                tracing::debug!(handler = %id, %peer, error = %e, "Request rejected");
                self.reply_status(session, key, e.status_code());
                return;
            }
        };

        if kind == InteractionKind::Subscribe && !keep_subscriptions {
            let replaced: Vec<HandlerId> = self
                .handlers
                .values()
                .filter(|h| h.kind() == InteractionKind::Subscribe && h.peer() == peer)
                .map(ReadHandler::id)
                .collect();
            for old in replaced {
                self.teardown_handler(old, TerminationReason::Replaced);
            }
        }

        if self.handlers.len() >= self.config.max_read_handlers {
            tracing::warn!(
                %peer,
                max = self.config.max_read_handlers,
                "Read handler pool exhausted"
            );
            self.reply_status(session, key, StatusCode::ResourceExhausted);
            return;
        }

        if let Some(intervals) = handler.intervals_mut()
            && let Err(status) = self.app.on_subscription_requested(peer, intervals)
        {
            tracing::debug!(handler = %id, ?status, "Subscription refused by application");
            self.reply_status(session, key, status);
            return;
        }

        if kind == InteractionKind::Subscribe
            && let Err(e) = handler.start_reporting()
        {
            self.reply_status(session, key, e.status_code());
            return;
        }

        self.handlers.insert(id, handler);
        self.pump_chunk(id);
    }

    /// Decodes and processes the request body. Returns `keep_subscriptions`.
    fn accept_request(&mut self, handler: &mut ReadHandler, message: &Message) -> Result<bool> {
        match handler.kind() {
            InteractionKind::Read => {
                let request: ReadRequest = message.decode()?;
                handler.process_read_request(&request, self.config.max_paths_per_request)?;
                Ok(true)
            }
            InteractionKind::Subscribe => {
                let request: SubscribeRequest = message.decode()?;
                let subscription_id = self.allocate_subscription_id();
                handler.process_subscribe_request(&request, &self.config, subscription_id)?;
                Ok(request.keep_subscriptions)
            }
        }
    }

    /// Next subscription id that is neither zero nor in use.
    fn allocate_subscription_id(&mut self) -> u32 {
        loop {
            self.next_subscription = self.next_subscription.wrapping_add(1);
            let candidate = self.next_subscription;
            if candidate != 0
                && !self
                    .handlers
                    .values()
                    .any(|h| h.subscription_id() == Some(candidate))
            {
                return candidate;
            }
        }
    }

    // =========================================================================
    // Handler exchanges
    // =========================================================================

    /// Handles a message on a handler's exchange.
    ///
    /// Only a success status acknowledging the chunk in flight is expected.
    /// A failure status ends the handler silently; anything else is answered
    /// with `InvalidAction` first.
    pub(super) fn on_handler_message(
        &mut self,
        id: HandlerId,
        session: SessionId,
        key: ExchangeKey,
        message: &Message,
    ) {
        let awaiting_ack = self
            .handlers
            .get(&id)
            .is_some_and(ReadHandler::is_report_in_flight);

        if message.msg_type != MessageType::StatusResponse {
            tracing::debug!(handler = %id, msg_type = ?message.msg_type, "Unexpected message on report exchange");
            self.reply_status(session, key, StatusCode::InvalidAction);
            self.teardown_handler(id, TerminationReason::ProtocolViolation);
            return;
        }

        match message.decode::<StatusResponse>() {
            Ok(response) if response.status.is_success() && awaiting_ack => self.on_chunk_acked(id),
            Ok(response) if !response.status.is_success() => {
                tracing::debug!(handler = %id, status = ?response.status, "Peer ended the report");
                self.teardown_handler(id, TerminationReason::PeerStatus(response.status));
            }
            Ok(_) => {
                tracing::debug!(handler = %id, "Acknowledgement with no report in flight");
                self.reply_status(session, key, StatusCode::InvalidAction);
                self.teardown_handler(id, TerminationReason::ProtocolViolation);
            }
            Err(e) => {
                tracing::debug!(handler = %id, error = %e, "Malformed status response");
                self.reply_status(session, key, StatusCode::InvalidAction);
                self.teardown_handler(id, TerminationReason::ProtocolViolation);
            }
        }
    }

    fn on_chunk_acked(&mut self, id: HandlerId) {
        let Some(handler) = self.handlers.get_mut(&id) else {
            return;
        };
        let outcome = match handler.on_report_acked() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(handler = %id, error = %e, "Acknowledgement rejected");
                self.teardown_handler(id, TerminationReason::ProtocolViolation);
                return;
            }
        };
        let chunks = handler.last_report_chunks();
        self.in_flight_reports = self.in_flight_reports.saturating_sub(1);

        match outcome {
            AckOutcome::MoreChunks => self.pump_chunk(id),
            AckOutcome::PrimingComplete => self.complete_priming(id),
            AckOutcome::ReportComplete => {
                let now = self.clock.now();
                self.scheduler.on_report_sent(id, now);
                self.collect_dirty_garbage();
                tracing::debug!(handler = %id, chunks, "Report delivered");
                self.events
                    .publish(EngineEvent::ReportSent { handler: id, chunks });
            }
        }
    }

    fn complete_priming(&mut self, id: HandlerId) {
        let now = self.clock.now();
        let Some(handler) = self.handlers.get_mut(&id) else {
            return;
        };
        let response = handler.subscribe_response();
        let (session, peer, subscription_id, intervals) = (
            handler.session(),
            handler.peer(),
            handler.subscription_id(),
            handler.intervals().copied(),
        );
        let (Ok(message), Some(subscription_id), Some(intervals)) =
            (response, subscription_id, intervals)
        else {
            self.teardown_handler(id, TerminationReason::EncodingFailure);
            return;
        };

        if let Err(e) = self.send(session, message) {
            tracing::debug!(handler = %id, error = %e, "Subscribe response not sent");
            self.teardown_handler(id, TerminationReason::TransportFailure);
            return;
        }

        self.scheduler.register(
            id,
            now,
            intervals.min_interval(),
            intervals.max_interval(),
        );
        self.app.on_subscription_established(id, subscription_id);
        self.collect_dirty_garbage();
        tracing::info!(
            handler = %id,
            %peer,
            subscription_id,
            max_interval = intervals.effective_max(),
            "Subscription established"
        );
        self.events.publish(EngineEvent::SubscriptionEstablished {
            handler: id,
            subscription_id,
            peer,
            max_interval: intervals.effective_max(),
        });
    }

    // =========================================================================
    // Chunking
    // =========================================================================

    /// Builds and sends the next chunk of a handler's report, if one is owed.
    pub(super) fn pump_chunk(&mut self, id: HandlerId) {
        let Some(handler) = self.handlers.get_mut(&id) else {
            return;
        };
        if !handler.has_pending_chunk() {
            return;
        }
        let session = handler.session();
        if !self.sessions.is_active(session) {
            self.teardown_handler(id, TerminationReason::SessionDefunct);
            return;
        }

        handler.begin_transaction(&self.registry, &self.event_log, || {
            allocate_exchange(&mut self.next_exchange)
        });
        let sources = Sources {
            model: &*self.model,
            registry: &self.registry,
            event_log: &self.event_log,
            max_payload: self.config.max_payload_size,
        };
        let chunk = handler.build_chunk(&sources).and_then(|report| {
            let message = handler.send_report_data(&report)?;
            Ok((message, report.suppress_response))
        });

        let (message, final_read) = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(handler = %id, error = %e, "Failed to build report chunk");
                self.teardown_handler(id, TerminationReason::EncodingFailure);
                return;
            }
        };

        self.in_flight_reports += 1;
        if let Err(e) = self.send(session, message) {
            tracing::debug!(handler = %id, error = %e, "Report chunk not sent");
            self.teardown_handler(id, TerminationReason::TransportFailure);
            return;
        }
        if final_read {
            self.complete_read(id);
        }
    }

    /// The final chunk of a read needs no acknowledgement; the handler ends.
    fn complete_read(&mut self, id: HandlerId) {
        let Some(mut handler) = self.handlers.remove(&id) else {
            return;
        };
        handler.finish_transaction();
        let chunks = handler.last_report_chunks();
        if handler.terminate() {
            self.in_flight_reports = self.in_flight_reports.saturating_sub(1);
        }
        self.app.on_handler_terminated(id);
        self.collect_dirty_garbage();
        tracing::debug!(handler = %id, chunks, "Read completed");
        self.events
            .publish(EngineEvent::ReadCompleted { handler: id, chunks });
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// What the scheduler needs to know about subscriptions free to report.
    pub(super) fn readiness(&self) -> Vec<Readiness> {
        self.handlers
            .values()
            .filter(|h| h.should_start_reporting())
            .map(|h| Readiness {
                handler: h.id(),
                dirty: h.is_dirty(&self.registry, &self.event_log),
                urgent: h.has_urgent_events(&self.event_log),
            })
            .collect()
    }

    pub(super) fn start_due_reports(&mut self, now: Instant) {
        let due = self.scheduler.reportable(now, &self.readiness());
        for id in due {
            let Some(handler) = self.handlers.get_mut(&id) else {
                continue;
            };
            if !handler.should_start_reporting() {
                continue;
            }
            handler.begin_transaction(&self.registry, &self.event_log, || {
                allocate_exchange(&mut self.next_exchange)
            });
            tracing::trace!(handler = %id, "Report started");
            self.pump_chunk(id);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Removes a handler from every table. Returns it if it existed.
    fn remove_handler(&mut self, id: HandlerId) -> Option<ReadHandler> {
        let mut handler = self.handlers.remove(&id)?;
        if handler.terminate() {
            self.in_flight_reports = self.in_flight_reports.saturating_sub(1);
        }
        self.scheduler.unregister(id);
        self.app.on_handler_terminated(id);
        self.collect_dirty_garbage();
        Some(handler)
    }

    /// Tears a handler down without sending anything and publishes why.
    pub(super) fn teardown_handler(&mut self, id: HandlerId, reason: TerminationReason) {
        let Some(handler) = self.remove_handler(id) else {
            return;
        };
        tracing::debug!(handler = %id, peer = %handler.peer(), ?reason, "Read handler torn down");
        let event = match (handler.kind(), handler.subscription_id()) {
            (InteractionKind::Subscribe, Some(subscription_id)) => {
                EngineEvent::SubscriptionTerminated {
                    handler: id,
                    subscription_id,
                    reason,
                }
            }
            _ => EngineEvent::ReadAborted { handler: id, reason },
        };
        self.events.publish(event);
    }

    /// Drops dirty marks every remaining handler has already reported.
    fn collect_dirty_garbage(&mut self) {
        let oldest = self
            .handlers
            .values()
            .map(ReadHandler::reported_generation)
            .min()
            .unwrap_or_else(|| self.registry.current_generation());
        self.registry.collect_garbage(oldest);
    }
}
