// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscriber side: read clients and resubscription.

use tokio::time::Instant;

use crate::client::{ClientId, ReadClient, ReadClientCallback, ReadParams, ResubscribePolicy};
use crate::error::{Error, Result, TransportError};
use crate::handler::InteractionKind;
use crate::message::{Message, MessageType, ReportData, StatusCode};
use crate::session::{ExchangeKey, SessionId};

use super::{Engine, allocate_exchange};

impl Engine {
    /// Sends a read request on `session`.
    ///
    /// Data flows to `callback` as reports arrive; `on_done` is the last call
    /// it receives.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for parameters without paths,
    /// `Error::ResourceExhausted` if the client pool is full and
    /// `Error::Transport` if the request cannot be sent. Nothing is sent on
    /// error and the callback is dropped without being called.
    pub fn send_read_request<C>(
        &mut self,
        session: SessionId,
        params: ReadParams,
        callback: C,
    ) -> Result<ClientId>
    where
        C: ReadClientCallback + 'static,
    {
        self.start_client(
            InteractionKind::Read,
            session,
            params,
            ResubscribePolicy::disabled(),
            Box::new(callback),
        )
    }

    /// Sends a subscribe request on `session`.
    ///
    /// Once established, the subscription is kept alive by the liveness
    /// timer; failures the policy allows retrying schedule a resubscription
    /// that asks for events after the last one received.
    ///
    /// # Errors
    ///
    /// As for [`send_read_request`](Self::send_read_request), plus
    /// `Error::InvalidArgument` if the min interval floor exceeds the max
    /// interval ceiling.
    pub fn send_subscribe_request<C>(
        &mut self,
        session: SessionId,
        params: ReadParams,
        policy: ResubscribePolicy,
        callback: C,
    ) -> Result<ClientId>
    where
        C: ReadClientCallback + 'static,
    {
        self.start_client(
            InteractionKind::Subscribe,
            session,
            params,
            policy,
            Box::new(callback),
        )
    }

    fn start_client(
        &mut self,
        kind: InteractionKind,
        session: SessionId,
        params: ReadParams,
        policy: ResubscribePolicy,
        callback: Box<dyn ReadClientCallback>,
    ) -> Result<ClientId> {
        params.validate(kind)?;
        if !self.sessions.is_active(session) {
            return Err(if self.sessions.peer(session).is_some() {
                TransportError::SessionDefunct.into()
            } else {
                TransportError::UnknownSession.into()
            });
        }
        if self.clients.len() >= self.config.max_read_clients {
            return Err(Error::ResourceExhausted("read clients"));
        }

        let id = ClientId::new();
        let mut client = ReadClient::new(id, kind, session, params, policy, callback);
        let message = client.build_request(allocate_exchange(&mut self.next_exchange))?;
        self.send(session, message)?;
        self.clients.insert(id, client);
        Ok(id)
    }

    // =========================================================================
    // Client exchanges
    // =========================================================================

    /// Feeds a message to the client owning its exchange.
    pub(super) fn on_client_message(
        &mut self,
        id: ClientId,
        session: SessionId,
        key: ExchangeKey,
        message: &Message,
    ) {
        let now = self.clock.now();
        let margin = self.config.liveness_margin;
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };

        match client.process_message(message, now, margin) {
            Ok(progress) => {
                if let Some(reply) = progress.reply
                    && let Err(e) = self.send(session, reply)
                {
                    if !progress.finished {
                        self.fail_client(id, &Error::from(e));
                        return;
                    }
                    tracing::debug!(client = %id, error = %e, "Final acknowledgement not sent");
                }
                if progress.finished {
                    self.clients.remove(&id);
                }
            }
            Err(e) => {
                if message.msg_type != MessageType::StatusResponse {
                    self.reply_status(session, key, e.status_code());
                }
                self.fail_client(id, &e);
            }
        }
    }

    /// Routes a report the publisher sent on an exchange it opened.
    pub(super) fn on_unsolicited_report(
        &mut self,
        session: SessionId,
        key: ExchangeKey,
        message: &Message,
    ) {
        let subscription_id = match message.decode::<ReportData>() {
            Ok(ReportData {
                subscription_id: Some(subscription_id),
                ..
            }) => subscription_id,
            Ok(_) => {
                tracing::debug!(%session, "Unsolicited report without subscription id");
                self.reply_status(session, key, StatusCode::InvalidAction);
                return;
            }
            Err(e) => {
                tracing::debug!(%session, error = %e, "Malformed unsolicited report");
                self.reply_status(session, key, StatusCode::InvalidAction);
                return;
            }
        };

        let Some(client) = self
            .clients
            .values_mut()
            .find(|c| c.accepts_report(session, subscription_id))
        else {
            tracing::debug!(%session, subscription_id, "Report for unknown subscription");
            self.reply_status(session, key, StatusCode::InvalidSubscription);
            return;
        };
        client.attach_exchange(key);
        let id = client.id();
        self.on_client_message(id, session, key, message);
    }

    /// Reports `error` to a client; drops it unless it will resubscribe.
    pub(super) fn fail_client(&mut self, id: ClientId, error: &Error) {
        let now = self.clock.now();
        let finished = self
            .clients
            .get_mut(&id)
            .is_some_and(|client| client.fail(error, now));
        if finished {
            self.clients.remove(&id);
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Fails subscriptions whose liveness timer expired and sends due
    /// resubscriptions.
    pub(super) fn service_clients(&mut self, now: Instant) {
        let expired: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.liveness_expired(now))
            .map(ReadClient::id)
            .collect();
        let timeout = Error::Transport(TransportError::Timeout);
        for id in expired {
            tracing::info!(client = %id, "Subscription liveness timeout");
            self.fail_client(id, &timeout);
        }

        let due: Vec<ClientId> = self
            .clients
            .values()
            .filter(|c| c.resubscribe_due(now))
            .map(ReadClient::id)
            .collect();
        for id in due {
            self.resubscribe(id);
        }
    }

    fn resubscribe(&mut self, id: ClientId) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        let session = client.session();
        if !self.sessions.is_active(session) {
            self.fail_client(id, &Error::Transport(TransportError::SessionDefunct));
            return;
        }

        tracing::debug!(client = %id, attempt = client.attempt(), "Resubscribing");
        let exchange = allocate_exchange(&mut self.next_exchange);
        let sent = match client.build_request(exchange) {
            Ok(message) => self.send(session, message).map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.fail_client(id, &e);
        }
    }

    // =========================================================================
    // Client management
    // =========================================================================

    /// Cancels a pending resubscription; the client finishes with
    /// `Error::ResubscribeCancelled`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientNotFound` for an unknown client and
    /// `Error::IncorrectState` if no resubscription is pending.
    pub fn cancel_resubscription(&mut self, id: ClientId) -> Result<()> {
        let client = self.clients.get_mut(&id).ok_or(Error::ClientNotFound)?;
        client.cancel_resubscription()?;
        self.clients.remove(&id);
        Ok(())
    }

    /// Abandons a client. Its callback receives `on_done` and nothing else.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientNotFound` for an unknown client.
    pub fn shutdown_client(&mut self, id: ClientId) -> Result<()> {
        let mut client = self.clients.remove(&id).ok_or(Error::ClientNotFound)?;
        client.finish();
        tracing::debug!(client = %id, "Read client shut down");
        Ok(())
    }
}
