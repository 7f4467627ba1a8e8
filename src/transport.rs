// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message transport beneath the engine.
//!
//! Reliable delivery, retransmission and session security are the
//! transport's business. The engine only hands over complete messages and
//! learns about failures through the `Err` returned here or through
//! [`Engine::on_response_timeout`](crate::Engine::on_response_timeout).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::Message;
use crate::session::SessionId;

/// Sink for outbound messages.
pub trait Transport: Send {
    /// Queues `message` for delivery on `session`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the message cannot be queued.
    fn send(&mut self, session: SessionId, message: Message) -> Result<(), TransportError>;
}

/// Shared handle onto the messages a [`MemoryTransport`] has accepted.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Arc<Mutex<VecDeque<(SessionId, Message)>>>,
}

impl Outbox {
    /// Removes and returns every queued message, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<(SessionId, Message)> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// In-memory transport that queues messages for someone else to deliver.
///
/// Used to wire two engines back to back and to inspect traffic.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    outbox: Outbox,
    failing: Arc<Mutex<bool>>,
}

impl MemoryTransport {
    /// Creates a transport and returns it together with its outbox.
    #[must_use]
    pub fn new() -> (Self, Outbox) {
        let transport = Self::default();
        let outbox = transport.outbox.clone();
        (transport, outbox)
    }

    /// Returns a switch that makes every later `send` fail with a timeout.
    #[must_use]
    pub fn failure_switch(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.failing)
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, session: SessionId, message: Message) -> Result<(), TransportError> {
        if *self.failing.lock() {
            return Err(TransportError::Timeout);
        }
        self.outbox.queue.lock().push_back((session, message));
        Ok(())
    }
}

/// Transport that forwards messages into a tokio channel.
#[derive(Debug)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<(SessionId, Message)>,
}

impl ChannelTransport {
    /// Creates a transport and the receiver its messages arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SessionId, Message)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, session: SessionId, message: Message) -> Result<(), TransportError> {
        self.sender
            .send((session, message))
            .map_err(|e| TransportError::ChannelClosed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ExchangeId, StatusCode};

    fn ack() -> Message {
        Message::status(ExchangeId(1), false, StatusCode::Success).unwrap()
    }

    #[test]
    fn memory_transport_queues_in_order() {
        let (mut transport, outbox) = MemoryTransport::new();
        transport.send(SessionId(1), ack()).unwrap();
        transport.send(SessionId(2), ack()).unwrap();
        let sent = outbox.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, SessionId(1));
        assert!(outbox.is_empty());
    }

    #[test]
    fn failure_switch_fails_sends() {
        let (mut transport, outbox) = MemoryTransport::new();
        *transport.failure_switch().lock() = true;
        assert_eq!(transport.send(SessionId(1), ack()), Err(TransportError::Timeout));
        assert_eq!(outbox.len(), 0);
    }

    #[tokio::test]
    async fn channel_transport_forwards() {
        let (mut transport, mut receiver) = ChannelTransport::new();
        transport.send(SessionId(3), ack()).unwrap();
        let (session, message) = receiver.recv().await.unwrap();
        assert_eq!(session, SessionId(3));
        assert_eq!(message, ack());
    }

    #[test]
    fn channel_transport_closed_receiver() {
        let (mut transport, receiver) = ChannelTransport::new();
        drop(receiver);
        assert!(matches!(
            transport.send(SessionId(1), ack()),
            Err(TransportError::ChannelClosed(_))
        ));
    }
}
