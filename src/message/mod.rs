// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire messages exchanged between read clients and read handlers.
//!
//! Every message travels as a [`Message`] envelope: the exchange it belongs
//! to, which side opened that exchange, the message type and a container
//! payload. The container encoding is delegated to [`codec`]; the payload
//! structures themselves live in [`ib`] (information blocks such as paths
//! and reports) and [`payload`] (one struct per message type).

pub mod codec;
pub mod ib;
pub mod payload;
mod status;

use std::fmt;

use serde::Serialize;

pub use payload::{ReadRequest, ReportData, StatusResponse, SubscribeRequest, SubscribeResponse};
pub use status::StatusCode;

use crate::error::ParseError;

/// Interaction-model message types handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Generic status, used both as a chunk acknowledgement and as a failure.
    StatusResponse,
    /// One-shot read of attributes and events.
    ReadRequest,
    /// Request to establish a subscription.
    SubscribeRequest,
    /// Final message of a successful subscription handshake.
    SubscribeResponse,
    /// Attribute and event data, possibly one chunk of several.
    ReportData,
    /// Write interaction; never valid on a read or subscribe exchange.
    WriteRequest,
    /// Invoke interaction; never valid on a read or subscribe exchange.
    InvokeRequest,
}

/// Identifier of one request/response exchange on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeId(pub u16);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ex({})", self.0)
    }
}

/// A message envelope as handed to or received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Exchange the message belongs to.
    pub exchange: ExchangeId,
    /// `true` if the sender is the side that opened the exchange.
    pub from_initiator: bool,
    /// Message type.
    pub msg_type: MessageType,
    /// Encoded container payload.
    pub payload: Vec<u8>,
}

impl Message {
    /// Encodes `body` and wraps it in an envelope.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the body cannot be encoded.
    pub fn encode<T: Serialize>(
        exchange: ExchangeId,
        from_initiator: bool,
        msg_type: MessageType,
        body: &T,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            exchange,
            from_initiator,
            msg_type,
            payload: codec::encode(body)?,
        })
    }

    /// Creates a status response envelope.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the status cannot be encoded.
    pub fn status(
        exchange: ExchangeId,
        from_initiator: bool,
        status: StatusCode,
    ) -> Result<Self, ParseError> {
        Self::encode(
            exchange,
            from_initiator,
            MessageType::StatusResponse,
            &StatusResponse { status },
        )
    }

    /// Decodes the payload as `T`.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the payload is truncated or structurally invalid.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ParseError> {
        codec::decode(&self.payload)
    }
}
