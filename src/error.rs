// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the reporting engine.
//!
//! This module provides the error hierarchy shared by the server-side read
//! handlers, the client-side read clients and the event log: malformed
//! payloads, semantic protocol violations, resource exhaustion and transport
//! failures.
//!
//! Every error maps onto a protocol [`StatusCode`] through
//! [`Error::status_code`], which is what a synthesized `StatusResponse`
//! carries back to the peer.

use thiserror::Error;

use crate::message::{MessageType, StatusCode};

/// The main error type for this library.
///
/// Application-visible failures are always delivered as one of these
/// variants, through `Result` returns or the `on_error` callback of a
/// read client.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument failed validation before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current protocol state.
    #[error("incorrect state: {0}")]
    IncorrectState(&'static str),

    /// A report carried a subscription id that does not belong to the exchange.
    #[error("invalid subscription: {0}")]
    InvalidSubscription(u32),

    /// A message arrived that is not expected at this point of the exchange.
    #[error("unexpected {actual:?} message while {state}")]
    InvalidMessageType {
        /// The message type that was received.
        actual: MessageType,
        /// Human readable description of the state that rejected it.
        state: &'static str,
    },

    /// The event log cannot make room for another event.
    #[error("no storage left for event")]
    NoStorage,

    /// A bounded pool or path set would overflow.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// The peer answered with a failure status.
    #[error("peer reported status {0:?}")]
    Status(StatusCode),

    /// Error occurred while parsing an inbound payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while handing a message to the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No read handler is registered under the given id.
    #[error("read handler not found")]
    HandlerNotFound,

    /// No read client is registered under the given id.
    #[error("read client not found")]
    ClientNotFound,

    /// The application cancelled a pending resubscription.
    #[error("resubscription cancelled")]
    ResubscribeCancelled,
}

impl Error {
    /// Returns the status code that describes this error on the wire.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSubscription(_) => StatusCode::InvalidSubscription,
            Self::InvalidArgument(_)
            | Self::InvalidMessageType { .. }
            | Self::IncorrectState(_)
            | Self::Parse(_) => StatusCode::InvalidAction,
            Self::NoStorage | Self::ResourceExhausted(_) => StatusCode::ResourceExhausted,
            Self::Status(status) => *status,
            Self::Transport(TransportError::Timeout) => StatusCode::Timeout,
            Self::Transport(_)
            | Self::HandlerNotFound
            | Self::ClientNotFound
            | Self::ResubscribeCancelled => StatusCode::Failure,
        }
    }

    /// Returns `true` if the failure should feed the resubscription policy.
    ///
    /// Malformed or semantically invalid data from the peer is final; lost
    /// sessions, timeouts and rejected subscriptions are worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::InvalidSubscription(_) => true,
            Self::Status(status) => matches!(
                status,
                StatusCode::Busy
                    | StatusCode::Timeout
                    | StatusCode::InvalidSubscription
                    | StatusCode::ResourceExhausted
            ),
            _ => false,
        }
    }
}

/// Errors raised while decoding inbound payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The container could not be decoded.
    #[error("container decode error: {0}")]
    Container(#[from] serde_json::Error),

    /// A path is structurally invalid (e.g. a required selector is missing).
    #[error("malformed path: {0}")]
    MalformedPath(String),

    /// A required field is absent from the payload.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Errors raised by the message transport beneath the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The session was marked defunct and can no longer carry messages.
    #[error("session is defunct")]
    SessionDefunct,

    /// The session id is not known to the engine.
    #[error("unknown session")]
    UnknownSession,

    /// The peer did not acknowledge in time.
    #[error("response timed out")]
    Timeout,

    /// The channel used to hand messages to the transport was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
