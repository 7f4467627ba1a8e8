// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine lifecycle event types.

use crate::handler::HandlerId;
use crate::message::StatusCode;
use crate::session::PeerId;

/// Why a read handler was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The session was marked defunct.
    SessionDefunct,
    /// The peer's fabric was removed.
    FabricRemoved,
    /// The application shut the subscription down.
    Shutdown,
    /// A new subscription from the same peer replaced it.
    Replaced,
    /// The transport could not deliver a message.
    TransportFailure,
    /// The peer answered with a failure status.
    PeerStatus(StatusCode),
    /// The peer sent a message that is not valid at this point.
    ProtocolViolation,
    /// A report could not be encoded.
    EncodingFailure,
}

/// Events published by the engine.
///
/// # Examples
///
/// ```
/// use im_reporting::handler::HandlerId;
/// use im_reporting::lifecycle::{EngineEvent, TerminationReason};
///
/// let event = EngineEvent::SubscriptionTerminated {
///     handler: HandlerId::from_raw(3),
///     subscription_id: 7,
///     reason: TerminationReason::SessionDefunct,
/// };
/// assert_eq!(event.handler(), HandlerId::from_raw(3));
/// assert!(event.is_termination());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A subscription's priming report completed and the response went out.
    SubscriptionEstablished {
        /// The handler serving the subscription.
        handler: HandlerId,
        /// The subscription id.
        subscription_id: u32,
        /// The subscriber.
        peer: PeerId,
        /// Negotiated max interval in seconds.
        max_interval: u16,
    },

    /// A subscription was torn down.
    SubscriptionTerminated {
        /// The handler that served the subscription.
        handler: HandlerId,
        /// The subscription id.
        subscription_id: u32,
        /// What ended it.
        reason: TerminationReason,
    },

    /// A read's final chunk went out.
    ReadCompleted {
        /// The handler that served the read.
        handler: HandlerId,
        /// Number of messages the report took.
        chunks: u32,
    },

    /// A read was abandoned before its final chunk.
    ReadAborted {
        /// The handler that served the read.
        handler: HandlerId,
        /// What ended it.
        reason: TerminationReason,
    },

    /// A report after priming was fully acknowledged.
    ReportSent {
        /// The handler serving the subscription.
        handler: HandlerId,
        /// Number of messages the report took.
        chunks: u32,
    },
}

impl EngineEvent {
    /// Returns the handler this event concerns.
    #[must_use]
    pub fn handler(&self) -> HandlerId {
        match self {
            Self::SubscriptionEstablished { handler, .. }
            | Self::SubscriptionTerminated { handler, .. }
            | Self::ReadCompleted { handler, .. }
            | Self::ReadAborted { handler, .. }
            | Self::ReportSent { handler, .. } => *handler,
        }
    }

    /// Returns `true` if the handler is gone after this event.
    #[must_use]
    pub fn is_termination(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionTerminated { .. } | Self::ReadCompleted { .. } | Self::ReadAborted { .. }
        )
    }
}
