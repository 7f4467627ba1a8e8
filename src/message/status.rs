// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol status codes.

use serde::{Deserialize, Serialize};

/// Status code carried by status responses and status information blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Operation succeeded; also used to acknowledge a report chunk.
    Success,
    /// Unspecified failure.
    Failure,
    /// The subscription id is not known to the receiver.
    InvalidSubscription,
    /// The requester is not allowed to access the item.
    UnsupportedAccess,
    /// The endpoint does not exist.
    UnsupportedEndpoint,
    /// The message is not valid at this point of the interaction.
    InvalidAction,
    /// The attribute does not exist on the cluster.
    UnsupportedAttribute,
    /// A value is outside the allowed constraints.
    ConstraintError,
    /// The receiver cannot allocate what the request needs.
    ResourceExhausted,
    /// The requested event does not exist.
    UnsupportedEvent,
    /// The cluster does not exist on the endpoint.
    UnsupportedCluster,
    /// The receiver gave up waiting.
    Timeout,
    /// The receiver is busy; retry later.
    Busy,
}

impl StatusCode {
    /// Returns `true` for [`StatusCode::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
