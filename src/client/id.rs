// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read client identifier type.

use std::fmt;

use uuid::Uuid;

/// Unique identifier of a read client.
///
/// Handed out by [`Engine::send_read_request`](crate::Engine::send_read_request)
/// and [`Engine::send_subscribe_request`](crate::Engine::send_subscribe_request);
/// it stays valid across resubscriptions.
///
/// # Examples
///
/// ```
/// use im_reporting::client::ClientId;
///
/// let id = ClientId::new();
/// assert_ne!(id, ClientId::new());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a new unique client identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 characters are enough to tell clients apart in logs
        let full = self.0.to_string();
        write!(f, "ClientId({}...)", &full[..8])
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClientId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
