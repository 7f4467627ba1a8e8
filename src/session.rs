// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secure sessions as seen by the engine.
//!
//! Handlers and clients refer to their session by [`SessionId`] only. The
//! session can become defunct at any time; whoever holds the id finds out
//! the next time it looks the session up.

use std::collections::HashMap;
use std::fmt;

use crate::message::ExchangeId;
use crate::path::{FabricIndex, NodeId};

/// Local identifier of a secure session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// The peer at the other end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId {
    /// Operational node id of the peer.
    pub node_id: NodeId,
    /// Fabric the session was established on.
    pub fabric_index: FabricIndex,
}

impl PeerId {
    /// Creates a new peer id.
    #[must_use]
    pub const fn new(node_id: NodeId, fabric_index: FabricIndex) -> Self {
        Self {
            node_id,
            fabric_index,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}@{}", self.node_id, self.fabric_index)
    }
}

/// An exchange as seen from this side of a session.
///
/// Both peers allocate exchange ids independently, so an id alone is
/// ambiguous; who opened the exchange disambiguates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ExchangeKey {
    pub(crate) id: ExchangeId,
    pub(crate) locally_initiated: bool,
}

impl ExchangeKey {
    /// Key of the exchange an inbound message belongs to.
    pub(crate) fn inbound(id: ExchangeId, from_initiator: bool) -> Self {
        Self {
            id,
            locally_initiated: !from_initiator,
        }
    }

    /// Key of an exchange this side opens.
    pub(crate) fn local(id: ExchangeId) -> Self {
        Self {
            id,
            locally_initiated: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    peer: PeerId,
    defunct: bool,
}

/// Table of sessions known to one engine.
#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    sessions: HashMap<SessionId, SessionEntry>,
    next_id: u32,
}

impl SessionTable {
    pub(crate) fn add(&mut self, peer: PeerId) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(
            id,
            SessionEntry {
                peer,
                defunct: false,
            },
        );
        id
    }

    pub(crate) fn peer(&self, id: SessionId) -> Option<PeerId> {
        self.sessions.get(&id).map(|entry| entry.peer)
    }

    pub(crate) fn is_active(&self, id: SessionId) -> bool {
        self.sessions.get(&id).is_some_and(|entry| !entry.defunct)
    }

    /// Returns `true` if the session existed and was still active.
    pub(crate) fn mark_defunct(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(entry) if !entry.defunct => {
                entry.defunct = true;
                true
            }
            _ => false,
        }
    }

    /// Marks an existing defunct session usable again.
    pub(crate) fn revive(&mut self, id: SessionId) -> bool {
        match self.sessions.get_mut(&id) {
            Some(entry) => {
                entry.defunct = false;
                true
            }
            None => false,
        }
    }

    /// Removes every session on the fabric and returns their ids.
    pub(crate) fn remove_fabric(&mut self, fabric_index: FabricIndex) -> Vec<SessionId> {
        let removed: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.peer.fabric_index == fabric_index)
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            self.sessions.remove(id);
        }
        removed
    }
}
