// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier types and reserved-range validation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version counter of a cluster instance, bumped on every attribute change.
pub type DataVersion = u32;

/// Operational node identifier of a peer.
pub type NodeId = u64;

/// Local index of the fabric a peer belongs to.
pub type FabricIndex = u8;

/// Endpoint number on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u16);

/// Cluster identifier, including the manufacturer prefix in the upper 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub u32);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Global attribute ids present on every cluster.
pub mod global {
    /// List of commands the cluster generates.
    pub const GENERATED_COMMAND_LIST: u32 = 0xFFF8;
    /// List of commands the cluster accepts.
    pub const ACCEPTED_COMMAND_LIST: u32 = 0xFFF9;
    /// List of attributes the cluster supports.
    pub const ATTRIBUTE_LIST: u32 = 0xFFFB;
    /// Feature bitmap of the cluster.
    pub const FEATURE_MAP: u32 = 0xFFFC;
    /// Revision of the cluster specification implemented.
    pub const CLUSTER_REVISION: u32 = 0xFFFD;
}

/// Order in which global attributes are emitted, ahead of data attributes.
pub const GLOBAL_ATTRIBUTE_ORDER: [u32; 5] = [
    global::GENERATED_COMMAND_LIST,
    global::ACCEPTED_COMMAND_LIST,
    global::ATTRIBUTE_LIST,
    global::FEATURE_MAP,
    global::CLUSTER_REVISION,
];

const MAX_VENDOR_PREFIX: u32 = 0xFFF4;

fn split(id: u32) -> (u32, u32) {
    (id >> 16, id & 0xFFFF)
}

/// Returns `true` if the attribute id is one of the global attributes.
#[must_use]
pub fn is_global_attribute(id: u32) -> bool {
    let (prefix, suffix) = split(id);
    prefix == 0 && (0xF000..=0xFFFE).contains(&suffix)
}

/// Returns `true` unless the attribute id falls in a range reserved for future use.
#[must_use]
pub fn is_valid_attribute_id(id: u32) -> bool {
    let (prefix, suffix) = split(id);
    prefix <= MAX_VENDOR_PREFIX && (suffix <= 0x4FFF || (0xF000..=0xFFFE).contains(&suffix))
}

/// Returns `true` unless the cluster id falls in a range reserved for future use.
#[must_use]
pub fn is_valid_cluster_id(id: ClusterId) -> bool {
    let (prefix, suffix) = split(id.0);
    prefix <= MAX_VENDOR_PREFIX && (suffix <= 0x7FFF || (0xFC00..=0xFFFE).contains(&suffix))
}

/// Returns `true` unless the event id falls in a range reserved for future use.
#[must_use]
pub fn is_valid_event_id(id: u32) -> bool {
    let (prefix, suffix) = split(id);
    prefix <= MAX_VENDOR_PREFIX && suffix <= 0xFFFE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_attributes_are_valid() {
        for id in GLOBAL_ATTRIBUTE_ORDER {
            assert!(is_global_attribute(id));
            assert!(is_valid_attribute_id(id));
        }
    }

    #[test]
    fn reserved_attribute_ranges() {
        assert!(is_valid_attribute_id(0x0000));
        assert!(is_valid_attribute_id(0x4FFF));
        assert!(!is_valid_attribute_id(0x5000));
        assert!(!is_valid_attribute_id(0xFFFF));
        assert!(!is_valid_attribute_id(0xFFF5_0000));
        assert!(is_valid_attribute_id(0xFFF1_0001));
    }

    #[test]
    fn vendor_global_is_not_global() {
        assert!(!is_global_attribute(0x0001_FFFD));
    }

    #[test]
    fn reserved_cluster_ranges() {
        assert!(is_valid_cluster_id(ClusterId(0x0006)));
        assert!(!is_valid_cluster_id(ClusterId(0x8000)));
        assert!(is_valid_cluster_id(ClusterId(0xFC00)));
    }

    #[test]
    fn display_formats() {
        assert_eq!(ClusterId(6).to_string(), "0x0006");
        assert_eq!(EndpointId(3).to_string(), "3");
    }
}
