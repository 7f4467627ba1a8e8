// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload structures, one per message type.

use serde::{Deserialize, Serialize};

use super::StatusCode;
use super::ib::{AttributePathIB, AttributeReportIB, EventPathIB, EventReportIB};
use crate::path::DataVersionFilter;

/// One-shot read of attributes and events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Requested attribute paths.
    #[serde(default)]
    pub attribute_requests: Vec<AttributePathIB>,
    /// Requested event paths.
    #[serde(default)]
    pub event_requests: Vec<EventPathIB>,
    /// Only events numbered at or above this are wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_min: Option<u64>,
    /// Clusters the client already holds at a known version.
    #[serde(default)]
    pub data_version_filters: Vec<DataVersionFilter>,
    /// Restrict fabric-scoped data to the requester's fabric.
    #[serde(default)]
    pub is_fabric_filtered: bool,
}

/// Request to establish a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Keep the peer's existing subscriptions alive.
    #[serde(default)]
    pub keep_subscriptions: bool,
    /// Minimum seconds between two reports.
    pub min_interval_floor: u16,
    /// Maximum seconds the subscriber tolerates between two reports.
    pub max_interval_ceiling: u16,
    /// Requested attribute paths.
    #[serde(default)]
    pub attribute_requests: Vec<AttributePathIB>,
    /// Requested event paths.
    #[serde(default)]
    pub event_requests: Vec<EventPathIB>,
    /// Only events numbered at or above this are wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_min: Option<u64>,
    /// Clusters the client already holds at a known version.
    #[serde(default)]
    pub data_version_filters: Vec<DataVersionFilter>,
    /// Restrict fabric-scoped data to the requester's fabric.
    #[serde(default)]
    pub is_fabric_filtered: bool,
}

/// Attribute and event data, possibly one chunk of several.
///
/// Every field is always encoded so that the envelope size does not depend
/// on the content, which keeps chunk budgeting exact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// Present on subscription reports only.
    pub subscription_id: Option<u32>,
    /// Attribute values and statuses.
    #[serde(default)]
    pub attribute_reports: Vec<AttributeReportIB>,
    /// Event records and statuses.
    #[serde(default)]
    pub event_reports: Vec<EventReportIB>,
    /// More chunks of the same report follow.
    #[serde(default)]
    pub more_chunked_messages: bool,
    /// The receiver must not acknowledge this message.
    #[serde(default)]
    pub suppress_response: bool,
}

/// Final message of a successful subscription handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    /// Identifier of the established subscription.
    pub subscription_id: u32,
    /// Negotiated maximum interval in seconds.
    pub max_interval: u16,
}

/// Generic success acknowledgement or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// The status being reported.
    pub status: StatusCode,
}
