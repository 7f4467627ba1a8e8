// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Information blocks: the paths and reports nested inside message payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StatusCode;
use crate::error::ParseError;
use crate::event_log::Priority;
use crate::path::{
    ClusterId, ConcretePath, DataVersion, EndpointId, FabricIndex, ListIndex, NodeId, PathFilter,
    is_global_attribute, is_valid_attribute_id, is_valid_cluster_id, is_valid_event_id,
};

/// Encoded attribute path. Absent fields are wildcards in requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePathIB {
    /// Target node; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Endpoint selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointId>,
    /// Cluster selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterId>,
    /// Attribute selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<u32>,
    /// List element selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_index: Option<ListIndex>,
}

impl AttributePathIB {
    /// Converts a requested path into a filter.
    ///
    /// Returns `Ok(None)` when an identifier falls in a reserved range: such a
    /// path is structurally fine but can never match anything.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedPath` when a required selector is missing.
    pub fn to_filter(&self) -> Result<Option<PathFilter>, ParseError> {
        let list_index = match self.list_index {
            None => None,
            Some(ListIndex::Append) => {
                return Err(ParseError::MalformedPath(
                    "append list index in a read path".to_string(),
                ));
            }
            Some(ListIndex::Item(_)) if self.attribute.is_none() => {
                return Err(ParseError::MalformedPath(
                    "list index requires a concrete attribute".to_string(),
                ));
            }
            Some(ListIndex::Item(i)) => Some(i),
        };

        if let Some(attribute) = self.attribute
            && self.cluster.is_none()
            && !is_global_attribute(attribute)
        {
            return Err(ParseError::MalformedPath(format!(
                "attribute 0x{attribute:04X} requires a concrete cluster"
            )));
        }

        if self.cluster.is_some_and(|c| !is_valid_cluster_id(c))
            || self.attribute.is_some_and(|a| !is_valid_attribute_id(a))
        {
            return Ok(None);
        }

        Ok(Some(PathFilter {
            endpoint: self.endpoint,
            cluster: self.cluster,
            id: self.attribute,
            list_index,
        }))
    }

    /// Converts a reported path into a concrete path.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedPath` if any selector is missing.
    pub fn to_concrete(&self) -> Result<ConcretePath, ParseError> {
        let (Some(endpoint), Some(cluster), Some(attribute)) =
            (self.endpoint, self.cluster, self.attribute)
        else {
            return Err(ParseError::MalformedPath(
                "reported attribute path is not concrete".to_string(),
            ));
        };
        Ok(ConcretePath {
            endpoint,
            cluster,
            id: attribute,
            list_index: self.list_index,
        })
    }
}

impl From<&PathFilter> for AttributePathIB {
    fn from(filter: &PathFilter) -> Self {
        Self {
            node: None,
            endpoint: filter.endpoint,
            cluster: filter.cluster,
            attribute: filter.id,
            list_index: filter.list_index.map(ListIndex::Item),
        }
    }
}

impl From<ConcretePath> for AttributePathIB {
    fn from(path: ConcretePath) -> Self {
        Self {
            node: None,
            endpoint: Some(path.endpoint),
            cluster: Some(path.cluster),
            attribute: Some(path.id),
            list_index: path.list_index,
        }
    }
}

/// Encoded event path. Absent fields are wildcards in requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPathIB {
    /// Target node; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Endpoint selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointId>,
    /// Cluster selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterId>,
    /// Event selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<u32>,
    /// Whether matching events may bypass the minimum reporting interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent: Option<bool>,
}

/// A parsed event interest: which events, and whether they are urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInterest {
    /// Events matched by this interest.
    pub filter: PathFilter,
    /// Matching events may bypass the minimum reporting interval.
    pub urgent: bool,
}

impl EventPathIB {
    /// Converts a requested event path into an interest.
    ///
    /// Returns `Ok(None)` when an identifier falls in a reserved range.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedPath` for an event id under a wildcard cluster.
    pub fn to_interest(&self) -> Result<Option<EventInterest>, ParseError> {
        if self.event.is_some() && self.cluster.is_none() {
            return Err(ParseError::MalformedPath(
                "event id requires a concrete cluster".to_string(),
            ));
        }
        if self.cluster.is_some_and(|c| !is_valid_cluster_id(c))
            || self.event.is_some_and(|e| !is_valid_event_id(e))
        {
            return Ok(None);
        }
        Ok(Some(EventInterest {
            filter: PathFilter {
                endpoint: self.endpoint,
                cluster: self.cluster,
                id: self.event,
                list_index: None,
            },
            urgent: self.urgent.unwrap_or(false),
        }))
    }

    /// Converts a reported path into a concrete path.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::MalformedPath` if any selector is missing.
    pub fn to_concrete(&self) -> Result<ConcretePath, ParseError> {
        let (Some(endpoint), Some(cluster), Some(event)) = (self.endpoint, self.cluster, self.event)
        else {
            return Err(ParseError::MalformedPath(
                "reported event path is not concrete".to_string(),
            ));
        };
        Ok(ConcretePath::new(endpoint, cluster, event))
    }
}

impl From<ConcretePath> for EventPathIB {
    fn from(path: ConcretePath) -> Self {
        Self {
            node: None,
            endpoint: Some(path.endpoint),
            cluster: Some(path.cluster),
            event: Some(path.id),
            urgent: None,
        }
    }
}

/// Value of one attribute (or one list element) at a given data version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDataIB {
    /// Data version of the owning cluster when the value was read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<DataVersion>,
    /// Concrete path of the value.
    pub path: AttributePathIB,
    /// The value itself.
    pub data: Value,
}

/// Failure to produce an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatusIB {
    /// Concrete path the status applies to.
    pub path: AttributePathIB,
    /// Why no value was produced.
    pub status: StatusCode,
}

/// One entry of a report's attribute list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeReportIB {
    /// An attribute value.
    Data(AttributeDataIB),
    /// An attribute failure status.
    Status(AttributeStatusIB),
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDataIB {
    /// Concrete path of the event.
    pub path: EventPathIB,
    /// Globally monotonic event number.
    pub event_number: u64,
    /// Priority tier the event was logged at.
    pub priority: Priority,
    /// Wall-clock time the event was logged.
    pub timestamp: DateTime<Utc>,
    /// Fabric the event is scoped to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric_index: Option<FabricIndex>,
    /// Event payload.
    pub data: Value,
}

/// Failure to produce events for a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStatusIB {
    /// Path the status applies to.
    pub path: EventPathIB,
    /// Why no events were produced.
    pub status: StatusCode,
}

/// One entry of a report's event list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReportIB {
    /// An event record.
    Data(EventDataIB),
    /// An event failure status.
    Status(EventStatusIB),
}
