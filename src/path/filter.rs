// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wildcard path filters and data-version filters.

use serde::{Deserialize, Serialize};

use super::concrete::{ConcretePath, ListIndex};
use super::ids::{ClusterId, DataVersion, EndpointId};

/// A path where every field is either concrete or a wildcard (`None`).
///
/// A filter with all fields wildcarded matches every [`ConcretePath`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PathFilter {
    /// Endpoint, or any endpoint.
    pub endpoint: Option<EndpointId>,
    /// Cluster, or any cluster.
    pub cluster: Option<ClusterId>,
    /// Attribute or event id, or any id.
    pub id: Option<u32>,
    /// List element, or the whole list and any element.
    pub list_index: Option<u16>,
}

impl PathFilter {
    /// Creates a filter that matches every path.
    #[must_use]
    pub const fn wildcard() -> Self {
        Self {
            endpoint: None,
            cluster: None,
            id: None,
            list_index: None,
        }
    }

    /// Creates a filter matching everything in one cluster instance.
    #[must_use]
    pub const fn cluster(endpoint: EndpointId, cluster: ClusterId) -> Self {
        Self {
            endpoint: Some(endpoint),
            cluster: Some(cluster),
            id: None,
            list_index: None,
        }
    }

    /// Creates a filter matching a single attribute or event.
    #[must_use]
    pub const fn concrete(endpoint: EndpointId, cluster: ClusterId, id: u32) -> Self {
        Self {
            endpoint: Some(endpoint),
            cluster: Some(cluster),
            id: Some(id),
            list_index: None,
        }
    }

    /// Restricts the filter to one endpoint.
    #[must_use]
    pub const fn with_endpoint(mut self, endpoint: EndpointId) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Restricts the filter to one cluster.
    #[must_use]
    pub const fn with_cluster(mut self, cluster: ClusterId) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Restricts the filter to one attribute or event id.
    #[must_use]
    pub const fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Restricts the filter to one list element.
    #[must_use]
    pub const fn with_list_index(mut self, index: u16) -> Self {
        self.list_index = Some(index);
        self
    }

    /// Returns `true` if endpoint, cluster and id are all concrete.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        self.endpoint.is_some() && self.cluster.is_some() && self.id.is_some()
    }

    /// Returns `true` if `path` is matched by this filter.
    ///
    /// A wildcard list index matches both the whole-list and the single
    /// element shapes of a path.
    #[must_use]
    pub fn matches(&self, path: &ConcretePath) -> bool {
        field_matches(self.endpoint, path.endpoint)
            && field_matches(self.cluster, path.cluster)
            && field_matches(self.id, path.id)
            && match self.list_index {
                None => true,
                Some(index) => path.list_index == Some(ListIndex::Item(index)),
            }
    }

    /// Returns `true` if this filter could match something in the given cluster instance.
    #[must_use]
    pub fn touches_cluster(&self, endpoint: EndpointId, cluster: ClusterId) -> bool {
        field_matches(self.endpoint, endpoint) && field_matches(self.cluster, cluster)
    }

    /// Returns the filter matching exactly the paths both filters match.
    ///
    /// Returns `None` when the filters are disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            endpoint: narrow(self.endpoint, other.endpoint)?,
            cluster: narrow(self.cluster, other.cluster)?,
            id: narrow(self.id, other.id)?,
            list_index: narrow(self.list_index, other.list_index)?,
        })
    }

    /// Returns `true` if every path matched by `other` is also matched by `self`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        covers_field(self.endpoint, other.endpoint)
            && covers_field(self.cluster, other.cluster)
            && covers_field(self.id, other.id)
            && covers_field(self.list_index, other.list_index)
    }
}

impl From<ConcretePath> for PathFilter {
    fn from(path: ConcretePath) -> Self {
        Self {
            endpoint: Some(path.endpoint),
            cluster: Some(path.cluster),
            id: Some(path.id),
            list_index: match path.list_index {
                Some(ListIndex::Item(i)) => Some(i),
                _ => None,
            },
        }
    }
}

fn field_matches<T: PartialEq>(filter: Option<T>, value: T) -> bool {
    filter.is_none_or(|f| f == value)
}

fn narrow<T: PartialEq + Copy>(a: Option<T>, b: Option<T>) -> Option<Option<T>> {
    match (a, b) {
        (None, other) | (other, None) => Some(other),
        (Some(x), Some(y)) if x == y => Some(Some(x)),
        _ => None,
    }
}

fn covers_field<T: PartialEq>(outer: Option<T>, inner: Option<T>) -> bool {
    match (outer, inner) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(a), Some(b)) => a == b,
    }
}

/// A client's claim to already hold `version` of one cluster instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataVersionFilter {
    /// Endpoint of the cluster instance.
    pub endpoint: EndpointId,
    /// Cluster of the cluster instance.
    pub cluster: ClusterId,
    /// Data version the client already holds.
    pub data_version: DataVersion,
}

impl DataVersionFilter {
    /// Creates a new data-version filter.
    #[must_use]
    pub const fn new(endpoint: EndpointId, cluster: ClusterId, data_version: DataVersion) -> Self {
        Self {
            endpoint,
            cluster,
            data_version,
        }
    }

    /// Returns `true` if the filter applies to the given cluster instance.
    #[must_use]
    pub fn applies_to(&self, endpoint: EndpointId, cluster: ClusterId) -> bool {
        self.endpoint == endpoint && self.cluster == cluster
    }
}
