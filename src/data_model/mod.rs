// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to the device's attribute storage.
//!
//! The engine does not know what any attribute means. It asks the
//! [`DataModel`] what exists and what a path's value is, and it expands
//! wildcard filters against those answers in a stable order: endpoint,
//! then cluster, then the global attributes in [`GLOBAL_ATTRIBUTE_ORDER`],
//! then data attributes by id.

mod memory;

use serde_json::Value;

pub use memory::InMemoryDataModel;

use crate::message::StatusCode;
use crate::path::{
    ClusterId, ConcretePath, DataVersion, EndpointId, GLOBAL_ATTRIBUTE_ORDER, ListIndex,
    PathFilter, is_global_attribute,
};

/// Read-only view of the device data model.
///
/// `endpoints` and `clusters` must enumerate in ascending id order.
pub trait DataModel: Send {
    /// Endpoints present on the device.
    fn endpoints(&self) -> Vec<EndpointId>;

    /// Clusters present on an endpoint.
    fn clusters(&self, endpoint: EndpointId) -> Vec<ClusterId>;

    /// Attribute ids present on a cluster instance, in any order.
    fn attributes(&self, endpoint: EndpointId, cluster: ClusterId) -> Vec<u32>;

    /// Current value at `path`.
    ///
    /// # Errors
    ///
    /// Returns the status to report for the path when it cannot be read.
    fn read_attribute(&self, path: &ConcretePath) -> Result<Value, StatusCode>;

    /// Current data version of a cluster instance.
    fn data_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<DataVersion>;
}

/// Sort key giving the global-first enumeration order inside a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeKey {
    /// Endpoint of the attribute.
    pub endpoint: EndpointId,
    /// Cluster of the attribute.
    pub cluster: ClusterId,
    rank: (u8, u32),
}

impl AttributeKey {
    /// Returns the key of a path.
    #[must_use]
    pub fn of(path: &ConcretePath) -> Self {
        Self {
            endpoint: path.endpoint,
            cluster: path.cluster,
            rank: attribute_rank(path.id),
        }
    }
}

fn attribute_rank(id: u32) -> (u8, u32) {
    if is_global_attribute(id) {
        let position = GLOBAL_ATTRIBUTE_ORDER.iter().position(|g| *g == id);
        (0, position.map_or(id, |p| u32::try_from(p).unwrap_or(u32::MAX)))
    } else {
        (1, id)
    }
}

/// One attribute a filter resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// An existing attribute to read.
    Attribute(ConcretePath),
    /// A concretely requested attribute that does not exist.
    Missing(ConcretePath, StatusCode),
}

impl Candidate {
    /// The path of the candidate.
    #[must_use]
    pub fn path(&self) -> &ConcretePath {
        match self {
            Self::Attribute(path) | Self::Missing(path, _) => path,
        }
    }
}

/// Resolves `filter` against the data model in enumeration order.
///
/// Wildcard fields silently skip what does not exist; a fully concrete
/// filter that names a missing item resolves to a [`Candidate::Missing`].
#[must_use]
pub fn expand_attributes(model: &dyn DataModel, filter: &PathFilter) -> Vec<Candidate> {
    let list_index = filter.list_index.map(ListIndex::Item);

    if let (Some(endpoint), Some(cluster), Some(id)) = (filter.endpoint, filter.cluster, filter.id)
    {
        let path = ConcretePath {
            endpoint,
            cluster,
            id,
            list_index,
        };
        let status = if !model.endpoints().contains(&endpoint) {
            Some(StatusCode::UnsupportedEndpoint)
        } else if !model.clusters(endpoint).contains(&cluster) {
            Some(StatusCode::UnsupportedCluster)
        } else if !model.attributes(endpoint, cluster).contains(&id) {
            Some(StatusCode::UnsupportedAttribute)
        } else {
            None
        };
        return vec![status.map_or(Candidate::Attribute(path), |s| Candidate::Missing(path, s))];
    }

    let mut out = Vec::new();
    for endpoint in model.endpoints() {
        if filter.endpoint.is_some_and(|e| e != endpoint) {
            continue;
        }
        for cluster in model.clusters(endpoint) {
            if filter.cluster.is_some_and(|c| c != cluster) {
                continue;
            }
            let mut ids: Vec<u32> = model
                .attributes(endpoint, cluster)
                .into_iter()
                .filter(|id| filter.id.is_none_or(|f| f == *id))
                .collect();
            ids.sort_by_key(|id| attribute_rank(*id));
            out.extend(ids.into_iter().map(|id| {
                Candidate::Attribute(ConcretePath {
                    endpoint,
                    cluster,
                    id,
                    list_index,
                })
            }));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::global;
    use serde_json::json;

    fn model() -> InMemoryDataModel {
        let model = InMemoryDataModel::new();
        model.set_attribute(EndpointId(1), ClusterId(6), 0x0000, json!(true));
        model.set_attribute(EndpointId(1), ClusterId(6), global::CLUSTER_REVISION, json!(4));
        model.set_attribute(EndpointId(1), ClusterId(6), global::FEATURE_MAP, json!(1));
        model.set_attribute(EndpointId(1), ClusterId(6), 0x4000, json!(false));
        model.set_attribute(EndpointId(0), ClusterId(0x28), 0x0001, json!("vendor"));
        model.set_attribute(EndpointId(1), ClusterId(8), 0x0000, json!(128));
        model
    }

    fn ids(candidates: &[Candidate]) -> Vec<(u16, u32, u32)> {
        candidates
            .iter()
            .map(|c| {
                let p = c.path();
                (p.endpoint.0, p.cluster.0, p.id)
            })
            .collect()
    }

    #[test]
    fn wildcard_enumeration_order() {
        let model = model();
        let expanded = expand_attributes(&model, &PathFilter::wildcard());
        assert_eq!(
            ids(&expanded),
            vec![
                (0, 0x28, 0x0001),
                (1, 6, global::FEATURE_MAP),
                (1, 6, global::CLUSTER_REVISION),
                (1, 6, 0x0000),
                (1, 6, 0x4000),
                (1, 8, 0x0000),
            ]
        );
    }

    #[test]
    fn wildcard_skips_missing() {
        let model = model();
        let filter = PathFilter::wildcard().with_cluster(ClusterId(0x1234));
        assert!(expand_attributes(&model, &filter).is_empty());
    }

    #[test]
    fn concrete_missing_yields_status() {
        let model = model();
        let cases = [
            (EndpointId(7), ClusterId(6), 0, StatusCode::UnsupportedEndpoint),
            (EndpointId(1), ClusterId(0x1234), 0, StatusCode::UnsupportedCluster),
            (EndpointId(1), ClusterId(6), 0x0011, StatusCode::UnsupportedAttribute),
        ];
        for (endpoint, cluster, id, expected) in cases {
            let filter = PathFilter::concrete(endpoint, cluster, id);
            let expanded = expand_attributes(&model, &filter);
            assert!(matches!(expanded.as_slice(), [Candidate::Missing(_, s)] if *s == expected));
        }
    }

    #[test]
    fn attribute_keys_order_globals_first() {
        let data = ConcretePath::new(EndpointId(1), ClusterId(6), 0);
        let revision = ConcretePath::new(EndpointId(1), ClusterId(6), global::CLUSTER_REVISION);
        let next_cluster = ConcretePath::new(EndpointId(1), ClusterId(7), global::FEATURE_MAP);
        assert!(AttributeKey::of(&revision) < AttributeKey::of(&data));
        assert!(AttributeKey::of(&data) < AttributeKey::of(&next_cluster));
    }
}
