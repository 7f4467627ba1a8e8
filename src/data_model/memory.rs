// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory attribute store.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::DataModel;
use crate::message::StatusCode;
use crate::path::{ClusterId, ConcretePath, DataVersion, EndpointId, ListIndex};

#[derive(Debug, Default)]
struct ClusterData {
    version: DataVersion,
    attributes: BTreeMap<u32, Value>,
}

type Endpoints = BTreeMap<EndpointId, BTreeMap<ClusterId, ClusterData>>;

/// Attribute store kept in memory.
///
/// Clones share the same storage, so an application can keep a handle to
/// mutate values while the engine holds another for reading. Every write
/// bumps the data version of the cluster instance it touches.
///
/// # Examples
///
/// ```
/// use im_reporting::data_model::{DataModel, InMemoryDataModel};
/// use im_reporting::path::{ClusterId, EndpointId};
///
/// let model = InMemoryDataModel::new();
/// let v1 = model.set_attribute(EndpointId(1), ClusterId(6), 0, serde_json::json!(false));
/// let v2 = model.set_attribute(EndpointId(1), ClusterId(6), 0, serde_json::json!(true));
/// assert_eq!(v2, v1 + 1);
/// assert_eq!(model.data_version(EndpointId(1), ClusterId(6)), Some(v2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataModel {
    endpoints: Arc<RwLock<Endpoints>>,
}

impl InMemoryDataModel {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an attribute value and returns the cluster's new data version.
    pub fn set_attribute(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        attribute: u32,
        value: Value,
    ) -> DataVersion {
        let mut endpoints = self.endpoints.write();
        let data = endpoints
            .entry(endpoint)
            .or_default()
            .entry(cluster)
            .or_default();
        data.attributes.insert(attribute, value);
        data.version = data.version.wrapping_add(1);
        data.version
    }

    /// Removes a whole endpoint and everything on it.
    pub fn remove_endpoint(&self, endpoint: EndpointId) -> bool {
        self.endpoints.write().remove(&endpoint).is_some()
    }
}

impl DataModel for InMemoryDataModel {
    fn endpoints(&self) -> Vec<EndpointId> {
        self.endpoints.read().keys().copied().collect()
    }

    fn clusters(&self, endpoint: EndpointId) -> Vec<ClusterId> {
        self.endpoints
            .read()
            .get(&endpoint)
            .map(|clusters| clusters.keys().copied().collect())
            .unwrap_or_default()
    }

    fn attributes(&self, endpoint: EndpointId, cluster: ClusterId) -> Vec<u32> {
        self.endpoints
            .read()
            .get(&endpoint)
            .and_then(|clusters| clusters.get(&cluster))
            .map(|data| data.attributes.keys().copied().collect())
            .unwrap_or_default()
    }

    fn read_attribute(&self, path: &ConcretePath) -> Result<Value, StatusCode> {
        let endpoints = self.endpoints.read();
        let clusters = endpoints
            .get(&path.endpoint)
            .ok_or(StatusCode::UnsupportedEndpoint)?;
        let data = clusters
            .get(&path.cluster)
            .ok_or(StatusCode::UnsupportedCluster)?;
        let value = data
            .attributes
            .get(&path.id)
            .ok_or(StatusCode::UnsupportedAttribute)?;

        match path.list_index {
            None => Ok(value.clone()),
            Some(ListIndex::Item(index)) => value
                .as_array()
                .ok_or(StatusCode::InvalidAction)?
                .get(usize::from(index))
                .cloned()
                .ok_or(StatusCode::ConstraintError),
            Some(ListIndex::Append) => Err(StatusCode::InvalidAction),
        }
    }

    fn data_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<DataVersion> {
        self.endpoints
            .read()
            .get(&endpoint)
            .and_then(|clusters| clusters.get(&cluster))
            .map(|data| data.version)
    }
}
