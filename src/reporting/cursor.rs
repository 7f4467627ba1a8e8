// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resume position of a chunked report.

use crate::data_model::AttributeKey;
use crate::path::{ClusterId, ConcretePath, EndpointId, ListIndex, PathFilter};

/// Total order over report candidates: attribute order, then whole
/// attribute before its individual elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct CandidateKey {
    attribute: AttributeKey,
    element: u32,
}

impl CandidateKey {
    pub(crate) fn of(path: &ConcretePath) -> Self {
        let element = match path.list_index {
            None => 0,
            Some(ListIndex::Item(i)) => u32::from(i) + 1,
            Some(ListIndex::Append) => u32::MAX,
        };
        Self {
            attribute: AttributeKey::of(path),
            element,
        }
    }

    pub(crate) fn cluster(&self) -> (EndpointId, ClusterId) {
        (self.attribute.endpoint, self.attribute.cluster)
    }
}

/// Where the next chunk picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Nothing emitted yet.
    Start,
    /// Re-emit the given cluster from its first attribute.
    ClusterStart(EndpointId, ClusterId),
    /// Everything up to and including the key was emitted.
    After(CandidateKey),
    /// A list was cut; its remaining items start at `next_item`.
    Within {
        key: CandidateKey,
        next_item: usize,
    },
}

impl Resume {
    pub(crate) fn admits(&self, key: &CandidateKey) -> bool {
        match self {
            Self::Start => true,
            Self::ClusterStart(endpoint, cluster) => key.cluster() >= (*endpoint, *cluster),
            Self::After(last) => key > last,
            Self::Within { key: cut, .. } => key >= cut,
        }
    }

    pub(crate) fn current_cluster(&self) -> Option<(EndpointId, ClusterId)> {
        match self {
            Self::Start => None,
            Self::ClusterStart(endpoint, cluster) => Some((*endpoint, *cluster)),
            Self::After(key) | Self::Within { key, .. } => Some(key.cluster()),
        }
    }

    /// Restarts the current cluster if `filter` touches it.
    pub(crate) fn rewind_if_touched(&mut self, filter: &PathFilter) -> bool {
        match self.current_cluster() {
            Some((endpoint, cluster)) if filter.touches_cluster(endpoint, cluster) => {
                *self = Self::ClusterStart(endpoint, cluster);
                true
            }
            _ => false,
        }
    }
}
