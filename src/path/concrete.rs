// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fully resolved data-item paths.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ClusterId, EndpointId};

/// Position of a single element inside a list attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListIndex {
    /// The element at the given position.
    Item(u16),
    /// A new element appended to the end of the list.
    Append,
}

/// A path with no wildcard fields, identifying exactly one data item.
///
/// `id` is an attribute id or an event id depending on where the path is
/// used. A missing `list_index` addresses the whole attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConcretePath {
    /// Endpoint the item lives on.
    pub endpoint: EndpointId,
    /// Cluster the item belongs to.
    pub cluster: ClusterId,
    /// Attribute or event id.
    pub id: u32,
    /// Element of a list attribute, if the path addresses one.
    pub list_index: Option<ListIndex>,
}

impl ConcretePath {
    /// Creates a path addressing a whole attribute or an event.
    #[must_use]
    pub const fn new(endpoint: EndpointId, cluster: ClusterId, id: u32) -> Self {
        Self {
            endpoint,
            cluster,
            id,
            list_index: None,
        }
    }

    /// Returns the same path narrowed to one list element.
    #[must_use]
    pub const fn with_list_index(mut self, index: ListIndex) -> Self {
        self.list_index = Some(index);
        self
    }

    /// Returns `true` if the path addresses a list element rather than a whole item.
    #[must_use]
    pub const fn is_list_item(&self) -> bool {
        self.list_index.is_some()
    }
}

impl fmt::Display for ConcretePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/0x{:04X}", self.endpoint, self.cluster, self.id)?;
        match self.list_index {
            Some(ListIndex::Item(i)) => write!(f, "[{i}]"),
            Some(ListIndex::Append) => write!(f, "[+]"),
            None => Ok(()),
        }
    }
}
