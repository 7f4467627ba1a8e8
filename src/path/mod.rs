// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data-model paths and wildcard matching.
//!
//! A [`ConcretePath`] names exactly one data item on a device. A
//! [`PathFilter`] may leave any field as a wildcard and is used both to
//! express a subscriber's interest and to mark changed data dirty.
//!
//! # Examples
//!
//! ```
//! use im_reporting::path::{ClusterId, ConcretePath, EndpointId, PathFilter};
//!
//! let path = ConcretePath::new(EndpointId(1), ClusterId(6), 0);
//! assert!(PathFilter::wildcard().matches(&path));
//! assert!(PathFilter::cluster(EndpointId(1), ClusterId(6)).matches(&path));
//! assert!(!PathFilter::cluster(EndpointId(2), ClusterId(6)).matches(&path));
//! ```

mod concrete;
mod filter;
mod ids;

pub use concrete::{ConcretePath, ListIndex};
pub use filter::{DataVersionFilter, PathFilter};
pub use ids::{
    ClusterId, DataVersion, EndpointId, FabricIndex, GLOBAL_ATTRIBUTE_ORDER, NodeId, global,
    is_global_attribute, is_valid_attribute_id, is_valid_cluster_id, is_valid_event_id,
};
