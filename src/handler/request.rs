// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turning request payloads into interest sets.

use crate::error::{Error, ParseError, Result};
use crate::message::ib::{AttributePathIB, EventInterest, EventPathIB};
use crate::path::{DataVersionFilter, PathFilter};

/// The interest expressed by a read or subscribe request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    /// Attribute filters; paths with reserved ids are already dropped.
    pub attributes: Vec<PathFilter>,
    /// Event filters with their urgency.
    pub events: Vec<EventInterest>,
    /// Version hints for the priming report.
    pub data_version_filters: Vec<DataVersionFilter>,
    /// First event number wanted.
    pub event_min: u64,
    /// Fabric-scoped data is restricted to the requester's fabric.
    pub fabric_filtered: bool,
}

impl Interest {
    /// Parses request paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceExhausted` if the request carries more than
    /// `max_paths` paths, and `Error::Parse` for a request without paths or
    /// with a structurally invalid path.
    pub fn parse(
        attribute_requests: &[AttributePathIB],
        event_requests: &[EventPathIB],
        max_paths: usize,
    ) -> Result<Self> {
        if attribute_requests.is_empty() && event_requests.is_empty() {
            return Err(ParseError::MissingField("attribute_requests").into());
        }
        if attribute_requests.len() + event_requests.len() > max_paths {
            return Err(Error::ResourceExhausted("paths per request"));
        }

        let mut attributes = Vec::with_capacity(attribute_requests.len());
        for ib in attribute_requests {
            match ib.to_filter()? {
                Some(filter) => attributes.push(filter),
                None => tracing::trace!(?ib, "Attribute path uses a reserved id, matches nothing"),
            }
        }

        let mut events = Vec::with_capacity(event_requests.len());
        for ib in event_requests {
            match ib.to_interest()? {
                Some(interest) => events.push(interest),
                None => tracing::trace!(?ib, "Event path uses a reserved id, matches nothing"),
            }
        }

        Ok(Self {
            attributes,
            events,
            ..Self::default()
        })
    }

    /// Returns `true` if the request asked for nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{ClusterId, EndpointId};

    #[test]
    fn too_many_paths() {
        let paths = vec![AttributePathIB::default(); 3];
        let result = Interest::parse(&paths, &[EventPathIB::default()], 3);
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
    }

    #[test]
    fn reserved_ids_are_dropped_not_rejected() {
        let reserved = AttributePathIB {
            endpoint: Some(EndpointId(1)),
            cluster: Some(ClusterId(6)),
            attribute: Some(0x5000),
            ..AttributePathIB::default()
        };
        let interest = Interest::parse(&[reserved, AttributePathIB::default()], &[], 8).unwrap();
        assert_eq!(interest.attributes, vec![PathFilter::wildcard()]);
    }

    #[test]
    fn request_without_paths_is_malformed() {
        assert!(matches!(Interest::parse(&[], &[], 8), Err(Error::Parse(_))));
    }

    #[test]
    fn malformed_path_is_an_error() {
        let malformed = AttributePathIB {
            attribute: Some(0x0001),
            ..AttributePathIB::default()
        };
        assert!(matches!(Interest::parse(&[malformed], &[], 8), Err(Error::Parse(_))));
    }
}
