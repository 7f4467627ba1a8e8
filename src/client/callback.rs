// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callbacks a read client delivers to its owner.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Error;
use crate::event_log::Priority;
use crate::message::StatusCode;
use crate::path::{ConcretePath, DataVersion, FabricIndex};

/// Metadata of a received event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Concrete path of the event.
    pub path: ConcretePath,
    /// Event number assigned by the publisher.
    pub event_number: u64,
    /// Priority tier the event was logged at.
    pub priority: Priority,
    /// Publisher wall-clock time of the event.
    pub timestamp: DateTime<Utc>,
    /// Fabric the event is scoped to, if any.
    pub fabric_index: Option<FabricIndex>,
}

/// Owner-side sink of a read or subscribe transaction.
///
/// Every method has an empty default, so implementors only override what
/// they care about. Failures always arrive through [`on_error`](Self::on_error);
/// [`on_done`](Self::on_done) is the last call a client ever makes.
pub trait ReadClientCallback: Send {
    /// An attribute value or an attribute status.
    ///
    /// List elements reported separately carry their list index in `path`.
    fn on_attribute_data(
        &mut self,
        _path: &ConcretePath,
        _data_version: Option<DataVersion>,
        _data: Result<&Value, StatusCode>,
    ) {
    }

    /// Number of list items carried by the preceding list report.
    fn on_list_items(&mut self, _path: &ConcretePath, _count: usize) {}

    /// An event record.
    fn on_event_data(&mut self, _header: &EventHeader, _data: &Value) {}

    /// An event status.
    fn on_event_status(&mut self, _path: &ConcretePath, _status: StatusCode) {}

    /// The subscription is established with the negotiated max interval.
    fn on_subscription_established(&mut self, _subscription_id: u32, _max_interval: u16) {}

    /// A resubscription will be attempted after `delay`.
    fn on_resubscription_attempt(&mut self, _attempt: u32, _delay: Duration) {}

    /// The last chunk of a report was processed.
    fn on_report_end(&mut self) {}

    /// The transaction failed.
    fn on_error(&mut self, _error: &Error) {}

    /// The client is finished and will not call back again.
    fn on_done(&mut self) {}
}
