// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publisher-side application hooks.

use crate::handler::{HandlerId, SubscriptionIntervals};
use crate::message::StatusCode;
use crate::session::PeerId;

/// Hooks the publisher application can implement.
///
/// All methods default to doing nothing and accepting everything.
pub trait ApplicationCallback: Send {
    /// Called once a subscribe request is parsed and its intervals negotiated.
    ///
    /// The application may lower or raise the max interval through
    /// [`SubscriptionIntervals::set_max_reporting_interval`], or refuse the
    /// subscription by returning the status to answer with.
    ///
    /// # Errors
    ///
    /// The returned status is sent to the subscriber and the request dropped.
    fn on_subscription_requested(
        &mut self,
        _peer: PeerId,
        _intervals: &mut SubscriptionIntervals,
    ) -> Result<(), StatusCode> {
        Ok(())
    }

    /// The subscription's priming report completed.
    fn on_subscription_established(&mut self, _handler: HandlerId, _subscription_id: u32) {}

    /// A read handler went away, for whatever reason.
    fn on_handler_terminated(&mut self, _handler: HandlerId) {}
}

/// Application callback that accepts every subscription unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultApplicationCallback;

impl ApplicationCallback for DefaultApplicationCallback {}
