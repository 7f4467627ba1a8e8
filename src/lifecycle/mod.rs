// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle notifications of the publisher side.
//!
//! The engine publishes an [`EngineEvent`] on its [`EventBus`] whenever a
//! read completes, a subscription is established or torn down, or a
//! subscription report goes out. Observers subscribe through
//! [`Engine::subscribe_events`](crate::Engine::subscribe_events).

mod engine_event;
mod event_bus;

pub use engine_event::{EngineEvent, TerminationReason};
pub use event_bus::EventBus;
