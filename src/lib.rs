// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `im_reporting` - read and subscribe interactions for a Matter-style
//! device data model.
//!
//! The crate implements both sides of the interaction:
//!
//! - **Publisher**: read handlers answer read and subscribe requests with
//!   chunked reports, track which paths changed and report them to
//!   subscribers on a min/max interval schedule.
//! - **Subscriber**: read clients issue requests, validate and deliver
//!   incoming reports, watch subscription liveness and resubscribe with
//!   exponential backoff.
//!
//! Everything lives in one [`Engine`] value that never blocks. The
//! transport, data model, clock and application hooks are traits, so the
//! engine can be wired to a real network stack or to an in-memory loopback
//! in tests. [`EngineDriver`] runs an engine on the tokio runtime.
//!
//! # Quick Start
//!
//! ## Publisher
//!
//! ```
//! use im_reporting::config::EngineConfig;
//! use im_reporting::message::{ExchangeId, Message, MessageType, ReadRequest};
//! use im_reporting::message::ib::AttributePathIB;
//! use im_reporting::path::{ClusterId, EndpointId, PathFilter};
//! use im_reporting::session::PeerId;
//! use im_reporting::transport::MemoryTransport;
//! use im_reporting::{Engine, InMemoryDataModel};
//!
//! let model = InMemoryDataModel::new();
//! model.set_attribute(EndpointId(1), ClusterId(6), 0, serde_json::json!(true));
//!
//! let (transport, outbox) = MemoryTransport::new();
//! let mut engine = Engine::builder(EngineConfig::default())
//!     .with_transport(transport)
//!     .with_data_model(model)
//!     .build()?;
//!
//! let session = engine.add_session(PeerId::new(0x1234, 1));
//! let request = ReadRequest {
//!     attribute_requests: vec![AttributePathIB::from(&PathFilter::cluster(
//!         EndpointId(1),
//!         ClusterId(6),
//!     ))],
//!     ..ReadRequest::default()
//! };
//! let message = Message::encode(ExchangeId(1), true, MessageType::ReadRequest, &request)?;
//! engine.on_message_received(session, message);
//!
//! // A single-chunk read is answered at once and needs no acknowledgement.
//! assert_eq!(outbox.len(), 1);
//! assert_eq!(engine.num_active_read_handlers(), 0);
//! # Ok::<(), im_reporting::Error>(())
//! ```
//!
//! ## Subscriber
//!
//! ```
//! use im_reporting::client::{ReadClientCallback, ReadParams, ResubscribePolicy};
//! use im_reporting::config::EngineConfig;
//! use im_reporting::path::{ClusterId, EndpointId, PathFilter};
//! use im_reporting::session::PeerId;
//! use im_reporting::transport::MemoryTransport;
//! use im_reporting::Engine;
//!
//! struct Printer;
//!
//! impl ReadClientCallback for Printer {
//!     fn on_subscription_established(&mut self, subscription_id: u32, max_interval: u16) {
//!         println!("subscription {subscription_id} every {max_interval}s at most");
//!     }
//! }
//!
//! let (transport, outbox) = MemoryTransport::new();
//! let mut engine = Engine::builder(EngineConfig::default())
//!     .with_transport(transport)
//!     .build()?;
//! let session = engine.add_session(PeerId::new(0x1234, 1));
//!
//! let params = ReadParams::new()
//!     .with_attribute(PathFilter::cluster(EndpointId(1), ClusterId(6)))
//!     .with_intervals(1, 60);
//! engine.send_subscribe_request(session, params, ResubscribePolicy::default(), Printer)?;
//! assert_eq!(outbox.len(), 1);
//! # Ok::<(), im_reporting::Error>(())
//! ```

pub mod callback;
pub mod client;
pub mod clock;
pub mod config;
pub mod data_model;
mod driver;
mod engine;
pub mod error;
pub mod event_log;
pub mod handler;
pub mod interest;
pub mod lifecycle;
pub mod message;
pub mod path;
mod reporting;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use callback::{ApplicationCallback, DefaultApplicationCallback};
pub use client::{ClientId, ReadClientCallback, ReadParams, ResubscribePolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, SchedulerPolicy};
pub use data_model::{DataModel, InMemoryDataModel};
pub use driver::EngineDriver;
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, ParseError, Result, TransportError};
pub use event_log::{EventLog, Priority};
pub use handler::{HandlerId, InteractionKind, ReadHandler};
pub use lifecycle::{EngineEvent, TerminationReason};
pub use message::{Message, StatusCode};
pub use path::{ClusterId, ConcretePath, EndpointId, PathFilter};
pub use session::{PeerId, SessionId};
