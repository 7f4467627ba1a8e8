// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client side of read and subscribe transactions.
//!
//! A [`ReadClient`] sends one request and consumes the reports that answer
//! it, acknowledging every chunk that asks for it. Subscriptions then stay
//! `Active`, receiving unsolicited reports, until they fail or are shut
//! down. A failing subscription may come back on its own according to its
//! [`ResubscribePolicy`].
//!
//! ```text
//! Idle -> AwaitingInitialReport -> AwaitingSubscribeResponse -> Active
//!  ^                |                                              |
//!  |                +--> Terminated (read done)                    |
//!  +------------------- resubscribe after failure <----------------+
//! ```

mod callback;
mod id;
mod resubscribe;

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

pub use callback::{EventHeader, ReadClientCallback};
pub use id::ClientId;
pub use resubscribe::ResubscribePolicy;

use crate::error::{Error, ParseError, Result};
use crate::handler::InteractionKind;
use crate::message::ib::{
    AttributePathIB, AttributeReportIB, EventInterest, EventPathIB, EventReportIB,
};
use crate::message::{
    ExchangeId, Message, MessageType, ReadRequest, ReportData, StatusCode, StatusResponse,
    SubscribeRequest, SubscribeResponse,
};
use crate::path::{DataVersionFilter, PathFilter};
use crate::session::{ExchangeKey, SessionId};

/// What a read client asks for.
///
/// # Examples
///
/// ```
/// use im_reporting::client::ReadParams;
/// use im_reporting::path::{ClusterId, EndpointId, PathFilter};
///
/// let params = ReadParams::new()
///     .with_attribute(PathFilter::cluster(EndpointId(1), ClusterId(6)))
///     .with_urgent_event(PathFilter::wildcard().with_cluster(ClusterId(0x3B)))
///     .with_intervals(1, 60);
/// assert_eq!(params.attributes.len(), 1);
/// assert!(params.events[0].urgent);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadParams {
    /// Attribute paths.
    pub attributes: Vec<PathFilter>,
    /// Event paths.
    pub events: Vec<EventInterest>,
    /// Clusters already held at a known version.
    pub data_version_filters: Vec<DataVersionFilter>,
    /// First event number wanted.
    pub event_min: Option<u64>,
    /// Restrict fabric-scoped data to this client's fabric.
    pub fabric_filtered: bool,
    /// Minimum seconds between reports (subscriptions only).
    pub min_interval_floor: u16,
    /// Maximum seconds between reports (subscriptions only).
    pub max_interval_ceiling: u16,
    /// Keep this peer's other subscriptions alive (subscriptions only).
    pub keep_subscriptions: bool,
}

impl ReadParams {
    /// Creates empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute path.
    #[must_use]
    pub fn with_attribute(mut self, filter: PathFilter) -> Self {
        self.attributes.push(filter);
        self
    }

    /// Adds an event path.
    #[must_use]
    pub fn with_event(mut self, filter: PathFilter) -> Self {
        self.events.push(EventInterest {
            filter,
            urgent: false,
        });
        self
    }

    /// Adds an event path whose events may bypass the minimum interval.
    #[must_use]
    pub fn with_urgent_event(mut self, filter: PathFilter) -> Self {
        self.events.push(EventInterest {
            filter,
            urgent: true,
        });
        self
    }

    /// Adds a data-version filter.
    #[must_use]
    pub fn with_data_version_filter(mut self, filter: DataVersionFilter) -> Self {
        self.data_version_filters.push(filter);
        self
    }

    /// Only asks for events numbered `event_min` or higher.
    #[must_use]
    pub fn with_event_min(mut self, event_min: u64) -> Self {
        self.event_min = Some(event_min);
        self
    }

    /// Sets the fabric filter flag.
    #[must_use]
    pub fn with_fabric_filtered(mut self, fabric_filtered: bool) -> Self {
        self.fabric_filtered = fabric_filtered;
        self
    }

    /// Sets the requested subscription intervals, in seconds.
    #[must_use]
    pub fn with_intervals(mut self, min_interval_floor: u16, max_interval_ceiling: u16) -> Self {
        self.min_interval_floor = min_interval_floor;
        self.max_interval_ceiling = max_interval_ceiling;
        self
    }

    /// Sets the keep-subscriptions flag.
    #[must_use]
    pub fn with_keep_subscriptions(mut self, keep: bool) -> Self {
        self.keep_subscriptions = keep;
        self
    }

    /// Checks the parameters before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a request without paths, or a
    /// subscription whose minimum interval exceeds its maximum.
    pub fn validate(&self, kind: InteractionKind) -> Result<()> {
        if self.attributes.is_empty() && self.events.is_empty() {
            return Err(Error::InvalidArgument("request without paths".to_string()));
        }
        if kind == InteractionKind::Subscribe && self.min_interval_floor > self.max_interval_ceiling
        {
            return Err(Error::InvalidArgument(format!(
                "min interval {} > max interval {}",
                self.min_interval_floor, self.max_interval_ceiling
            )));
        }
        Ok(())
    }

    fn attribute_paths(&self) -> Vec<AttributePathIB> {
        self.attributes.iter().map(AttributePathIB::from).collect()
    }

    fn event_paths(&self) -> Vec<EventPathIB> {
        self.events
            .iter()
            .map(|interest| EventPathIB {
                node: None,
                endpoint: interest.filter.endpoint,
                cluster: interest.filter.cluster,
                event: interest.filter.id,
                urgent: interest.urgent.then_some(true),
            })
            .collect()
    }
}

/// Protocol state of a [`ReadClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Not yet sent, or waiting to resubscribe.
    Idle,
    /// The request was sent; reports of the initial answer are arriving.
    AwaitingInitialReport,
    /// The priming report is complete; the subscribe response is pending.
    AwaitingSubscribeResponse,
    /// The subscription is established.
    Active,
    /// The client is finished.
    Terminated,
}

impl ClientState {
    const fn describe(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingInitialReport => "awaiting initial report",
            Self::AwaitingSubscribeResponse => "awaiting subscribe response",
            Self::Active => "active",
            Self::Terminated => "terminated",
        }
    }
}

/// Result of feeding a message to a client.
#[derive(Debug)]
pub(crate) struct Progress {
    /// Message to send back on the same exchange.
    pub(crate) reply: Option<Message>,
    /// The client has delivered `on_done` and can be dropped.
    pub(crate) finished: bool,
}

/// Client-side state of one read or subscribe transaction.
pub struct ReadClient {
    id: ClientId,
    kind: InteractionKind,
    session: SessionId,
    params: ReadParams,
    policy: ResubscribePolicy,
    callback: Box<dyn ReadClientCallback>,
    state: ClientState,
    exchange: Option<ExchangeKey>,
    subscription_id: Option<u32>,
    max_interval: Option<u16>,
    liveness_deadline: Option<Instant>,
    resubscribe_at: Option<Instant>,
    attempt: u32,
    last_event: Option<u64>,
}

impl fmt::Debug for ReadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadClient")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("session", &self.session)
            .field("state", &self.state)
            .field("subscription_id", &self.subscription_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

impl ReadClient {
    pub(crate) fn new(
        id: ClientId,
        kind: InteractionKind,
        session: SessionId,
        params: ReadParams,
        policy: ResubscribePolicy,
        callback: Box<dyn ReadClientCallback>,
    ) -> Self {
        Self {
            id,
            kind,
            session,
            params,
            policy,
            callback,
            state: ClientState::Idle,
            exchange: None,
            subscription_id: None,
            max_interval: None,
            liveness_deadline: None,
            resubscribe_at: None,
            attempt: 0,
            last_event: None,
        }
    }

    /// Client id.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Read or subscribe.
    #[must_use]
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Session the client talks on.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Subscription id once the publisher assigned one.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u32> {
        self.subscription_id
    }

    /// Negotiated max interval of an established subscription.
    #[must_use]
    pub fn max_interval(&self) -> Option<u16> {
        self.max_interval
    }

    /// Number of resubscription attempts since the last established subscription.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn exchange(&self) -> Option<ExchangeKey> {
        self.exchange
    }

    pub(crate) fn is_on_exchange(&self, session: SessionId, key: ExchangeKey) -> bool {
        self.session == session && self.exchange == Some(key)
    }

    /// Returns `true` if an unsolicited report for `subscription_id` belongs here.
    pub(crate) fn accepts_report(&self, session: SessionId, subscription_id: u32) -> bool {
        self.session == session
            && self.state == ClientState::Active
            && self.exchange.is_none()
            && self.subscription_id == Some(subscription_id)
    }

    /// Attaches the exchange the publisher opened for a new report.
    pub(crate) fn attach_exchange(&mut self, key: ExchangeKey) {
        self.exchange = Some(key);
    }

    /// Earliest instant the client needs attention without a message.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match (self.liveness_deadline, self.resubscribe_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub(crate) fn liveness_expired(&self, now: Instant) -> bool {
        self.liveness_deadline.is_some_and(|deadline| now >= deadline)
    }

    pub(crate) fn resubscribe_due(&self, now: Instant) -> bool {
        self.resubscribe_at.is_some_and(|at| now >= at)
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Builds the request message and opens the exchange.
    ///
    /// A resubscription asks for events after the last one received.
    pub(crate) fn build_request(&mut self, exchange: ExchangeId) -> Result<Message> {
        if self.state != ClientState::Idle {
            return Err(Error::IncorrectState("request already sent"));
        }
        let event_min = self
            .last_event
            .map(|n| n + 1)
            .or(self.params.event_min);

        let message = match self.kind {
            InteractionKind::Read => Message::encode(
                exchange,
                true,
                MessageType::ReadRequest,
                &ReadRequest {
                    attribute_requests: self.params.attribute_paths(),
                    event_requests: self.params.event_paths(),
                    event_min,
                    data_version_filters: self.params.data_version_filters.clone(),
                    is_fabric_filtered: self.params.fabric_filtered,
                },
            )?,
            InteractionKind::Subscribe => Message::encode(
                exchange,
                true,
                MessageType::SubscribeRequest,
                &SubscribeRequest {
                    keep_subscriptions: self.params.keep_subscriptions,
                    min_interval_floor: self.params.min_interval_floor,
                    max_interval_ceiling: self.params.max_interval_ceiling,
                    attribute_requests: self.params.attribute_paths(),
                    event_requests: self.params.event_paths(),
                    event_min,
                    data_version_filters: self.params.data_version_filters.clone(),
                    is_fabric_filtered: self.params.fabric_filtered,
                },
            )?,
        };

        self.exchange = Some(ExchangeKey::local(exchange));
        self.state = ClientState::AwaitingInitialReport;
        self.subscription_id = None;
        self.resubscribe_at = None;
        tracing::debug!(client = %self.id, kind = ?self.kind, %exchange, "Request sent");
        Ok(message)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Consumes a message on the client's exchange.
    pub(crate) fn process_message(
        &mut self,
        message: &Message,
        now: Instant,
        liveness_margin: u16,
    ) -> Result<Progress> {
        match (self.state, message.msg_type) {
            (ClientState::AwaitingInitialReport | ClientState::Active, MessageType::ReportData) => {
                self.process_report_data(message, now, liveness_margin)
            }
            (
                ClientState::AwaitingSubscribeResponse,
                MessageType::SubscribeResponse,
            ) => self.process_subscribe_response(message, now, liveness_margin),
            (
                ClientState::AwaitingInitialReport | ClientState::AwaitingSubscribeResponse,
                MessageType::StatusResponse,
            ) => {
                let status: StatusResponse = message.decode()?;
                if status.status.is_success() {
                    return Err(self.unexpected(message.msg_type));
                }
                Err(Error::Status(status.status))
            }
            (_, actual) => Err(self.unexpected(actual)),
        }
    }

    fn unexpected(&self, actual: MessageType) -> Error {
        Error::InvalidMessageType {
            actual,
            state: self.state.describe(),
        }
    }

    fn process_report_data(
        &mut self,
        message: &Message,
        now: Instant,
        liveness_margin: u16,
    ) -> Result<Progress> {
        let report: ReportData = message.decode()?;

        match (self.kind, report.subscription_id) {
            (InteractionKind::Read, Some(id)) => {
                return Err(Error::InvalidArgument(format!(
                    "read report carries subscription id {id}"
                )));
            }
            (InteractionKind::Subscribe, None) => {
                return Err(ParseError::MissingField("subscription_id").into());
            }
            (InteractionKind::Subscribe, Some(id)) => match self.subscription_id {
                None if self.state == ClientState::AwaitingInitialReport => {
                    self.subscription_id = Some(id);
                }
                Some(known) if known == id => {}
                _ => return Err(Error::InvalidSubscription(id)),
            },
            (InteractionKind::Read, None) => {}
        }

        validate_paths(&report)?;
        self.deliver(&report)?;

        if self.state == ClientState::Active {
            self.arm_liveness(now, liveness_margin);
        }

        let exchange = self
            .exchange
            .ok_or(Error::IncorrectState("report outside an exchange"))?;
        let reply = if report.suppress_response {
            None
        } else {
            Some(Message::status(
                exchange.id,
                exchange.locally_initiated,
                StatusCode::Success,
            )?)
        };

        if report.more_chunked_messages {
            return Ok(Progress {
                reply,
                finished: false,
            });
        }

        self.callback.on_report_end();
        let finished = match self.kind {
            InteractionKind::Read => {
                self.finish();
                true
            }
            InteractionKind::Subscribe => {
                if self.state == ClientState::AwaitingInitialReport {
                    self.state = ClientState::AwaitingSubscribeResponse;
                } else {
                    self.exchange = None;
                }
                false
            }
        };
        Ok(Progress { reply, finished })
    }

    fn deliver(&mut self, report: &ReportData) -> Result<()> {
        for ib in &report.attribute_reports {
            match ib {
                AttributeReportIB::Data(data) => {
                    let path = data.path.to_concrete()?;
                    self.callback
                        .on_attribute_data(&path, data.data_version, Ok(&data.data));
                    if path.is_list_item() {
                        self.callback.on_list_items(&path, 1);
                    } else if let Value::Array(items) = &data.data {
                        self.callback.on_list_items(&path, items.len());
                    }
                }
                AttributeReportIB::Status(status) => {
                    let path = status.path.to_concrete()?;
                    self.callback.on_attribute_data(&path, None, Err(status.status));
                }
            }
        }

        for ib in &report.event_reports {
            match ib {
                EventReportIB::Data(event) => {
                    let header = EventHeader {
                        path: event.path.to_concrete()?,
                        event_number: event.event_number,
                        priority: event.priority,
                        timestamp: event.timestamp,
                        fabric_index: event.fabric_index,
                    };
                    self.last_event = Some(
                        self.last_event
                            .map_or(event.event_number, |n| n.max(event.event_number)),
                    );
                    self.callback.on_event_data(&header, &event.data);
                }
                EventReportIB::Status(status) => {
                    let path = status.path.to_concrete()?;
                    self.callback.on_event_status(&path, status.status);
                }
            }
        }
        Ok(())
    }

    fn process_subscribe_response(
        &mut self,
        message: &Message,
        now: Instant,
        liveness_margin: u16,
    ) -> Result<Progress> {
        let response: SubscribeResponse = message.decode()?;
        if self.subscription_id != Some(response.subscription_id) {
            return Err(Error::InvalidSubscription(response.subscription_id));
        }

        self.state = ClientState::Active;
        self.max_interval = Some(response.max_interval);
        self.exchange = None;
        self.attempt = 0;
        self.arm_liveness(now, liveness_margin);
        tracing::debug!(
            client = %self.id,
            subscription_id = response.subscription_id,
            max_interval = response.max_interval,
            "Subscription established"
        );
        self.callback
            .on_subscription_established(response.subscription_id, response.max_interval);
        Ok(Progress {
            reply: None,
            finished: false,
        })
    }

    fn arm_liveness(&mut self, now: Instant, liveness_margin: u16) {
        if let Some(max) = self.max_interval {
            let timeout = Duration::from_secs(u64::from(max) + u64::from(liveness_margin));
            self.liveness_deadline = Some(now + timeout);
        }
    }

    // ========================================================================
    // Failure and teardown
    // ========================================================================

    /// Reports `error` to the owner and either schedules a resubscription
    /// or finishes the client. Returns `true` if the client finished.
    pub(crate) fn fail(&mut self, error: &Error, now: Instant) -> bool {
        tracing::warn!(client = %self.id, %error, "Read client failed");
        self.callback.on_error(error);
        self.exchange = None;
        self.liveness_deadline = None;
        self.subscription_id = None;
        self.max_interval = None;

        if self.kind == InteractionKind::Subscribe
            && error.is_retryable()
            && self.policy.allows_attempt(self.attempt)
        {
            let delay = self.policy.wait_before(self.attempt);
            self.attempt += 1;
            self.state = ClientState::Idle;
            self.resubscribe_at = Some(now + delay);
            tracing::debug!(client = %self.id, attempt = self.attempt, ?delay, "Resubscription scheduled");
            self.callback.on_resubscription_attempt(self.attempt, delay);
            return false;
        }

        self.finish();
        true
    }

    /// Cancels a scheduled resubscription and finishes the client.
    pub(crate) fn cancel_resubscription(&mut self) -> Result<()> {
        if self.resubscribe_at.take().is_none() {
            return Err(Error::IncorrectState("no resubscription pending"));
        }
        self.callback.on_error(&Error::ResubscribeCancelled);
        self.finish();
        Ok(())
    }

    /// Reports `error` and finishes without considering a resubscription.
    pub(crate) fn abort(&mut self, error: &Error) {
        if self.state != ClientState::Terminated {
            self.callback.on_error(error);
        }
        self.finish();
    }

    /// Finishes the client, delivering `on_done`.
    pub(crate) fn finish(&mut self) {
        if self.state == ClientState::Terminated {
            return;
        }
        self.state = ClientState::Terminated;
        self.exchange = None;
        self.liveness_deadline = None;
        self.resubscribe_at = None;
        self.callback.on_done();
    }
}

/// Checks every reported path before anything reaches the owner.
fn validate_paths(report: &ReportData) -> Result<()> {
    for ib in &report.attribute_reports {
        match ib {
            AttributeReportIB::Data(data) => data.path.to_concrete()?,
            AttributeReportIB::Status(status) => status.path.to_concrete()?,
        };
    }
    for ib in &report.event_reports {
        match ib {
            EventReportIB::Data(event) => event.path.to_concrete()?,
            EventReportIB::Status(status) => status.path.to_concrete()?,
        };
    }
    Ok(())
}
