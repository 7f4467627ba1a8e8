// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests wiring a publisher engine to a subscriber engine
//! through in-memory transports and a shared manual clock.

use std::sync::Arc;
use std::time::Duration;

use im_reporting::client::{ReadClientCallback, ReadParams, ResubscribePolicy};
use im_reporting::config::{EngineConfig, SchedulerPolicy};
use im_reporting::event_log::Priority;
use im_reporting::lifecycle::{EngineEvent, TerminationReason};
use im_reporting::message::ib::AttributeReportIB;
use im_reporting::message::{
    ExchangeId, Message, MessageType, ReadRequest, ReportData, StatusCode, StatusResponse,
};
use im_reporting::path::{
    ClusterId, ConcretePath, DataVersion, DataVersionFilter, EndpointId, ListIndex, PathFilter,
};
use im_reporting::session::{PeerId, SessionId};
use im_reporting::transport::{MemoryTransport, Outbox};
use im_reporting::{ClientId, Engine, Error, InMemoryDataModel, ManualClock};
use parking_lot::Mutex;
use serde_json::{Value, json};

const PUBLISHER: PeerId = PeerId::new(0xA11CE, 1);
const SUBSCRIBER: PeerId = PeerId::new(0xB0B, 1);

const ONOFF: ConcretePath = ConcretePath::new(EndpointId(1), ClusterId(6), 0);

// ============================================================================
// Harness
// ============================================================================

/// A publisher and a subscriber connected back to back.
struct Pair {
    clock: ManualClock,
    model: InMemoryDataModel,
    publisher: Engine,
    subscriber: Engine,
    publisher_out: Outbox,
    subscriber_out: Outbox,
    /// The publisher's session with the subscriber.
    publisher_session: SessionId,
    /// The subscriber's session with the publisher.
    subscriber_session: SessionId,
}

impl Pair {
    fn new(config: EngineConfig) -> Self {
        let clock = ManualClock::new();
        let model = InMemoryDataModel::new();
        model.set_attribute(EndpointId(1), ClusterId(6), 0, json!(true));

        let (transport, publisher_out) = MemoryTransport::new();
        let mut publisher = Engine::builder(config)
            .with_transport(transport)
            .with_clock(clock.clone())
            .with_data_model(model.clone())
            .build()
            .unwrap();

        let (transport, subscriber_out) = MemoryTransport::new();
        let mut subscriber = Engine::builder(EngineConfig::default())
            .with_transport(transport)
            .with_clock(clock.clone())
            .build()
            .unwrap();

        let publisher_session = publisher.add_session(SUBSCRIBER);
        let subscriber_session = subscriber.add_session(PUBLISHER);

        Self {
            clock,
            model,
            publisher,
            subscriber,
            publisher_out,
            subscriber_out,
            publisher_session,
            subscriber_session,
        }
    }

    /// Delivers queued messages both ways until both sides are quiet.
    fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..1000 {
            let to_subscriber = self.publisher_out.drain();
            let to_publisher = self.subscriber_out.drain();
            if to_subscriber.is_empty() && to_publisher.is_empty() {
                return delivered;
            }
            delivered += to_subscriber.len() + to_publisher.len();
            for (_, message) in to_subscriber {
                self.subscriber
                    .on_message_received(self.subscriber_session, message);
            }
            for (_, message) in to_publisher {
                self.publisher
                    .on_message_received(self.publisher_session, message);
            }
        }
        panic!("engines never went quiet");
    }

    fn advance(&mut self, seconds: u64) {
        self.clock.advance(Duration::from_secs(seconds));
        self.subscriber.tick();
        self.publisher.tick();
        self.pump();
    }

    fn subscribe(&mut self, params: ReadParams, policy: ResubscribePolicy) -> (ClientId, Recorder) {
        let recorder = Recorder::default();
        let id = self
            .subscriber
            .send_subscribe_request(self.subscriber_session, params, policy, recorder.clone())
            .unwrap();
        self.pump();
        (id, recorder)
    }

    fn read(&mut self, params: ReadParams) -> Recorder {
        let recorder = Recorder::default();
        self.subscriber
            .send_read_request(self.subscriber_session, params, recorder.clone())
            .unwrap();
        self.pump();
        recorder
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Data(ConcretePath, Value),
    Status(ConcretePath, StatusCode),
    Items(ConcretePath, usize),
    Event(u64),
    Established(u32, u16),
    Resubscribing(u32),
    ReportEnd,
    Error(String),
    Done,
}

/// Records every callback a client makes.
#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Seen>>>);

impl Recorder {
    fn seen(&self) -> Vec<Seen> {
        self.0.lock().clone()
    }

    fn count(&self, wanted: &Seen) -> usize {
        self.0.lock().iter().filter(|s| *s == wanted).count()
    }

    fn reports(&self) -> usize {
        self.count(&Seen::ReportEnd)
    }

    fn established(&self) -> Option<(u32, u16)> {
        self.0.lock().iter().rev().find_map(|s| match s {
            Seen::Established(id, max) => Some((*id, *max)),
            _ => None,
        })
    }

    fn errors(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|s| match s {
                Seen::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ReadClientCallback for Recorder {
    fn on_attribute_data(
        &mut self,
        path: &ConcretePath,
        _data_version: Option<DataVersion>,
        data: Result<&Value, StatusCode>,
    ) {
        let seen = match data {
            Ok(value) => Seen::Data(*path, value.clone()),
            Err(status) => Seen::Status(*path, status),
        };
        self.0.lock().push(seen);
    }

    fn on_list_items(&mut self, path: &ConcretePath, count: usize) {
        self.0.lock().push(Seen::Items(*path, count));
    }

    fn on_event_data(&mut self, header: &im_reporting::client::EventHeader, _data: &Value) {
        self.0.lock().push(Seen::Event(header.event_number));
    }

    fn on_subscription_established(&mut self, subscription_id: u32, max_interval: u16) {
        self.0
            .lock()
            .push(Seen::Established(subscription_id, max_interval));
    }

    fn on_resubscription_attempt(&mut self, attempt: u32, _delay: Duration) {
        self.0.lock().push(Seen::Resubscribing(attempt));
    }

    fn on_report_end(&mut self) {
        self.0.lock().push(Seen::ReportEnd);
    }

    fn on_error(&mut self, error: &Error) {
        self.0.lock().push(Seen::Error(error.to_string()));
    }

    fn on_done(&mut self) {
        self.0.lock().push(Seen::Done);
    }
}

fn onoff_params() -> ReadParams {
    ReadParams::new().with_attribute(PathFilter::from(ONOFF))
}

fn status_of(message: &Message) -> StatusCode {
    assert_eq!(message.msg_type, MessageType::StatusResponse);
    message.decode::<StatusResponse>().unwrap().status
}

// ============================================================================
// Reads
// ============================================================================

mod read {
    use super::*;

    #[test]
    fn round_trip() {
        let mut pair = Pair::new(EngineConfig::default());
        let recorder = pair.read(onoff_params());

        assert_eq!(
            recorder.seen(),
            vec![Seen::Data(ONOFF, json!(true)), Seen::ReportEnd, Seen::Done]
        );
        assert_eq!(pair.publisher.num_active_read_handlers(), 0);
        assert_eq!(pair.publisher.in_flight_reports(), 0);
        assert_eq!(pair.subscriber.num_read_clients(), 0);
    }

    #[test]
    fn completion_is_published() {
        let mut pair = Pair::new(EngineConfig::default());
        let mut events = pair.publisher.subscribe_events();
        pair.read(onoff_params());

        let event = events.try_recv().unwrap();
        assert!(matches!(event, EngineEvent::ReadCompleted { chunks: 1, .. }));
    }

    #[test]
    fn large_list_is_chunked_within_payload_limit() {
        let max_payload = 400;
        let mut pair = Pair::new(EngineConfig::new().with_max_payload_size(max_payload));
        let items: Vec<Value> = (0..6)
            .map(|i| json!(format!("list-item-{i}-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx")))
            .collect();
        pair.model
            .set_attribute(EndpointId(1), ClusterId(0x1D), 0, Value::Array(items.clone()));
        let list = ConcretePath::new(EndpointId(1), ClusterId(0x1D), 0);

        let recorder = Recorder::default();
        pair.subscriber
            .send_read_request(
                pair.subscriber_session,
                ReadParams::new().with_attribute(PathFilter::from(list)),
                recorder.clone(),
            )
            .unwrap();

        let mut chunks: Vec<ReportData> = Vec::new();
        loop {
            let to_subscriber = pair.publisher_out.drain();
            let to_publisher = pair.subscriber_out.drain();
            if to_subscriber.is_empty() && to_publisher.is_empty() {
                break;
            }
            for (_, message) in to_subscriber {
                assert!(message.payload.len() <= max_payload);
                if message.msg_type == MessageType::ReportData {
                    chunks.push(message.decode().unwrap());
                }
                pair.subscriber
                    .on_message_received(pair.subscriber_session, message);
            }
            for (_, message) in to_publisher {
                pair.publisher
                    .on_message_received(pair.publisher_session, message);
            }
        }

        assert!(chunks.len() > 1, "list should span several messages");
        let (first, rest) = chunks.split_first().unwrap();
        match first.attribute_reports.as_slice() {
            [AttributeReportIB::Data(prefix)] => {
                assert_eq!(prefix.path.list_index, None);
                let count = prefix.data.as_array().map_or(0, Vec::len);
                assert!(count > 0 && count < items.len());
            }
            other => panic!("expected a single whole-list prefix, got {other:?}"),
        }
        for chunk in rest {
            assert!(!chunk.attribute_reports.is_empty());
            for report in &chunk.attribute_reports {
                let AttributeReportIB::Data(item) = report else {
                    panic!("expected list item data, got {report:?}");
                };
                assert_eq!(item.path.list_index, Some(ListIndex::Append));
            }
        }
        let more: Vec<bool> = chunks.iter().map(|c| c.more_chunked_messages).collect();
        let mut expected = vec![true; chunks.len() - 1];
        expected.push(false);
        assert_eq!(more, expected);
        let delivered: Vec<Value> = recorder
            .seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Data(_, Value::Array(prefix)) => Some(prefix),
                Seen::Data(path, value) if path.is_list_item() => Some(vec![value]),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(delivered, items);
        let counted: usize = recorder
            .seen()
            .iter()
            .filter_map(|s| match s {
                Seen::Items(_, n) => Some(*n),
                _ => None,
            })
            .sum();
        assert_eq!(counted, 6);
        assert_eq!(recorder.reports(), 1);
        assert_eq!(pair.publisher.in_flight_reports(), 0);
    }

    #[test]
    fn matching_data_version_suppresses_cluster() {
        let mut pair = Pair::new(EngineConfig::default());
        let version = pair
            .model
            .set_attribute(EndpointId(1), ClusterId(6), 0, json!(false));

        let recorder = pair.read(
            ReadParams::new()
                .with_attribute(PathFilter::cluster(EndpointId(1), ClusterId(6)))
                .with_data_version_filter(DataVersionFilter::new(
                    EndpointId(1),
                    ClusterId(6),
                    version,
                )),
        );
        assert_eq!(recorder.seen(), vec![Seen::ReportEnd, Seen::Done]);
    }

    #[test]
    fn stale_data_version_returns_data() {
        let mut pair = Pair::new(EngineConfig::default());
        let recorder = pair.read(
            onoff_params().with_data_version_filter(DataVersionFilter::new(
                EndpointId(1),
                ClusterId(6),
                9999,
            )),
        );
        assert_eq!(recorder.count(&Seen::Data(ONOFF, json!(true))), 1);
    }

    #[test]
    fn missing_endpoint_reports_status() {
        let mut pair = Pair::new(EngineConfig::default());
        let missing = ConcretePath::new(EndpointId(9), ClusterId(6), 0);
        let recorder = pair.read(ReadParams::new().with_attribute(PathFilter::from(missing)));
        assert_eq!(
            recorder.seen()[0],
            Seen::Status(missing, StatusCode::UnsupportedEndpoint)
        );
    }

    #[test]
    fn report_carrying_subscription_id_is_rejected() {
        let mut pair = Pair::new(EngineConfig::default());
        let recorder = Recorder::default();
        pair.subscriber
            .send_read_request(pair.subscriber_session, onoff_params(), recorder.clone())
            .unwrap();
        let (_, request) = pair.subscriber_out.drain().remove(0);

        let bogus = ReportData {
            subscription_id: Some(5),
            suppress_response: true,
            ..ReportData::default()
        };
        let report =
            Message::encode(request.exchange, false, MessageType::ReportData, &bogus).unwrap();
        pair.subscriber
            .on_message_received(pair.subscriber_session, report);

        let replies = pair.subscriber_out.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(status_of(&replies[0].1), StatusCode::InvalidAction);
        assert!(recorder.errors()[0].starts_with("invalid argument"));
        assert_eq!(recorder.seen().last(), Some(&Seen::Done));
        assert_eq!(pair.subscriber.num_read_clients(), 0);
    }

    #[test]
    fn empty_params_are_invalid_argument() {
        let mut pair = Pair::new(EngineConfig::default());
        let result =
            pair.subscriber
                .send_read_request(pair.subscriber_session, ReadParams::new(), Recorder::default());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(pair.subscriber_out.is_empty());
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

mod subscribe {
    use super::*;

    #[test]
    fn priming_establishes_subscription() {
        let mut pair = Pair::new(EngineConfig::default());
        let mut events = pair.publisher.subscribe_events();
        let (client, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 10), ResubscribePolicy::disabled());

        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Data(ONOFF, json!(true)),
                Seen::ReportEnd,
                Seen::Established(1, 10),
            ]
        );
        assert_eq!(pair.publisher.num_subscriptions(), 1);
        assert_eq!(pair.publisher.in_flight_reports(), 0);
        assert_eq!(
            pair.subscriber.client_state(client),
            Some(im_reporting::client::ClientState::Active)
        );
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::SubscriptionEstablished {
                subscription_id: 1,
                peer: SUBSCRIBER,
                max_interval: 10,
                ..
            }
        ));
    }

    #[test]
    fn dirty_path_is_reported_once() {
        let mut pair = Pair::new(EngineConfig::default());
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());

        pair.model
            .set_attribute(EndpointId(1), ClusterId(6), 0, json!(false));
        pair.publisher.set_dirty(PathFilter::from(ONOFF));
        pair.publisher.set_dirty(PathFilter::from(ONOFF));
        pair.advance(0);

        assert_eq!(recorder.count(&Seen::Data(ONOFF, json!(false))), 1);
        assert_eq!(recorder.reports(), 2);
        assert_eq!(pair.publisher.in_flight_reports(), 0);

        // Nothing new: no further report before the max interval.
        pair.advance(1);
        assert_eq!(recorder.reports(), 2);
    }

    #[test]
    fn dirty_path_waits_for_min_interval() {
        let mut pair = Pair::new(EngineConfig::default());
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(5, 60), ResubscribePolicy::disabled());

        pair.publisher.set_dirty(PathFilter::from(ONOFF));
        pair.advance(2);
        assert_eq!(recorder.reports(), 1);
        pair.advance(3);
        assert_eq!(recorder.reports(), 2);
    }

    #[test]
    fn unrelated_dirty_path_is_not_reported() {
        let mut pair = Pair::new(EngineConfig::default());
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());

        pair.publisher
            .set_dirty(PathFilter::cluster(EndpointId(2), ClusterId(6)));
        pair.advance(1);
        assert_eq!(recorder.reports(), 1);
    }

    #[test]
    fn empty_report_at_max_interval_keeps_subscription_alive() {
        let mut pair = Pair::new(EngineConfig::default());
        let (client, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 10), ResubscribePolicy::disabled());

        pair.advance(9);
        assert_eq!(recorder.reports(), 1);
        pair.advance(1);
        assert_eq!(recorder.reports(), 2);
        assert_eq!(recorder.count(&Seen::Data(ONOFF, json!(true))), 1);

        // Liveness is re-armed by every report.
        for _ in 0..5 {
            pair.advance(10);
        }
        assert_eq!(recorder.reports(), 7);
        assert!(recorder.errors().is_empty());
        assert_eq!(
            pair.subscriber.client_state(client),
            Some(im_reporting::client::ClientState::Active)
        );
    }

    #[test]
    fn icd_publisher_rounds_max_interval_to_idle_duration() {
        let mut pair = Pair::new(EngineConfig::new().with_idle_mode_duration(300));
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(305, 605), ResubscribePolicy::disabled());
        assert_eq!(recorder.established(), Some((1, 600)));
    }

    #[test]
    fn floor_above_ceiling_is_invalid_argument() {
        let mut pair = Pair::new(EngineConfig::default());
        let result = pair.subscriber.send_subscribe_request(
            pair.subscriber_session,
            onoff_params().with_intervals(20, 10),
            ResubscribePolicy::default(),
            Recorder::default(),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(pair.subscriber_out.is_empty());
    }

    #[test]
    fn new_subscription_replaces_old_unless_kept() {
        let mut pair = Pair::new(EngineConfig::default());
        pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());
        pair.subscribe(
            onoff_params()
                .with_intervals(0, 60)
                .with_keep_subscriptions(true),
            ResubscribePolicy::disabled(),
        );
        assert_eq!(pair.publisher.num_subscriptions(), 2);

        pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());
        assert_eq!(pair.publisher.num_subscriptions(), 1);
    }

    #[test]
    fn handler_pool_exhaustion_is_reported() {
        let mut pair = Pair::new(EngineConfig::new().with_max_read_handlers(1));
        pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());
        let (_, recorder) = pair.subscribe(
            onoff_params()
                .with_intervals(0, 60)
                .with_keep_subscriptions(true),
            ResubscribePolicy::disabled(),
        );

        assert_eq!(pair.publisher.num_subscriptions(), 1);
        assert_eq!(recorder.errors().len(), 1);
        assert!(recorder.errors()[0].contains("ResourceExhausted"));
        assert_eq!(recorder.seen().last(), Some(&Seen::Done));
    }

    #[test]
    fn urgent_event_bypasses_min_interval() {
        let mut pair = Pair::new(EngineConfig::default());
        let event_path = ConcretePath::new(EndpointId(1), ClusterId(0x3B), 1);
        let (_, recorder) = pair.subscribe(
            onoff_params()
                .with_urgent_event(PathFilter::cluster(EndpointId(1), ClusterId(0x3B)))
                .with_intervals(30, 60),
            ResubscribePolicy::disabled(),
        );

        let number = pair
            .publisher
            .log_event(Priority::Critical, event_path, &json!({"position": 1}), None)
            .unwrap();
        pair.advance(0);
        assert_eq!(recorder.count(&Seen::Event(number)), 1);
    }

    #[test]
    fn synchronized_scheduler_coalesces_reports() {
        let mut pair =
            Pair::new(EngineConfig::new().with_scheduler(SchedulerPolicy::Synchronized));
        let (_, fast) =
            pair.subscribe(onoff_params().with_intervals(0, 10), ResubscribePolicy::disabled());
        let (_, slow) = pair.subscribe(
            onoff_params()
                .with_intervals(0, 60)
                .with_keep_subscriptions(true),
            ResubscribePolicy::disabled(),
        );

        pair.advance(10);
        assert_eq!(fast.reports(), 2);
        assert_eq!(slow.reports(), 2);
    }

    #[test]
    fn independent_scheduler_does_not_coalesce() {
        let mut pair = Pair::new(EngineConfig::default());
        let (_, fast) =
            pair.subscribe(onoff_params().with_intervals(0, 10), ResubscribePolicy::disabled());
        let (_, slow) = pair.subscribe(
            onoff_params()
                .with_intervals(0, 60)
                .with_keep_subscriptions(true),
            ResubscribePolicy::disabled(),
        );

        pair.advance(10);
        assert_eq!(fast.reports(), 2);
        assert_eq!(slow.reports(), 1);
    }

    #[test]
    fn set_max_reporting_interval_moves_deadline() {
        let mut pair = Pair::new(EngineConfig::default());
        let mut events = pair.publisher.subscribe_events();
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());
        let Ok(EngineEvent::SubscriptionEstablished { handler, .. }) = events.try_recv() else {
            panic!("subscription not established");
        };

        pair.publisher.set_max_reporting_interval(handler, 20).unwrap();
        pair.advance(20);
        assert_eq!(recorder.reports(), 2);
    }
}

// ============================================================================
// Teardown and recovery
// ============================================================================

mod teardown {
    use super::*;

    #[test]
    fn defunct_session_drops_in_flight_report() {
        let mut pair = Pair::new(EngineConfig::default());
        let mut events = pair.publisher.subscribe_events();
        pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());
        let _ = events.try_recv();

        pair.publisher.set_dirty(PathFilter::from(ONOFF));
        pair.publisher.tick();
        assert_eq!(pair.publisher.in_flight_reports(), 1);

        pair.publisher.mark_session_defunct(pair.publisher_session);
        assert_eq!(pair.publisher.num_subscriptions(), 0);
        assert_eq!(pair.publisher.in_flight_reports(), 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::SubscriptionTerminated {
                reason: TerminationReason::SessionDefunct,
                ..
            }
        ));
    }

    #[test]
    fn failure_status_ends_handler_silently() {
        let mut pair = Pair::new(EngineConfig::default());
        pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::disabled());

        pair.publisher.set_dirty(PathFilter::from(ONOFF));
        pair.publisher.tick();
        let (_, report) = pair.publisher_out.drain().remove(0);
        let refusal = Message::status(report.exchange, false, StatusCode::Busy).unwrap();
        pair.publisher
            .on_message_received(pair.publisher_session, refusal);

        assert_eq!(pair.publisher.num_subscriptions(), 0);
        assert_eq!(pair.publisher.in_flight_reports(), 0);
        assert!(pair.publisher_out.is_empty());
    }

    #[test]
    fn liveness_timeout_triggers_resubscription() {
        let mut pair = Pair::new(EngineConfig::default());
        let policy = ResubscribePolicy::new().with_wait_step(Duration::from_secs(1));
        let (client, recorder) = pair.subscribe(onoff_params().with_intervals(0, 10), policy);
        assert_eq!(recorder.established(), Some((1, 10)));

        // The publisher forgets the subscription without telling anyone.
        pair.publisher.shutdown_subscription(SUBSCRIBER, 1).unwrap();
        assert_eq!(pair.publisher.num_subscriptions(), 0);

        // Max interval plus the default liveness margin.
        pair.advance(20);
        assert_eq!(recorder.count(&Seen::Resubscribing(1)), 1);
        assert_eq!(recorder.errors().len(), 1);

        pair.advance(1);
        assert_eq!(recorder.established(), Some((2, 10)));
        assert_eq!(pair.publisher.num_subscriptions(), 1);
        assert_eq!(pair.subscriber.client(client).map(|c| c.attempt()), Some(0));
        assert!(!recorder.seen().contains(&Seen::Done));
    }

    #[test]
    fn cancelled_resubscription_finishes_client() {
        let mut pair = Pair::new(EngineConfig::default());
        let policy = ResubscribePolicy::new().with_wait_step(Duration::from_secs(5));
        let (client, recorder) = pair.subscribe(onoff_params().with_intervals(0, 10), policy);

        pair.subscriber.mark_session_defunct(pair.subscriber_session);
        assert_eq!(recorder.count(&Seen::Resubscribing(1)), 1);

        pair.subscriber.cancel_resubscription(client).unwrap();
        assert_eq!(recorder.errors().last().map(String::as_str), Some("resubscription cancelled"));
        assert_eq!(recorder.seen().last(), Some(&Seen::Done));
        assert_eq!(pair.subscriber.num_read_clients(), 0);
    }

    #[test]
    fn fabric_removal_tears_down_both_sides() {
        let mut pair = Pair::new(EngineConfig::default());
        let (_, recorder) =
            pair.subscribe(onoff_params().with_intervals(0, 60), ResubscribePolicy::default());

        pair.publisher.remove_fabric(SUBSCRIBER.fabric_index);
        assert_eq!(pair.publisher.num_subscriptions(), 0);

        pair.subscriber.remove_fabric(PUBLISHER.fabric_index);
        assert_eq!(pair.subscriber.num_read_clients(), 0);
        assert_eq!(recorder.seen().last(), Some(&Seen::Done));
        assert_eq!(recorder.count(&Seen::Resubscribing(1)), 0);
    }

    #[test]
    fn unknown_subscription_shutdown_is_error() {
        let mut pair = Pair::new(EngineConfig::default());
        let result = pair.publisher.shutdown_subscription(SUBSCRIBER, 42);
        assert!(matches!(result, Err(Error::HandlerNotFound)));
    }
}

// ============================================================================
// Protocol errors
// ============================================================================

mod protocol {
    use super::*;

    #[test]
    fn unexpected_message_gets_invalid_action() {
        let mut pair = Pair::new(EngineConfig::default());
        let write =
            Message::encode(ExchangeId(9), true, MessageType::WriteRequest, &json!({})).unwrap();
        pair.publisher
            .on_message_received(pair.publisher_session, write);

        let replies = pair.publisher_out.drain();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.exchange, ExchangeId(9));
        assert!(!replies[0].1.from_initiator);
        assert_eq!(status_of(&replies[0].1), StatusCode::InvalidAction);
    }

    #[test]
    fn stray_status_is_not_answered() {
        let mut pair = Pair::new(EngineConfig::default());
        let status = Message::status(ExchangeId(3), true, StatusCode::Success).unwrap();
        pair.publisher
            .on_message_received(pair.publisher_session, status);
        assert!(pair.publisher_out.is_empty());
    }

    #[test]
    fn malformed_request_gets_invalid_action() {
        let mut pair = Pair::new(EngineConfig::default());
        let empty = Message::encode(
            ExchangeId(4),
            true,
            MessageType::ReadRequest,
            &ReadRequest::default(),
        )
        .unwrap();
        pair.publisher
            .on_message_received(pair.publisher_session, empty);

        let replies = pair.publisher_out.drain();
        assert_eq!(status_of(&replies[0].1), StatusCode::InvalidAction);
        assert_eq!(pair.publisher.num_active_read_handlers(), 0);
    }

    #[test]
    fn unsolicited_report_for_unknown_subscription() {
        let mut pair = Pair::new(EngineConfig::default());
        let report = ReportData {
            subscription_id: Some(77),
            ..ReportData::default()
        };
        let message = Message::encode(ExchangeId(5), true, MessageType::ReportData, &report).unwrap();
        pair.subscriber
            .on_message_received(pair.subscriber_session, message);

        let replies = pair.subscriber_out.drain();
        assert_eq!(status_of(&replies[0].1), StatusCode::InvalidSubscription);
    }

    #[test]
    fn messages_on_defunct_session_are_dropped() {
        let mut pair = Pair::new(EngineConfig::default());
        pair.publisher.mark_session_defunct(pair.publisher_session);
        let write =
            Message::encode(ExchangeId(9), true, MessageType::WriteRequest, &json!({})).unwrap();
        pair.publisher
            .on_message_received(pair.publisher_session, write);
        assert!(pair.publisher_out.is_empty());
    }
}
