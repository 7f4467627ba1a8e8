// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Chunked report generation.
//!
//! A [`ReportTransaction`] is one logical report, possibly spread over
//! several messages. Each call to [`ReportTransaction::build_chunk`]
//! re-resolves the transaction's filters against the data model, skips
//! whatever an earlier chunk already emitted (per the resume cursor) and
//! fills one message up to the payload limit: attributes first, in
//! enumeration order, then events in event-number order.
//!
//! A list attribute too large for a message on its own is split: the first
//! part is reported as a whole-list value holding as many items as fit, and
//! each remaining item follows as a separate append element.

mod builder;
mod cursor;

use serde_json::Value;

use crate::data_model::{Candidate, DataModel, expand_attributes};
use crate::error::ParseError;
use crate::event_log::{CursorItem, EventCursor, EventLog, EventRecord, Priority};
use crate::interest::InterestRegistry;
use crate::message::ib::{
    AttributeDataIB, AttributeReportIB, AttributeStatusIB, EventDataIB, EventInterest, EventPathIB,
    EventReportIB,
};
use crate::message::{ReportData, StatusCode};
use crate::path::{ClusterId, ConcretePath, DataVersionFilter, EndpointId, FabricIndex, ListIndex, PathFilter};
use builder::ReportBuilder;
use cursor::{CandidateKey, Resume};

/// Everything a transaction reads from outside the handler.
pub(crate) struct Sources<'a> {
    pub(crate) model: &'a dyn DataModel,
    pub(crate) registry: &'a InterestRegistry,
    pub(crate) event_log: &'a EventLog,
    pub(crate) max_payload: usize,
}

/// The handler-specific inputs of a chunk.
pub(crate) struct ReportScope<'a> {
    pub(crate) subscription_id: Option<u32>,
    /// Generation the handler last reported up to.
    pub(crate) since_generation: u64,
    pub(crate) data_version_filters: &'a [DataVersionFilter],
    pub(crate) event_interests: &'a [EventInterest],
    /// Requester's fabric when the request was fabric filtered.
    pub(crate) fabric_filter: Option<FabricIndex>,
}

/// Returns `true` if `record` is wanted by `interests` under the fabric filter.
pub(crate) fn event_wanted(
    record: &EventRecord,
    interests: &[EventInterest],
    fabric_filter: Option<FabricIndex>,
) -> bool {
    interests.iter().any(|i| i.filter.matches(&record.path))
        && fabric_filter.is_none_or(|fabric| record.fabric_index.is_none_or(|f| f == fabric))
}

enum Step {
    /// The candidate is fully emitted.
    Done,
    /// A list was cut before `next_item`.
    Partial(usize),
    /// Nothing was emitted; the message is full.
    Full,
}

/// State of one logical report across its chunks.
#[derive(Debug)]
pub(crate) struct ReportTransaction {
    snapshot_generation: u64,
    priming: bool,
    filters: Vec<PathFilter>,
    resume: Resume,
    attributes_done: bool,
    events: EventCursor,
    event_limit: u64,
    held_event: Option<EventRecord>,
    events_done: bool,
    chunks: u32,
}

impl ReportTransaction {
    /// Starts a transaction.
    ///
    /// `filters` are the attribute filters to report; a priming report passes
    /// the handler's whole interest, later reports only what is dirty.
    /// Events numbered `event_from` up to (excluding) the log's next number
    /// are included.
    pub(crate) fn new(
        filters: Vec<PathFilter>,
        priming: bool,
        registry: &InterestRegistry,
        event_log: &EventLog,
        event_from: u64,
        wants_events: bool,
    ) -> Self {
        Self {
            snapshot_generation: registry.current_generation(),
            priming,
            filters,
            resume: Resume::Start,
            attributes_done: false,
            events: event_log.events_since(event_from, Priority::Debug),
            event_limit: event_log.next_event_number(),
            held_event: None,
            events_done: !wants_events,
            chunks: 0,
        }
    }

    /// Dirty generation this transaction covers once complete.
    pub(crate) fn snapshot_generation(&self) -> u64 {
        self.snapshot_generation
    }

    /// First event number not covered by this transaction.
    pub(crate) fn event_limit(&self) -> u64 {
        self.event_limit
    }

    pub(crate) fn is_priming(&self) -> bool {
        self.priming
    }

    /// Number of chunks built so far.
    pub(crate) fn chunks(&self) -> u32 {
        self.chunks
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.attributes_done && self.events_done && self.held_event.is_none()
    }

    /// Reacts to a dirty mark made while the transaction is running.
    ///
    /// If the mark touches the cluster being emitted, that cluster restarts
    /// from its first attribute so the rest of the report carries the new
    /// values.
    pub(crate) fn on_dirty(&mut self, filter: &PathFilter) {
        if !self.attributes_done && self.resume.rewind_if_touched(filter) {
            tracing::trace!(?filter, "Dirty mark rewinds report to cluster start");
        }
    }

    /// Builds the next message of the transaction.
    ///
    /// `more_chunked_messages` is set when the transaction needs another call.
    pub(crate) fn build_chunk(
        &mut self,
        scope: &ReportScope<'_>,
        sources: &Sources<'_>,
    ) -> Result<ReportData, ParseError> {
        let mut builder = ReportBuilder::new(scope.subscription_id, sources.max_payload)?;
        let mut full = false;

        if !self.attributes_done {
            full = self.fill_attributes(&mut builder, scope, sources)?;
            self.attributes_done = !full;
        }
        if !full && !self.events_done {
            full = self.fill_events(&mut builder, scope, sources)?;
        }

        self.chunks += 1;
        let more = !self.is_complete();
        tracing::trace!(chunk = self.chunks, more, "Built report chunk");
        Ok(builder.finish(more, false))
    }

    fn candidates(&self, model: &dyn DataModel) -> Vec<(CandidateKey, Candidate)> {
        let mut candidates: Vec<(CandidateKey, Candidate)> = self
            .filters
            .iter()
            .flat_map(|filter| expand_attributes(model, filter))
            .filter(|c| self.priming || matches!(c, Candidate::Attribute(_)))
            .map(|c| (CandidateKey::of(c.path()), c))
            .collect();
        candidates.sort_by_key(|(key, _)| *key);
        candidates.dedup_by_key(|(key, _)| *key);
        candidates
    }

    /// Returns `true` if the message filled up before every attribute was emitted.
    fn fill_attributes(
        &mut self,
        builder: &mut ReportBuilder,
        scope: &ReportScope<'_>,
        sources: &Sources<'_>,
    ) -> Result<bool, ParseError> {
        for (key, candidate) in self.candidates(sources.model) {
            if !self.resume.admits(&key) {
                continue;
            }
            let (endpoint, cluster) = key.cluster();
            if self.priming && version_suppressed(endpoint, cluster, scope, sources) {
                tracing::trace!(%endpoint, %cluster, "Cluster suppressed by data version filter");
                self.resume = Resume::After(key);
                continue;
            }

            let step = match candidate {
                Candidate::Missing(path, status) => emit_status(builder, path, status)?,
                Candidate::Attribute(path) => self.emit_attribute(key, &path, builder, sources)?,
            };

            match step {
                Step::Done => self.resume = Resume::After(key),
                Step::Partial(next_item) => {
                    self.resume = Resume::Within { key, next_item };
                    return Ok(true);
                }
                Step::Full => return Ok(true),
            }
        }
        Ok(false)
    }

    fn emit_attribute(
        &self,
        key: CandidateKey,
        path: &ConcretePath,
        builder: &mut ReportBuilder,
        sources: &Sources<'_>,
    ) -> Result<Step, ParseError> {
        let data_version = sources.model.data_version(path.endpoint, path.cluster);
        let value = match sources.model.read_attribute(path) {
            Ok(value) => value,
            Err(status) => return emit_status(builder, *path, status),
        };

        if let Resume::Within { key: cut, next_item } = self.resume
            && cut == key
        {
            return emit_remaining_items(path, data_version, value, next_item, builder);
        }

        let ib = AttributeReportIB::Data(AttributeDataIB {
            data_version,
            path: (*path).into(),
            data: value,
        });
        let Some(AttributeReportIB::Data(data)) = builder.push_attribute(ib)? else {
            return Ok(Step::Done);
        };
        if !builder.is_empty() {
            return Ok(Step::Full);
        }

        let total = data.data.as_array().map(Vec::len);
        if let Some(total) = total
            && path.list_index.is_none()
            && let Some(count) = builder.push_list_prefix(data)?
        {
            tracing::trace!(%path, count, total, "Split list attribute across chunks");
            return Ok(if count < total {
                Step::Partial(count)
            } else {
                Step::Done
            });
        }

        tracing::warn!(%path, "Attribute does not fit in an empty message");
        push_status(builder, *path, StatusCode::ResourceExhausted)?;
        Ok(Step::Done)
    }

    /// Returns `true` if the message filled up before every event was emitted.
    fn fill_events(
        &mut self,
        builder: &mut ReportBuilder,
        scope: &ReportScope<'_>,
        sources: &Sources<'_>,
    ) -> Result<bool, ParseError> {
        loop {
            let record = match self.held_event.take() {
                Some(record) => record,
                None => match self.events.next(sources.event_log) {
                    None => break,
                    Some(CursorItem::Gap { .. }) => continue,
                    Some(CursorItem::Event(record)) => record,
                },
            };
            if record.number >= self.event_limit {
                break;
            }
            if !event_wanted(&record, scope.event_interests, scope.fabric_filter) {
                continue;
            }

            let ib = EventReportIB::Data(EventDataIB {
                path: EventPathIB::from(record.path),
                event_number: record.number,
                priority: record.priority,
                timestamp: record.timestamp,
                fabric_index: record.fabric_index,
                data: record.data()?,
            });
            if builder.push_event(ib)?.is_some() {
                if builder.is_empty() {
                    tracing::warn!(number = record.number, "Event does not fit in an empty message, skipped");
                    continue;
                }
                self.held_event = Some(record);
                return Ok(true);
            }
        }
        self.events_done = true;
        Ok(false)
    }
}

fn version_suppressed(
    endpoint: EndpointId,
    cluster: ClusterId,
    scope: &ReportScope<'_>,
    sources: &Sources<'_>,
) -> bool {
    let live = sources.model.data_version(endpoint, cluster);
    scope
        .data_version_filters
        .iter()
        .any(|f| f.applies_to(endpoint, cluster) && live == Some(f.data_version))
        && !sources
            .registry
            .is_cluster_dirty(scope.since_generation, endpoint, cluster)
}

fn push_status(
    builder: &mut ReportBuilder,
    path: ConcretePath,
    status: StatusCode,
) -> Result<bool, ParseError> {
    let ib = AttributeReportIB::Status(AttributeStatusIB {
        path: path.into(),
        status,
    });
    Ok(builder.push_attribute(ib)?.is_none())
}

/// Pushes a status, dropping it when not even an empty message can hold it.
fn emit_status(
    builder: &mut ReportBuilder,
    path: ConcretePath,
    status: StatusCode,
) -> Result<Step, ParseError> {
    if push_status(builder, path, status)? {
        return Ok(Step::Done);
    }
    if builder.is_empty() {
        tracing::warn!(%path, ?status, "Status does not fit in an empty message, dropped");
        return Ok(Step::Done);
    }
    Ok(Step::Full)
}

/// Smallest payload limit under which every report can make progress.
///
/// This is the widest report envelope carrying the widest attribute status.
pub(crate) fn minimum_payload_size() -> Result<usize, ParseError> {
    let widest = ConcretePath::new(EndpointId(u16::MAX), ClusterId(u32::MAX), u32::MAX)
        .with_list_index(ListIndex::Item(u16::MAX));
    let mut largest = 0;
    for status in [
        StatusCode::UnsupportedEndpoint,
        StatusCode::UnsupportedCluster,
        StatusCode::UnsupportedAttribute,
        StatusCode::UnsupportedAccess,
        StatusCode::ResourceExhausted,
    ] {
        let mut builder = ReportBuilder::new(Some(u32::MAX), usize::MAX)?;
        push_status(&mut builder, widest, status)?;
        largest = largest.max(builder.used());
    }
    Ok(largest)
}

fn emit_remaining_items(
    path: &ConcretePath,
    data_version: Option<crate::path::DataVersion>,
    value: Value,
    next_item: usize,
    builder: &mut ReportBuilder,
) -> Result<Step, ParseError> {
    let Value::Array(items) = value else {
        return Ok(Step::Done);
    };
    let element = path.with_list_index(ListIndex::Append);
    for (index, item) in items.into_iter().enumerate().skip(next_item) {
        let ib = AttributeReportIB::Data(AttributeDataIB {
            data_version,
            path: element.into(),
            data: item,
        });
        if builder.push_attribute(ib)?.is_some() {
            if !builder.is_empty() {
                return Ok(Step::Partial(index));
            }
            tracing::warn!(%path, index, "List item does not fit in an empty message");
            push_status(builder, element, StatusCode::ResourceExhausted)?;
        }
    }
    Ok(Step::Done)
}
