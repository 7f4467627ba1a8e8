// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Size-bounded assembly of one `ReportData` message.
//!
//! The encoded size of a report is its empty envelope plus each element's
//! own encoding plus one separator between neighbours, so the builder can
//! track the exact size without re-encoding the whole message. The envelope
//! is measured with both flags `false`, which is the longest spelling.

use serde_json::Value;

use crate::error::ParseError;
use crate::message::ReportData;
use crate::message::codec;
use crate::message::ib::{AttributeDataIB, AttributeReportIB, EventReportIB};

#[derive(Debug)]
pub(crate) struct ReportBuilder {
    report: ReportData,
    used: usize,
    budget: usize,
}

impl ReportBuilder {
    pub(crate) fn new(subscription_id: Option<u32>, budget: usize) -> Result<Self, ParseError> {
        let report = ReportData {
            subscription_id,
            ..ReportData::default()
        };
        let used = codec::encoded_len(&report)?;
        Ok(Self {
            report,
            used,
            budget,
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.report.attribute_reports.is_empty() && self.report.event_reports.is_empty()
    }

    /// Appends `ib` if it fits; hands it back otherwise.
    pub(crate) fn push_attribute(
        &mut self,
        ib: AttributeReportIB,
    ) -> Result<Option<AttributeReportIB>, ParseError> {
        let cost = codec::encoded_len(&ib)? + usize::from(!self.report.attribute_reports.is_empty());
        if self.used + cost > self.budget {
            return Ok(Some(ib));
        }
        self.used += cost;
        self.report.attribute_reports.push(ib);
        Ok(None)
    }

    /// Appends `ib` if it fits; hands it back otherwise.
    pub(crate) fn push_event(
        &mut self,
        ib: EventReportIB,
    ) -> Result<Option<EventReportIB>, ParseError> {
        let cost = codec::encoded_len(&ib)? + usize::from(!self.report.event_reports.is_empty());
        if self.used + cost > self.budget {
            return Ok(Some(ib));
        }
        self.used += cost;
        self.report.event_reports.push(ib);
        Ok(None)
    }

    /// Appends the longest prefix of a list value that fits, as a whole-list
    /// report. Returns how many items went in, or `None` if not even the
    /// empty list fits.
    pub(crate) fn push_list_prefix(
        &mut self,
        mut data: AttributeDataIB,
    ) -> Result<Option<usize>, ParseError> {
        let Value::Array(items) = std::mem::take(&mut data.data) else {
            return Ok(None);
        };
        data.data = Value::Array(Vec::new());

        let separator = usize::from(!self.report.attribute_reports.is_empty());
        let mut total =
            self.used + separator + codec::encoded_len(&AttributeReportIB::Data(data.clone()))?;
        if total > self.budget {
            return Ok(None);
        }

        let mut count = 0;
        for item in &items {
            let cost = codec::encoded_len(item)? + usize::from(count > 0);
            if total + cost > self.budget {
                break;
            }
            total += cost;
            count += 1;
        }

        data.data = Value::Array(items.into_iter().take(count).collect());
        self.used = total;
        self.report.attribute_reports.push(AttributeReportIB::Data(data));
        Ok(Some(count))
    }

    pub(crate) fn finish(mut self, more_chunked_messages: bool, suppress_response: bool) -> ReportData {
        self.report.more_chunked_messages = more_chunked_messages;
        self.report.suppress_response = suppress_response;
        self.report
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }
}
