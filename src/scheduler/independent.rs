// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tokio::time::Instant;

use super::{NodeTable, Readiness, ReportScheduler};
use crate::handler::HandlerId;

/// Evaluates every subscription on its own deadlines.
#[derive(Debug, Default)]
pub struct IndependentScheduler {
    nodes: NodeTable,
}

impl IndependentScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportScheduler for IndependentScheduler {
    fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    fn nodes_mut(&mut self) -> &mut NodeTable {
        &mut self.nodes
    }

    fn reportable(&self, now: Instant, candidates: &[Readiness]) -> Vec<HandlerId> {
        self.nodes.fired(now, candidates).map(|r| r.handler).collect()
    }
}
