// Copyright 2025 GridLink Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! GridLink Statistics Accounting
//!
//! This crate holds the statistics primitives the GridLink client keeps per
//! connection: invocation counters and per-procedure latency accounting.
//!
//! # Architecture
//!
//! - [`ProcedureStats`]: per-procedure counts, cumulative and min/max round
//!   trips (client-observed and cluster-reported), and two fixed-width
//!   latency histograms
//! - [`InvocationCounters`]: connection-level completed/aborted/errored
//!   counters
//!
//! Every metric carries a shadow "last interval" copy; snapshotting with
//! `interval = true` reports the delta since the previous interval snapshot
//! and resets the shadow, so a periodic poller sees per-window numbers
//! while ad-hoc callers still get lifetime totals.
//!
//! # Thread Safety
//!
//! These types are deliberately plain data: the client updates them under
//! its per-connection lock, so no internal synchronization is needed here.

mod counters;
mod procedure;

pub use counters::{InvocationCounters, InvocationTotals};
pub use procedure::{
    ProcedureStats, ProcedureStatsSnapshot, LATENCY_BUCKET_COUNT, LATENCY_BUCKET_WIDTH_MS,
};
