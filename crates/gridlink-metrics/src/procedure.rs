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

use serde::Serialize;

/// Number of latency histogram buckets per procedure.
pub const LATENCY_BUCKET_COUNT: usize = 20;

/// Width of each histogram bucket in milliseconds. The last bucket is a
/// catch-all for everything at or beyond `(COUNT - 1) * WIDTH` ms.
pub const LATENCY_BUCKET_WIDTH_MS: i32 = 10;

/// Per-procedure statistics for one connection.
///
/// Round trips are tracked twice: as observed by the client (queue to
/// callback) and as reported by the cluster. Each counter has a shadow copy
/// holding its value at the previous interval snapshot.
#[derive(Debug)]
pub struct ProcedureStats {
    name: String,

    invocations_completed: u64,
    last_invocations_completed: u64,
    invocation_aborts: u64,
    last_invocation_aborts: u64,
    invocation_errors: u64,
    last_invocation_errors: u64,

    // cumulative latency measured by the client, used to compute averages
    round_trip_time_ms: u64,
    last_round_trip_time_ms: u64,
    min_round_trip_ms: i32,
    max_round_trip_ms: i32,
    last_min_round_trip_ms: i32,
    last_max_round_trip_ms: i32,

    // cumulative latency measured by the cluster
    cluster_round_trip_time_ms: u64,
    last_cluster_round_trip_time_ms: u64,
    min_cluster_round_trip_ms: i32,
    max_cluster_round_trip_ms: i32,
    last_min_cluster_round_trip_ms: i32,
    last_max_cluster_round_trip_ms: i32,

    round_trip_buckets: [u64; LATENCY_BUCKET_COUNT],
    last_round_trip_buckets: [u64; LATENCY_BUCKET_COUNT],
    cluster_round_trip_buckets: [u64; LATENCY_BUCKET_COUNT],
    last_cluster_round_trip_buckets: [u64; LATENCY_BUCKET_COUNT],
}

/// One row of procedure statistics, either lifetime or per-interval.
#[derive(Debug, Clone, Serialize)]
pub struct ProcedureStatsSnapshot {
    pub procedure: String,
    pub invocations_completed: u64,
    pub invocations_aborted: u64,
    pub invocations_errored: u64,
    pub round_trip_avg_ms: i32,
    pub round_trip_min_ms: i32,
    pub round_trip_max_ms: i32,
    pub cluster_round_trip_avg_ms: i32,
    pub cluster_round_trip_min_ms: i32,
    pub cluster_round_trip_max_ms: i32,
}

impl ProcedureStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations_completed: 0,
            last_invocations_completed: 0,
            invocation_aborts: 0,
            last_invocation_aborts: 0,
            invocation_errors: 0,
            last_invocation_errors: 0,
            round_trip_time_ms: 0,
            last_round_trip_time_ms: 0,
            min_round_trip_ms: i32::MAX,
            max_round_trip_ms: i32::MIN,
            last_min_round_trip_ms: i32::MAX,
            last_max_round_trip_ms: i32::MIN,
            cluster_round_trip_time_ms: 0,
            last_cluster_round_trip_time_ms: 0,
            min_cluster_round_trip_ms: i32::MAX,
            max_cluster_round_trip_ms: i32::MIN,
            last_min_cluster_round_trip_ms: i32::MAX,
            last_max_cluster_round_trip_ms: i32::MIN,
            round_trip_buckets: [0; LATENCY_BUCKET_COUNT],
            last_round_trip_buckets: [0; LATENCY_BUCKET_COUNT],
            cluster_round_trip_buckets: [0; LATENCY_BUCKET_COUNT],
            last_cluster_round_trip_buckets: [0; LATENCY_BUCKET_COUNT],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one completed invocation.
    ///
    /// `abort` marks transaction aborts (user abort / graceful failure),
    /// `error` marks every other non-success status; the two are mutually
    /// exclusive.
    pub fn record(&mut self, round_trip_ms: i32, cluster_round_trip_ms: i32, abort: bool, error: bool) {
        self.invocations_completed += 1;
        if abort {
            self.invocation_aborts += 1;
        }
        if error {
            self.invocation_errors += 1;
        }

        self.round_trip_time_ms += round_trip_ms.max(0) as u64;
        self.min_round_trip_ms = self.min_round_trip_ms.min(round_trip_ms);
        self.max_round_trip_ms = self.max_round_trip_ms.max(round_trip_ms);
        self.last_min_round_trip_ms = self.last_min_round_trip_ms.min(round_trip_ms);
        self.last_max_round_trip_ms = self.last_max_round_trip_ms.max(round_trip_ms);

        self.cluster_round_trip_time_ms += cluster_round_trip_ms.max(0) as u64;
        self.min_cluster_round_trip_ms = self.min_cluster_round_trip_ms.min(cluster_round_trip_ms);
        self.max_cluster_round_trip_ms = self.max_cluster_round_trip_ms.max(cluster_round_trip_ms);
        self.last_min_cluster_round_trip_ms = self.last_min_cluster_round_trip_ms.min(cluster_round_trip_ms);
        self.last_max_cluster_round_trip_ms = self.last_max_cluster_round_trip_ms.max(cluster_round_trip_ms);

        self.round_trip_buckets[bucket_for(round_trip_ms)] += 1;
        self.cluster_round_trip_buckets[bucket_for(cluster_round_trip_ms)] += 1;
    }

    /// Produce one snapshot row.
    ///
    /// With `interval` set, values are deltas since the previous interval
    /// snapshot and the shadows are reset; a window with no completed
    /// invocations yields `None` so pollers can skip the row entirely.
    pub fn snapshot(&mut self, interval: bool) -> Option<ProcedureStatsSnapshot> {
        if !interval {
            return Some(ProcedureStatsSnapshot {
                procedure: self.name.clone(),
                invocations_completed: self.invocations_completed,
                invocations_aborted: self.invocation_aborts,
                invocations_errored: self.invocation_errors,
                round_trip_avg_ms: avg(self.round_trip_time_ms, self.invocations_completed),
                round_trip_min_ms: self.min_round_trip_ms,
                round_trip_max_ms: self.max_round_trip_ms,
                cluster_round_trip_avg_ms: avg(self.cluster_round_trip_time_ms, self.invocations_completed),
                cluster_round_trip_min_ms: self.min_cluster_round_trip_ms,
                cluster_round_trip_max_ms: self.max_cluster_round_trip_ms,
            });
        }

        let completed = self.invocations_completed - self.last_invocations_completed;
        if completed == 0 {
            return None;
        }
        self.last_invocations_completed = self.invocations_completed;

        let aborted = self.invocation_aborts - self.last_invocation_aborts;
        self.last_invocation_aborts = self.invocation_aborts;

        let errored = self.invocation_errors - self.last_invocation_errors;
        self.last_invocation_errors = self.invocation_errors;

        let round_trip = self.round_trip_time_ms - self.last_round_trip_time_ms;
        self.last_round_trip_time_ms = self.round_trip_time_ms;

        let cluster_round_trip = self.cluster_round_trip_time_ms - self.last_cluster_round_trip_time_ms;
        self.last_cluster_round_trip_time_ms = self.cluster_round_trip_time_ms;

        let snapshot = ProcedureStatsSnapshot {
            procedure: self.name.clone(),
            invocations_completed: completed,
            invocations_aborted: aborted,
            invocations_errored: errored,
            round_trip_avg_ms: avg(round_trip, completed),
            round_trip_min_ms: self.last_min_round_trip_ms,
            round_trip_max_ms: self.last_max_round_trip_ms,
            cluster_round_trip_avg_ms: avg(cluster_round_trip, completed),
            cluster_round_trip_min_ms: self.last_min_cluster_round_trip_ms,
            cluster_round_trip_max_ms: self.last_max_cluster_round_trip_ms,
        };

        self.last_min_round_trip_ms = i32::MAX;
        self.last_max_round_trip_ms = i32::MIN;
        self.last_min_cluster_round_trip_ms = i32::MAX;
        self.last_max_cluster_round_trip_ms = i32::MIN;

        Some(snapshot)
    }

    /// Histogram buckets for either the client or the cluster round trip.
    /// Interval semantics match [`ProcedureStats::snapshot`].
    pub fn bucket_snapshot(&mut self, client_round_trip: bool, interval: bool) -> [u64; LATENCY_BUCKET_COUNT] {
        let (buckets, shadow) = if client_round_trip {
            (&self.round_trip_buckets, &mut self.last_round_trip_buckets)
        } else {
            (&self.cluster_round_trip_buckets, &mut self.last_cluster_round_trip_buckets)
        };

        if !interval {
            return *buckets;
        }

        let mut delta = [0u64; LATENCY_BUCKET_COUNT];
        for i in 0..LATENCY_BUCKET_COUNT {
            delta[i] = buckets[i] - shadow[i];
            shadow[i] = buckets[i];
        }
        delta
    }
}

fn bucket_for(latency_ms: i32) -> usize {
    let bucket = latency_ms.max(0) / LATENCY_BUCKET_WIDTH_MS;
    (bucket as usize).min(LATENCY_BUCKET_COUNT - 1)
}

fn avg(total_ms: u64, count: u64) -> i32 {
    if count == 0 {
        return 0;
    }
    (total_ms / count) as i32
}
