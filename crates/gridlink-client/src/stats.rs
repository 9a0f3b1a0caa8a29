//! Statistics table assembly.
//!
//! Three tabular views aggregated across the pool, each with a fixed column
//! order. With `interval` set, every view reports deltas since its previous
//! interval snapshot and resets the shadow counters; the procedure and
//! histogram views skip rows with no invocations in the window. The pool is
//! snapshotted under the pool lock and each connection is then visited under
//! its own lock, so the two are never held together.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gridlink_common::transport::{IoStats, Reactor, GLOBAL_STATS_ID};
use gridlink_common::{ColumnInfo, ColumnType, ColumnValue, Result, ResultTable};
use gridlink_metrics::{InvocationTotals, LATENCY_BUCKET_COUNT, LATENCY_BUCKET_WIDTH_MS};

use crate::connection::NodeConnection;
use crate::distributor::Shared;

fn header_columns() -> Vec<ColumnInfo> {
    vec![
        ColumnInfo::new("TIMESTAMP", ColumnType::BigInt),
        ColumnInfo::new("HOSTNAME", ColumnType::String),
        ColumnInfo::new("CONNECTION_ID", ColumnType::BigInt),
        ColumnInfo::new("SERVER_HOST_ID", ColumnType::BigInt),
        ColumnInfo::new("SERVER_HOSTNAME", ColumnType::String),
        ColumnInfo::new("SERVER_CONNECTION_ID", ColumnType::BigInt),
    ]
}

fn connection_stats_columns() -> Vec<ColumnInfo> {
    let mut columns = header_columns();
    columns.extend([
        ColumnInfo::new("INVOCATIONS_COMPLETED", ColumnType::BigInt),
        ColumnInfo::new("INVOCATIONS_ABORTED", ColumnType::BigInt),
        ColumnInfo::new("INVOCATIONS_FAILED", ColumnType::BigInt),
        ColumnInfo::new("BYTES_READ", ColumnType::BigInt),
        ColumnInfo::new("MESSAGES_READ", ColumnType::BigInt),
        ColumnInfo::new("BYTES_WRITTEN", ColumnType::BigInt),
        ColumnInfo::new("MESSAGES_WRITTEN", ColumnType::BigInt),
    ]);
    columns
}

fn procedure_stats_columns() -> Vec<ColumnInfo> {
    let mut columns = header_columns();
    columns.extend([
        ColumnInfo::new("PROCEDURE_NAME", ColumnType::String),
        ColumnInfo::new("ROUNDTRIPTIME_AVG", ColumnType::Integer),
        ColumnInfo::new("ROUNDTRIPTIME_MIN", ColumnType::Integer),
        ColumnInfo::new("ROUNDTRIPTIME_MAX", ColumnType::Integer),
        ColumnInfo::new("CLUSTER_ROUNDTRIPTIME_AVG", ColumnType::Integer),
        ColumnInfo::new("CLUSTER_ROUNDTRIPTIME_MIN", ColumnType::Integer),
        ColumnInfo::new("CLUSTER_ROUNDTRIPTIME_MAX", ColumnType::Integer),
        ColumnInfo::new("INVOCATIONS_COMPLETED", ColumnType::BigInt),
        ColumnInfo::new("INVOCATIONS_ABORTED", ColumnType::BigInt),
        ColumnInfo::new("INVOCATIONS_FAILED", ColumnType::BigInt),
    ]);
    columns
}

fn histogram_columns() -> Vec<ColumnInfo> {
    let mut columns = header_columns();
    columns.push(ColumnInfo::new("PROCEDURE_NAME", ColumnType::String));
    for bucket in 0..LATENCY_BUCKET_COUNT {
        let upper = (bucket as i32 + 1) * LATENCY_BUCKET_WIDTH_MS;
        columns.push(ColumnInfo::new(format!("{upper}MS"), ColumnType::Integer));
    }
    columns
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn pool_snapshot(shared: &Shared) -> Vec<Arc<NodeConnection>> {
    shared.pool.lock().unwrap().connections.clone()
}

fn header_cells(now: i64, hostname: &str, connection: &NodeConnection) -> Vec<ColumnValue> {
    vec![
        now.into(),
        hostname.into(),
        connection.reactor_connection_id().into(),
        i64::from(connection.host_id()).into(),
        connection.hostname().into(),
        connection.server_connection_id().into(),
    ]
}

pub(crate) fn connection_stats(shared: &Shared, reactor: &Reactor, interval: bool) -> Result<ResultTable> {
    let now = now_epoch_ms();
    let mut table = ResultTable::new(connection_stats_columns());
    let io = reactor.io_stats(interval);
    let mut totals = InvocationTotals::default();

    for connection in pool_snapshot(shared) {
        let counters = connection.counter_totals(interval);
        totals.completed += counters.completed;
        totals.aborted += counters.aborted;
        totals.errored += counters.errored;

        let (server_hostname, io_stats) = io
            .get(&connection.reactor_connection_id())
            .map(|(hostname, stats)| (hostname.clone(), *stats))
            .unwrap_or_else(|| (connection.hostname().to_string(), IoStats::default()));

        let mut row = vec![
            ColumnValue::BigInt(now),
            shared.hostname.as_str().into(),
            connection.reactor_connection_id().into(),
            i64::from(connection.host_id()).into(),
            server_hostname.into(),
            connection.server_connection_id().into(),
        ];
        row.extend([
            ColumnValue::BigInt(counters.completed as i64),
            ColumnValue::BigInt(counters.aborted as i64),
            ColumnValue::BigInt(counters.errored as i64),
            ColumnValue::BigInt(io_stats.bytes_read as i64),
            ColumnValue::BigInt(io_stats.messages_read as i64),
            ColumnValue::BigInt(io_stats.bytes_written as i64),
            ColumnValue::BigInt(io_stats.messages_written as i64),
        ]);
        table.add_row(row)?;
    }

    let global_io = io
        .get(&GLOBAL_STATS_ID)
        .map(|(_, stats)| *stats)
        .unwrap_or_default();
    table.add_row(vec![
        ColumnValue::BigInt(now),
        shared.hostname.as_str().into(),
        ColumnValue::BigInt(GLOBAL_STATS_ID),
        ColumnValue::BigInt(-1),
        "GLOBAL".into(),
        ColumnValue::BigInt(-1),
        ColumnValue::BigInt(totals.completed as i64),
        ColumnValue::BigInt(totals.aborted as i64),
        ColumnValue::BigInt(totals.errored as i64),
        ColumnValue::BigInt(global_io.bytes_read as i64),
        ColumnValue::BigInt(global_io.messages_read as i64),
        ColumnValue::BigInt(global_io.bytes_written as i64),
        ColumnValue::BigInt(global_io.messages_written as i64),
    ])?;
    Ok(table)
}

pub(crate) fn procedure_stats(shared: &Shared, interval: bool) -> Result<ResultTable> {
    let now = now_epoch_ms();
    let mut table = ResultTable::new(procedure_stats_columns());

    for connection in pool_snapshot(shared) {
        for snapshot in connection.procedure_snapshots(interval) {
            let mut row = header_cells(now, &shared.hostname, &connection);
            row.extend([
                snapshot.procedure.as_str().into(),
                ColumnValue::Integer(snapshot.round_trip_avg_ms),
                ColumnValue::Integer(snapshot.round_trip_min_ms),
                ColumnValue::Integer(snapshot.round_trip_max_ms),
                ColumnValue::Integer(snapshot.cluster_round_trip_avg_ms),
                ColumnValue::Integer(snapshot.cluster_round_trip_min_ms),
                ColumnValue::Integer(snapshot.cluster_round_trip_max_ms),
                ColumnValue::BigInt(snapshot.invocations_completed as i64),
                ColumnValue::BigInt(snapshot.invocations_aborted as i64),
                ColumnValue::BigInt(snapshot.invocations_errored as i64),
            ]);
            table.add_row(row)?;
        }
    }
    Ok(table)
}

pub(crate) fn latency_histogram(
    shared: &Shared,
    client_round_trip: bool,
    interval: bool,
) -> Result<ResultTable> {
    let now = now_epoch_ms();
    let mut table = ResultTable::new(histogram_columns());

    for connection in pool_snapshot(shared) {
        for (procedure, buckets) in connection.procedure_buckets(client_round_trip, interval) {
            if interval && buckets.iter().all(|&b| b == 0) {
                continue;
            }
            let mut row = header_cells(now, &shared.hostname, &connection);
            row.push(procedure.as_str().into());
            row.extend(buckets.iter().map(|&b| ColumnValue::Integer(b as i32)));
            table.add_row(row)?;
        }
    }
    Ok(table)
}
