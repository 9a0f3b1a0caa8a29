//! One connection to one cluster node.
//!
//! The node connection owns the outstanding-call table, the heartbeat state,
//! the write-queue byte accounting, and the per-procedure statistics for its
//! endpoint. Locking discipline: this module's state lock may be held when
//! taking the pool lock (only `stopping` does), never the other way around,
//! and completion handlers are always invoked with neither lock held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use gridlink_common::transport::{FrameCodec, FrameHandler, ReactorConnection};
use gridlink_common::{ClientResponse, ProcedureInvocation, ResponseStatus, HEARTBEAT_HANDLE};
use gridlink_metrics::{
    InvocationCounters, InvocationTotals, ProcedureStats, ProcedureStatsSnapshot,
    LATENCY_BUCKET_COUNT,
};
use tracing::{debug, warn};

use crate::callback::ProcedureCallback;
use crate::distributor::Shared;
use crate::listener::DisconnectCause;

/// Bookkeeping for one in-flight invocation. Inserted on dispatch, removed
/// exactly once: by the matching response, by the expiration reaper, or by
/// connection teardown.
struct CallbackBookkeeping {
    submitted: Instant,
    callback: Box<dyn ProcedureCallback>,
    procedure: String,
}

struct ConnState {
    connected: bool,
    last_response: Instant,
    outstanding_heartbeat: bool,
    close_cause: DisconnectCause,
    callbacks: HashMap<i64, CallbackBookkeeping>,
    queued_bytes: i64,
    stats: HashMap<String, ProcedureStats>,
    counters: InvocationCounters,
}

pub(crate) struct NodeConnection {
    shared: Arc<Shared>,
    hostname: String,
    port: u16,
    host_id: i32,
    server_connection_id: i64,
    /// Callbacks not yet invoked: bookkeeping entries plus responses whose
    /// handlers are mid-invocation on some thread.
    callbacks_to_invoke: AtomicI64,
    /// Set under the pool lock when `stopping` removes this connection, so
    /// a racing `create_connection` cannot re-insert it afterwards.
    torn_down: AtomicBool,
    reactor_conn: OnceLock<Arc<ReactorConnection>>,
    state: Mutex<ConnState>,
}

impl NodeConnection {
    pub(crate) fn new(
        shared: Arc<Shared>,
        hostname: String,
        port: u16,
        host_id: i32,
        server_connection_id: i64,
    ) -> Self {
        Self {
            shared,
            hostname,
            port,
            host_id,
            server_connection_id,
            callbacks_to_invoke: AtomicI64::new(0),
            torn_down: AtomicBool::new(false),
            reactor_conn: OnceLock::new(),
            state: Mutex::new(ConnState {
                connected: true,
                last_response: Instant::now(),
                outstanding_heartbeat: false,
                close_cause: DisconnectCause::ConnectionClosed,
                callbacks: HashMap::new(),
                queued_bytes: 0,
                stats: HashMap::new(),
                counters: InvocationCounters::default(),
            }),
        }
    }

    pub(crate) fn attach(&self, conn: Arc<ReactorConnection>) {
        let _ = self.reactor_conn.set(conn);
    }

    /// Whether `stopping` has already pulled this connection from the pool.
    /// Only meaningful while holding the pool lock.
    pub(crate) fn torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub(crate) fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn host_id(&self) -> i32 {
        self.host_id
    }

    pub(crate) fn server_connection_id(&self) -> i64 {
        self.server_connection_id
    }

    /// Reactor-assigned connection id; `-1` before attachment.
    pub(crate) fn reactor_connection_id(&self) -> i64 {
        self.reactor_conn.get().map_or(-1, |c| c.id())
    }

    pub(crate) fn had_backpressure(&self) -> bool {
        self.reactor_conn
            .get()
            .is_some_and(|c| c.had_backpressure())
    }

    pub(crate) fn outstanding_callbacks(&self) -> i64 {
        self.callbacks_to_invoke.load(Ordering::SeqCst)
    }

    pub(crate) fn bookkeeping_len(&self) -> usize {
        self.state.lock().unwrap().callbacks.len()
    }

    /// Record the invocation and enqueue its frame.
    ///
    /// Precondition: `handle` is not the heartbeat handle and has no live
    /// bookkeeping entry. On a disconnected connection the callback is
    /// completed synchronously with a connection-lost response.
    pub(crate) fn create_work(
        &self,
        handle: i64,
        procedure: &str,
        frame: Vec<u8>,
        callback: Box<dyn ProcedureCallback>,
    ) {
        debug_assert_ne!(handle, HEARTBEAT_HANDLE);
        {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                drop(state);
                let response = self.connection_lost_response(handle);
                self.complete(callback.as_ref(), &response);
                return;
            }
            let previous = state.callbacks.insert(
                handle,
                CallbackBookkeeping {
                    submitted: Instant::now(),
                    callback,
                    procedure: procedure.to_string(),
                },
            );
            debug_assert!(previous.is_none(), "duplicate client handle {handle}");
            self.callbacks_to_invoke.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(conn) = self.reactor_conn.get() {
            conn.enqueue(frame);
        }
    }

    /// Enqueue a liveness probe under the reserved heartbeat handle and mark
    /// it outstanding. Deliberately asymmetric with ordinary calls: no
    /// bookkeeping entry is ever created for the heartbeat handle, and the
    /// inbound path recognizes it and returns early.
    pub(crate) fn send_heartbeat(&self) {
        let frame = match FrameCodec::encode_invocation(&ProcedureInvocation::heartbeat()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode heartbeat");
                return;
            }
        };
        self.state.lock().unwrap().outstanding_heartbeat = true;
        if let Some(conn) = self.reactor_conn.get() {
            conn.enqueue(frame);
        }
    }

    /// Walk this connection's liveness and per-call deadlines. Called by the
    /// expiration reaper once a second.
    pub(crate) fn reap(&self, now: Instant) {
        let config = &self.shared.config;
        let mut heartbeat_due = false;
        let mut expired = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return;
            }

            let idle = now.saturating_duration_since(state.last_response);
            if state.outstanding_heartbeat && idle > config.connection_response_timeout {
                // memoize why it's closing; unregister triggers stopping()
                state.close_cause = DisconnectCause::Timeout;
                warn!(
                    hostname = %self.hostname,
                    port = self.port,
                    idle_ms = idle.as_millis() as u64,
                    "closing unresponsive connection"
                );
                if let Some(conn) = self.reactor_conn.get() {
                    conn.unregister();
                }
            } else if !state.outstanding_heartbeat && idle > config.connection_response_timeout / 3 {
                heartbeat_due = true;
            }

            let mut expired_handles: Vec<i64> = state
                .callbacks
                .iter()
                .filter(|(_, bk)| now.saturating_duration_since(bk.submitted) > config.procedure_call_timeout)
                .map(|(handle, _)| *handle)
                .collect();
            expired_handles.sort_unstable();
            for handle in expired_handles {
                let bookkeeping = state.callbacks.remove(&handle).expect("handle just listed");
                expired.push((handle, bookkeeping));
            }
        }

        if heartbeat_due {
            self.send_heartbeat();
        }

        for (handle, bookkeeping) in expired {
            let elapsed_ms = now.saturating_duration_since(bookkeeping.submitted).as_millis() as i32;
            let mut response = ClientResponse::failure(
                handle,
                ResponseStatus::ConnectionTimeout,
                format!(
                    "No response received in the allotted time (set to {} ms).",
                    config.procedure_call_timeout.as_millis()
                ),
            );
            response.client_roundtrip_ms = elapsed_ms;
            response.cluster_roundtrip_ms = elapsed_ms;
            self.complete(bookkeeping.callback.as_ref(), &response);
            self.callbacks_to_invoke.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Connection-level counters, lifetime or since the previous interval.
    pub(crate) fn counter_totals(&self, interval: bool) -> InvocationTotals {
        let mut state = self.state.lock().unwrap();
        if interval {
            state.counters.interval_totals()
        } else {
            state.counters.totals()
        }
    }

    /// Per-procedure snapshot rows, sorted by procedure name.
    pub(crate) fn procedure_snapshots(&self, interval: bool) -> Vec<ProcedureStatsSnapshot> {
        let mut state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.stats.keys().cloned().collect();
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|name| state.stats.get_mut(&name).and_then(|s| s.snapshot(interval)))
            .collect()
    }

    /// Per-procedure latency buckets, sorted by procedure name.
    pub(crate) fn procedure_buckets(
        &self,
        client_round_trip: bool,
        interval: bool,
    ) -> Vec<(String, [u64; LATENCY_BUCKET_COUNT])> {
        let mut state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.stats.keys().cloned().collect();
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|name| {
                let stats = state.stats.get_mut(&name)?;
                Some((name, stats.bucket_snapshot(client_round_trip, interval)))
            })
            .collect()
    }

    fn connection_lost_response(&self, handle: i64) -> ClientResponse {
        ClientResponse::failure(
            handle,
            ResponseStatus::ConnectionLost,
            format!(
                "Connection to database host ({}) was lost before a response was received",
                self.hostname
            ),
        )
    }

    /// Invoke a completion handler, routing any error it returns to the
    /// status listeners. Never called with an internal lock held.
    fn complete(&self, callback: &dyn ProcedureCallback, response: &ClientResponse) {
        if let Err(error) = callback.client_callback(response) {
            self.shared.notify_uncaught(callback, response, &error);
        }
    }
}

impl FrameHandler for NodeConnection {
    fn handle_frame(&self, body: Vec<u8>) {
        let now = Instant::now();
        let mut response = match FrameCodec::decode_response(&body) {
            Ok(response) => response,
            Err(e) => {
                warn!(hostname = %self.hostname, error = %e, "dropping undecodable frame");
                return;
            }
        };

        let matched = {
            let mut state = self.state.lock().unwrap();
            // track the most recent read on this connection
            state.last_response = now;

            // heartbeat answers clear the flag and never touch bookkeeping
            if response.client_handle == HEARTBEAT_HANDLE {
                state.outstanding_heartbeat = false;
                return;
            }

            match state.callbacks.remove(&response.client_handle) {
                None => None,
                Some(bookkeeping) => {
                    let delta = now.saturating_duration_since(bookkeeping.submitted).as_millis() as i32;
                    let abort = response.status.is_abort();
                    let error = !abort && response.status != ResponseStatus::Success;
                    state.counters.record(abort, error);
                    state
                        .stats
                        .entry(bookkeeping.procedure.clone())
                        .or_insert_with(|| ProcedureStats::new(&bookkeeping.procedure))
                        .record(delta, response.cluster_roundtrip_ms, abort, error);
                    Some((bookkeeping.callback, delta))
                }
            }
        };

        match matched {
            // presumably a response for an already timed-out call
            None => {
                debug!(
                    hostname = %self.hostname,
                    client_handle = response.client_handle,
                    "late procedure response"
                );
                self.shared
                    .notify_late_response(&response, &self.hostname, self.port);
            }
            Some((callback, delta)) => {
                response.client_roundtrip_ms = delta;
                self.complete(callback.as_ref(), &response);
                self.callbacks_to_invoke.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn stopping(&self) {
        let mut orphans: Vec<(i64, CallbackBookkeeping)> = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            // Taking the pool lock under the connection lock is legal here
            // and only here; it prevents new work from racing onto a
            // connection the pool no longer knows about.
            {
                let mut pool = self.shared.pool.lock().unwrap();
                self.torn_down.store(true, Ordering::SeqCst);
                pool.connections
                    .retain(|c| !std::ptr::eq(Arc::as_ptr(c), self));
                let connections_left = pool.connections.len();
                for listener in &pool.listeners {
                    listener.connection_lost(&self.hostname, self.port, connections_left, state.close_cause);
                }
            }
            state.connected = false;
            orphans.extend(state.callbacks.drain());
        }

        orphans.sort_unstable_by_key(|(handle, _)| *handle);
        for (handle, bookkeeping) in orphans {
            let response = self.connection_lost_response(handle);
            self.complete(bookkeeping.callback.as_ref(), &response);
            self.callbacks_to_invoke.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn queue(&self, delta: i64) -> bool {
        let mut state = self.state.lock().unwrap();
        state.queued_bytes += delta;
        state.queued_bytes > self.shared.config.backpressure_queue_bytes as i64
    }

    fn off_backpressure(&self) {
        // The pool lock is held across the notification so a racing queue()
        // cannot report backpressure after the drain, losing the wakeup.
        let pool = self.shared.pool.lock().unwrap();
        for listener in &pool.listeners {
            listener.backpressure(false);
        }
    }
}
