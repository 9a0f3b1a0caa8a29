//! The Distributor facade.
//!
//! De/multiplexes transactions across a cluster: owns the connection pool
//! and listener list, validates cluster identity at connect time, performs
//! round-robin dispatch with backpressure awareness, and exposes drain,
//! shutdown, and the aggregated statistics views.
//!
//! It is safe to take the pool lock while holding an individual connection
//! lock, but it is always unsafe to take a connection lock while holding
//! the pool lock.

use std::sync::{Arc, Mutex};

use gridlink_common::transport::auth::{authenticate, AuthenticatedSocket};
use gridlink_common::transport::{FrameCodec, FrameHandler, Reactor};
use gridlink_common::{ClientResponse, GridlinkError, ProcedureInvocation, Result, ResultTable};
use tokio::task::JoinHandle;
use tracing::info;

use crate::callback::{CallbackError, ProcedureCallback};
use crate::config::ClientConfig;
use crate::connection::NodeConnection;
use crate::listener::StatusListener;
use crate::{reaper, stats};

/// The (timestamp, address) pair that pins the pool to a single cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInstanceId {
    pub timestamp: i64,
    pub addr: i32,
}

pub(crate) struct PoolState {
    pub(crate) connections: Vec<Arc<NodeConnection>>,
    pub(crate) listeners: Vec<Arc<dyn StatusListener>>,
    pub(crate) cursor: u64,
    pub(crate) cluster_instance_id: Option<ClusterInstanceId>,
    pub(crate) build_string: Option<String>,
}

/// State shared between the facade, the node connections, and the reaper.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) hostname: String,
    pub(crate) pool: Mutex<PoolState>,
}

impl Shared {
    fn listeners_snapshot(&self) -> Vec<Arc<dyn StatusListener>> {
        self.pool.lock().unwrap().listeners.clone()
    }

    pub(crate) fn notify_late_response(&self, response: &ClientResponse, hostname: &str, port: u16) {
        for listener in self.listeners_snapshot() {
            listener.late_procedure_response(response, hostname, port);
        }
    }

    pub(crate) fn notify_uncaught(
        &self,
        callback: &dyn ProcedureCallback,
        response: &ClientResponse,
        error: &CallbackError,
    ) {
        for listener in self.listeners_snapshot() {
            listener.uncaught_error(callback, response, error);
        }
    }
}

/// Client-side multiplexing transport for a GridLink cluster.
///
/// # Example
///
/// ```no_run
/// use gridlink_client::{CallbackError, ClientConfig, Distributor};
/// use gridlink_common::{ClientResponse, ProcedureInvocation};
///
/// # fn main() -> gridlink_common::Result<()> {
/// let distributor = Distributor::new(ClientConfig::default())?;
/// distributor.create_connection("db-0.example.com", 21212, "operator", b"...")?;
///
/// let queued = distributor.queue(
///     ProcedureInvocation::new(1, "Vote"),
///     Box::new(|response: &ClientResponse| -> Result<(), CallbackError> {
///         println!("status: {:?}", response.status);
///         Ok(())
///     }),
///     false,
/// )?;
/// assert!(queued);
/// distributor.drain();
/// distributor.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Distributor {
    shared: Arc<Shared>,
    reactor: Arc<Reactor>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Distributor {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let reactor = Arc::new(Reactor::new(config.reactor_worker_threads())?);
        let shared = Arc::new(Shared {
            hostname: local_hostname(),
            config,
            pool: Mutex::new(PoolState {
                connections: Vec::new(),
                listeners: Vec::new(),
                cursor: 0,
                cluster_instance_id: None,
                build_string: None,
            }),
        });
        let reaper = reaper::spawn(Arc::clone(&shared), reactor.handle());
        Ok(Self {
            shared,
            reactor,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Connect and authenticate to a cluster node, blocking through the
    /// handshake.
    ///
    /// The first connection captures the cluster identity; every later
    /// connection must present the same identity or the socket is closed
    /// and the call fails with [`GridlinkError::ClusterMismatch`].
    pub fn create_connection(
        &self,
        host: &str,
        port: u16,
        user: &str,
        hashed_password: &[u8],
    ) -> Result<()> {
        let authed = authenticate(host, port, user, hashed_password)?;
        {
            let mut pool = self.shared.pool.lock().unwrap();
            match pool.cluster_instance_id {
                None => {
                    pool.cluster_instance_id = Some(ClusterInstanceId {
                        timestamp: authed.cluster_timestamp,
                        addr: authed.cluster_addr,
                    });
                }
                Some(current) => {
                    if current.timestamp != authed.cluster_timestamp
                        || current.addr != authed.cluster_addr
                    {
                        // dropping `authed` closes the socket
                        return Err(GridlinkError::ClusterMismatch {
                            current_timestamp: current.timestamp,
                            current_addr: current.addr,
                            server_timestamp: authed.cluster_timestamp,
                            server_addr: authed.cluster_addr,
                        });
                    }
                }
            }
            pool.build_string = Some(authed.build_string.clone());
        }

        let AuthenticatedSocket {
            socket,
            hostname,
            port,
            host_id,
            connection_id,
            ..
        } = authed;

        let connection = Arc::new(NodeConnection::new(
            Arc::clone(&self.shared),
            hostname.clone(),
            port,
            host_id,
            connection_id,
        ));
        let handler: Arc<dyn FrameHandler> = Arc::clone(&connection) as Arc<dyn FrameHandler>;
        let reactor_conn = self.reactor.register(socket, hostname.clone(), port, handler)?;
        connection.attach(reactor_conn);
        {
            // The tombstone check is ordered by the pool lock: if the socket
            // already died and stopping() ran, the connection must not be
            // (re-)inserted.
            let mut pool = self.shared.pool.lock().unwrap();
            if !connection.torn_down() {
                pool.connections.push(connection);
            }
        }
        info!(hostname = %hostname, port, host_id, "connected to cluster node");
        Ok(())
    }

    /// Queue an invocation on the next connection without backpressure.
    ///
    /// Returns `Ok(false)` when every connection reports backpressure and
    /// `ignore_backpressure` is unset: the invocation is not queued, the
    /// callback is dropped, and listeners see `backpressure(true)`.
    /// Fails with [`GridlinkError::NoConnections`] on an empty pool.
    pub fn queue(
        &self,
        invocation: ProcedureInvocation,
        callback: Box<dyn ProcedureCallback>,
        ignore_backpressure: bool,
    ) -> Result<bool> {
        let target = {
            let mut pool = self.shared.pool.lock().unwrap();
            if pool.connections.is_empty() {
                return Err(GridlinkError::NoConnections);
            }

            let PoolState {
                connections,
                listeners,
                cursor,
                ..
            } = &mut *pool;
            let picked = round_robin_pick(cursor, connections.len(), |idx| {
                !ignore_backpressure && connections[idx].had_backpressure()
            });
            match picked {
                Some(idx) => Some(Arc::clone(&connections[idx])),
                None => {
                    for listener in listeners.iter() {
                        listener.backpressure(true);
                    }
                    None
                }
            }
        };

        // Heavyweight serialization stays outside the pool lock; create_work
        // takes only the connection's own lock.
        match target {
            Some(connection) => {
                let frame = FrameCodec::encode_invocation(&invocation)?;
                connection.create_work(invocation.client_handle, &invocation.procedure, frame, callback);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Block until every connection reports zero outstanding callbacks.
    /// Does not close anything.
    pub fn drain(&self) {
        loop {
            let more = {
                let pool = self.shared.pool.lock().unwrap();
                pool.connections
                    .iter()
                    .any(|c| c.outstanding_callbacks() > 0)
            };
            if !more {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        if cfg!(debug_assertions) {
            let pool = self.shared.pool.lock().unwrap();
            for connection in &pool.connections {
                debug_assert_eq!(connection.bookkeeping_len(), 0);
            }
        }
    }

    /// Cancel the reaper and shut the reactor down, closing every socket.
    /// Blocks briefly; safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().unwrap().take() {
            reaper.abort();
        }
        self.reactor.shutdown();
    }

    /// Register a status listener. Adding the same listener twice is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn StatusListener>) {
        let mut pool = self.shared.pool.lock().unwrap();
        if !pool.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            pool.listeners.push(listener);
        }
    }

    /// Remove a previously registered listener; returns whether it was found.
    pub fn remove_listener(&self, listener: &Arc<dyn StatusListener>) -> bool {
        let mut pool = self.shared.pool.lock().unwrap();
        let before = pool.listeners.len();
        pool.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        pool.listeners.len() != before
    }

    /// Per-connection counters plus I/O totals, with a synthetic GLOBAL row.
    pub fn connection_stats(&self, interval: bool) -> Result<ResultTable> {
        stats::connection_stats(&self.shared, &self.reactor, interval)
    }

    /// Per-(connection, procedure) latency and outcome statistics.
    pub fn procedure_stats(&self, interval: bool) -> Result<ResultTable> {
        stats::procedure_stats(&self.shared, interval)
    }

    /// Latency histogram buckets per (connection, procedure), for either the
    /// client-observed or the cluster-reported round trip.
    pub fn latency_histogram(&self, client_round_trip: bool, interval: bool) -> Result<ResultTable> {
        stats::latency_histogram(&self.shared, client_round_trip, interval)
    }

    /// Cluster identity captured from the first successful authentication.
    pub fn instance_id(&self) -> Option<ClusterInstanceId> {
        self.shared.pool.lock().unwrap().cluster_instance_id
    }

    /// Server build string captured at connect time.
    pub fn build_string(&self) -> Option<String> {
        self.shared.pool.lock().unwrap().build_string.clone()
    }
}

/// Round-robin pick over `total` slots: up to `total` attempts, advancing
/// the cursor once per attempt (refused attempts included, a deliberate
/// load-spreading choice), skipping slots the filter refuses.
fn round_robin_pick(cursor: &mut u64, total: usize, mut refuse: impl FnMut(usize) -> bool) -> Option<usize> {
    for _ in 0..total {
        let idx = (*cursor % total as u64) as usize;
        *cursor = cursor.wrapping_add(1);
        if !refuse(idx) {
            return Some(idx);
        }
    }
    None
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_spreads_evenly() {
        let mut cursor = 0;
        let mut counts = [0u32; 3];
        for _ in 0..300 {
            let idx = round_robin_pick(&mut cursor, 3, |_| false).unwrap();
            counts[idx] += 1;
        }
        assert_eq!(counts, [100, 100, 100]);
    }

    #[test]
    fn test_cursor_advances_on_refused_attempts() {
        // Pool of A, B, C with six picks already made (cursor at 6), then B
        // refuses: the next three picks land on A, C, A because the cursor
        // keeps moving on the skipped attempt.
        let mut cursor = 0;
        for _ in 0..6 {
            round_robin_pick(&mut cursor, 3, |_| false).unwrap();
        }
        let refuse_b = |idx: usize| idx == 1;
        assert_eq!(round_robin_pick(&mut cursor, 3, refuse_b), Some(0));
        assert_eq!(round_robin_pick(&mut cursor, 3, refuse_b), Some(2));
        assert_eq!(round_robin_pick(&mut cursor, 3, refuse_b), Some(0));
    }

    #[test]
    fn test_all_refused_returns_none_but_still_advances() {
        let mut cursor = 0;
        assert_eq!(round_robin_pick(&mut cursor, 3, |_| true), None);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_cursor_wraps_without_skew() {
        let mut cursor = u64::MAX;
        let first = round_robin_pick(&mut cursor, 3, |_| false).unwrap();
        assert_eq!(first, (u64::MAX % 3) as usize);
        assert_eq!(cursor, 0);
        assert_eq!(round_robin_pick(&mut cursor, 3, |_| false), Some(0));
    }

    #[test]
    fn test_single_slot() {
        let mut cursor = 0;
        assert_eq!(round_robin_pick(&mut cursor, 1, |_| false), Some(0));
        assert_eq!(round_robin_pick(&mut cursor, 1, |_| false), Some(0));
    }
}
