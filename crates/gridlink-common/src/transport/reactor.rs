//! The network reactor.
//!
//! The reactor owns a dedicated multi-threaded runtime (one worker, or
//! `cores / 2` when the embedder asks for multiple threads) and runs one
//! reader task and one writer task per registered connection. Inbound
//! frames are de-framed and handed to the connection's [`FrameHandler`] on
//! the reader task, which makes that task the delivery thread for
//! completion handlers. Outbound frames are enqueued without blocking and drained by
//! the writer task, which reports queued-byte deltas back to the handler so
//! the connection can account for backpressure.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::codec;
use crate::protocol::error::Result;

/// Key of the synthetic aggregate entry in [`Reactor::io_stats`].
pub const GLOBAL_STATS_ID: i64 = -1;

/// Surface a registered connection presents to the reactor.
///
/// `handle_frame` and `stopping` run on the connection's reader task;
/// `queue` and `off_backpressure` run on whichever task touches the write
/// queue. Implementations must not block.
pub trait FrameHandler: Send + Sync + 'static {
    /// One de-framed inbound body.
    fn handle_frame(&self, body: Vec<u8>);

    /// The socket is going away; called exactly once, after the last frame.
    fn stopping(&self);

    /// Queued-byte accounting for the write queue. `delta` is positive when
    /// a frame is enqueued and negative once it has been written to the
    /// socket. Returns true while the accumulated total is above the
    /// high-water mark.
    fn queue(&self, delta: i64) -> bool;

    /// The write queue drained back below the high-water mark.
    fn off_backpressure(&self);
}

/// Byte and message counters for one connection, with interval shadows.
#[derive(Debug, Default)]
struct IoCounters {
    bytes_read: AtomicU64,
    messages_read: AtomicU64,
    bytes_written: AtomicU64,
    messages_written: AtomicU64,
    last_bytes_read: AtomicU64,
    last_messages_read: AtomicU64,
    last_bytes_written: AtomicU64,
    last_messages_written: AtomicU64,
}

impl IoCounters {
    fn add_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
        self.messages_read.fetch_add(1, Ordering::Relaxed);
    }

    fn add_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.messages_written.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, interval: bool) -> IoStats {
        let current = IoStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            messages_read: self.messages_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            messages_written: self.messages_written.load(Ordering::Relaxed),
        };
        if !interval {
            return current;
        }
        IoStats {
            bytes_read: current.bytes_read - self.last_bytes_read.swap(current.bytes_read, Ordering::Relaxed),
            messages_read: current.messages_read
                - self.last_messages_read.swap(current.messages_read, Ordering::Relaxed),
            bytes_written: current.bytes_written
                - self.last_bytes_written.swap(current.bytes_written, Ordering::Relaxed),
            messages_written: current.messages_written
                - self.last_messages_written.swap(current.messages_written, Ordering::Relaxed),
        }
    }
}

/// Snapshot of one connection's I/O counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub bytes_read: u64,
    pub messages_read: u64,
    pub bytes_written: u64,
    pub messages_written: u64,
}

/// A connection registered with the reactor.
///
/// Writes are enqueued, never performed inline; `unregister` initiates an
/// ordered teardown that ends with the handler's `stopping` callback.
pub struct ReactorConnection {
    id: i64,
    hostname: String,
    port: u16,
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    close_tx: watch::Sender<bool>,
    backpressure: AtomicBool,
    monitor: Weak<dyn FrameHandler>,
}

impl ReactorConnection {
    /// Reactor-assigned connection id (distinct from the server's).
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Enqueue a complete frame for writing. Never blocks; a send on a
    /// closing connection is silently dropped, teardown will fail the call.
    pub fn enqueue(&self, frame: Vec<u8>) {
        let len = frame.len() as i64;
        let monitor = self.monitor.upgrade();
        // Account before handing the frame over, so the writer's negative
        // delta can never be observed ahead of our positive one.
        if let Some(monitor) = &monitor {
            if monitor.queue(len) {
                self.backpressure.store(true, Ordering::Release);
            }
        }
        if self.frame_tx.send(frame).is_err() {
            if let Some(monitor) = &monitor {
                monitor.queue(-len);
            }
        }
    }

    /// Whether the write queue was above the high-water mark at last report.
    pub fn had_backpressure(&self) -> bool {
        self.backpressure.load(Ordering::Acquire)
    }

    /// Begin ordered teardown. The reader task observes the signal, invokes
    /// the handler's `stopping`, and deregisters the connection.
    pub fn unregister(&self) {
        let _ = self.close_tx.send(true);
    }
}

struct Registered {
    conn: Arc<ReactorConnection>,
    counters: Arc<IoCounters>,
}

/// The I/O subsystem: a dedicated runtime plus the connection registry.
pub struct Reactor {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    connections: Mutex<HashMap<i64, Registered>>,
    global: Arc<IoCounters>,
    next_id: AtomicI64,
}

impl Reactor {
    /// Build a reactor with the given number of I/O worker threads.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("gridlink-reactor")
            .enable_io()
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            connections: Mutex::new(HashMap::new()),
            global: Arc::new(IoCounters::default()),
            next_id: AtomicI64::new(0),
        })
    }

    /// Handle to the reactor's runtime, for scheduling housekeeping tasks.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Register an authenticated socket and start its I/O tasks.
    pub fn register(
        self: &Arc<Self>,
        socket: std::net::TcpStream,
        hostname: String,
        port: u16,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Arc<ReactorConnection>> {
        if self.runtime.lock().unwrap().is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "reactor is shut down").into());
        }

        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;
        let stream = {
            let _guard = self.handle.enter();
            TcpStream::from_std(socket)?
        };
        let (read_half, write_half) = stream.into_split();

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let counters = Arc::new(IoCounters::default());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let conn = Arc::new(ReactorConnection {
            id,
            hostname,
            port,
            frame_tx,
            close_tx,
            backpressure: AtomicBool::new(false),
            monitor: Arc::downgrade(&handler),
        });

        // tasks are detached; teardown is driven by the close signal
        let _writer = self.handle.spawn(write_loop(
            write_half,
            frame_rx,
            close_rx.clone(),
            Arc::clone(&handler),
            Arc::clone(&conn),
            Arc::clone(&counters),
            Arc::clone(&self.global),
        ));
        let _reader = self.handle.spawn(read_loop(
            read_half,
            close_rx,
            handler,
            Arc::clone(&counters),
            Arc::clone(&self.global),
            Arc::downgrade(self),
            id,
        ));

        self.connections.lock().unwrap().insert(
            id,
            Registered {
                conn: Arc::clone(&conn),
                counters,
            },
        );
        Ok(conn)
    }

    /// Per-connection byte/message counters keyed by reactor connection id,
    /// plus an aggregate entry at [`GLOBAL_STATS_ID`]. The aggregate spans
    /// the reactor's whole lifetime, including connections already closed.
    pub fn io_stats(&self, interval: bool) -> HashMap<i64, (String, IoStats)> {
        let mut out = HashMap::new();
        {
            let connections = self.connections.lock().unwrap();
            for (id, registered) in connections.iter() {
                out.insert(
                    *id,
                    (
                        registered.conn.hostname.clone(),
                        registered.counters.snapshot(interval),
                    ),
                );
            }
        }
        out.insert(
            GLOBAL_STATS_ID,
            ("GLOBAL".to_string(), self.global.snapshot(interval)),
        );
        out
    }

    /// Close every socket, let the handlers observe `stopping`, and tear the
    /// runtime down. Idempotent; blocks the calling thread briefly.
    pub fn shutdown(&self) {
        let conns: Vec<Arc<ReactorConnection>> = {
            let connections = self.connections.lock().unwrap();
            connections.values().map(|r| Arc::clone(&r.conn)).collect()
        };
        for conn in conns {
            conn.unregister();
        }
        if let Some(runtime) = self.runtime.lock().unwrap().take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut close_rx: watch::Receiver<bool>,
    handler: Arc<dyn FrameHandler>,
    counters: Arc<IoCounters>,
    global: Arc<IoCounters>,
    reactor: Weak<Reactor>,
    id: i64,
) {
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            frame = codec::read_frame_async(&mut read_half) => match frame {
                Ok(body) => {
                    let wire_bytes = 4 + body.len() as u64;
                    counters.add_read(wire_bytes);
                    global.add_read(wire_bytes);
                    handler.handle_frame(body);
                }
                Err(e) => {
                    debug!(connection_id = id, error = %e, "connection read ended");
                    break;
                }
            }
        }
    }

    handler.stopping();
    if let Some(reactor) = reactor.upgrade() {
        reactor.connections.lock().unwrap().remove(&id);
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut close_rx: watch::Receiver<bool>,
    handler: Arc<dyn FrameHandler>,
    conn: Arc<ReactorConnection>,
    counters: Arc<IoCounters>,
    global: Arc<IoCounters>,
) {
    loop {
        tokio::select! {
            _ = close_rx.changed() => break,
            maybe = frame_rx.recv() => match maybe {
                Some(frame) => {
                    let len = frame.len() as u64;
                    if let Err(e) = write_half.write_all(&frame).await {
                        debug!(connection_id = conn.id, error = %e, "connection write failed");
                        break;
                    }
                    counters.add_written(len);
                    global.add_written(len);
                    let above = handler.queue(-(len as i64));
                    if !above && conn.backpressure.swap(false, Ordering::AcqRel) {
                        handler.off_backpressure();
                    }
                }
                None => break,
            }
        }
    }
}
