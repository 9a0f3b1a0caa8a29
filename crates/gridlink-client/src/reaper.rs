//! The expiration reaper.
//!
//! One long-lived task at 1 Hz. Each tick snapshots the pool under the pool
//! lock, then walks every connection under its own lock: send a heartbeat if
//! the connection has idled past a third of the response timeout, close it
//! if an outstanding heartbeat went unanswered past the full timeout, and
//! complete any call whose per-call deadline elapsed with a synthetic
//! timeout response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::connection::NodeConnection;
use crate::distributor::Shared;

const REAPER_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) fn spawn(shared: Arc<Shared>, handle: &Handle) -> JoinHandle<()> {
    handle.spawn(async move {
        let start = time::Instant::now() + REAPER_INTERVAL;
        let mut ticker = time::interval_at(start, REAPER_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick(&shared);
        }
    })
}

/// One reaper pass over the pool. The snapshot keeps the pool lock short;
/// connections torn down mid-walk just see their reap turn skipped.
pub(crate) fn tick(shared: &Shared) {
    let connections: Vec<Arc<NodeConnection>> = shared.pool.lock().unwrap().connections.clone();
    let now = Instant::now();
    for connection in connections {
        connection.reap(now);
    }
}
