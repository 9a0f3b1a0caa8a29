use gridlink_common::ClientResponse;

use crate::callback::{CallbackError, ProcedureCallback};

/// Why a connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Ordinary close: the peer hung up or the client shut down.
    ConnectionClosed,
    /// The liveness machinery gave up on an unanswered heartbeat.
    Timeout,
}

/// Event surface the client exposes to embedding code.
///
/// All methods default to no-ops, so listeners implement only what they
/// care about. Backpressure notifications may be delivered while the
/// client holds its pool lock; listeners must not call back into the
/// [`Distributor`](crate::Distributor) from `backpressure`.
pub trait StatusListener: Send + Sync {
    /// A connection was torn down. `connections_left` is the pool size
    /// after removal.
    fn connection_lost(
        &self,
        _hostname: &str,
        _port: u16,
        _connections_left: usize,
        _cause: DisconnectCause,
    ) {
    }

    /// Backpressure turned on (every refused queue attempt) or off (once,
    /// when the write queue drains below the high-water mark).
    fn backpressure(&self, _on: bool) {}

    /// A response arrived for a call that no longer has a bookkeeping entry,
    /// typically because it already timed out. The original callback is not
    /// invoked.
    fn late_procedure_response(&self, _response: &ClientResponse, _hostname: &str, _port: u16) {}

    /// A completion handler returned an error.
    fn uncaught_error(
        &self,
        _callback: &dyn ProcedureCallback,
        _response: &ClientResponse,
        _error: &CallbackError,
    ) {
    }
}
