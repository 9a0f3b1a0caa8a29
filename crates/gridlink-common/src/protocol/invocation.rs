//! Stored-procedure invocation record.

use serde::{Deserialize, Serialize};

/// Client handle reserved for internal heartbeat invocations.
///
/// The inbound path recognizes this handle and never looks it up in the
/// outstanding-call table, so callers must never use it.
pub const HEARTBEAT_HANDLE: i64 = i64::MAX;

/// System procedure invoked on an idle connection to confirm liveness.
pub const HEARTBEAT_PROCEDURE: &str = "@Ping";

/// A stored-procedure invocation to be queued on a cluster connection.
///
/// The `client_handle` is chosen by the caller and must be unique among
/// in-flight calls; the matching [`ClientResponse`](crate::ClientResponse)
/// carries it back so the response can be correlated to the completion
/// handler.
///
/// # Example
///
/// ```
/// use gridlink_common::ProcedureInvocation;
/// use serde_json::json;
///
/// let invocation = ProcedureInvocation::new(42, "Vote")
///     .with_params(vec![json!(14), json!("NH")]);
/// assert_eq!(invocation.client_handle, 42);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureInvocation {
    /// Caller-chosen correlation handle, unique among in-flight calls
    pub client_handle: i64,
    /// Name of the stored procedure to run
    pub procedure: String,
    /// Positional procedure parameters
    pub params: Vec<serde_json::Value>,
}

impl ProcedureInvocation {
    pub fn new(client_handle: i64, procedure: impl Into<String>) -> Self {
        Self {
            client_handle,
            procedure: procedure.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    /// The internal liveness probe sent on idle connections.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT_HANDLE, HEARTBEAT_PROCEDURE)
    }
}
