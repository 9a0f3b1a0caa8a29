use serde::{Deserialize, Serialize};

use super::table::ResultTable;

/// Completion status of a stored-procedure invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    UserAbort,
    GracefulFailure,
    UnexpectedFailure,
    ConnectionLost,
    ServerUnavailable,
    ConnectionTimeout,
}

impl ResponseStatus {
    /// Numeric wire code, kept for parity with the server protocol.
    pub fn code(self) -> i8 {
        match self {
            ResponseStatus::Success => 1,
            ResponseStatus::UserAbort => -1,
            ResponseStatus::GracefulFailure => -2,
            ResponseStatus::UnexpectedFailure => -3,
            ResponseStatus::ConnectionLost => -4,
            ResponseStatus::ServerUnavailable => -5,
            ResponseStatus::ConnectionTimeout => -6,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(ResponseStatus::Success),
            -1 => Some(ResponseStatus::UserAbort),
            -2 => Some(ResponseStatus::GracefulFailure),
            -3 => Some(ResponseStatus::UnexpectedFailure),
            -4 => Some(ResponseStatus::ConnectionLost),
            -5 => Some(ResponseStatus::ServerUnavailable),
            -6 => Some(ResponseStatus::ConnectionTimeout),
            _ => None,
        }
    }

    /// An abort is the transaction's own doing, not an infrastructure error.
    pub fn is_abort(self) -> bool {
        matches!(
            self,
            ResponseStatus::UserAbort | ResponseStatus::GracefulFailure
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientResponse {
    pub client_handle: i64,
    pub status: ResponseStatus,
    pub status_string: Option<String>,
    pub results: Vec<ResultTable>,
    /// Round trip measured within the cluster, in milliseconds
    pub cluster_roundtrip_ms: i32,
    /// Round trip from client queue to callback invocation; stamped by the
    /// client before delivery, never sent by the server
    #[serde(default)]
    pub client_roundtrip_ms: i32,
}

impl ClientResponse {
    pub fn success(client_handle: i64, results: Vec<ResultTable>, cluster_roundtrip_ms: i32) -> Self {
        ClientResponse {
            client_handle,
            status: ResponseStatus::Success,
            status_string: None,
            results,
            cluster_roundtrip_ms,
            client_roundtrip_ms: 0,
        }
    }

    pub fn failure(client_handle: i64, status: ResponseStatus, status_string: impl Into<String>) -> Self {
        ClientResponse {
            client_handle,
            status,
            status_string: Some(status_string.into()),
            results: Vec::new(),
            cluster_roundtrip_ms: 0,
            client_roundtrip_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
