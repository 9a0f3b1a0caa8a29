use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridlinkError {
    #[error("no connections")]
    NoConnections,

    #[error("connection to database host ({0}) was lost")]
    ConnectionLost(String),

    #[error("no response received in the allotted time (set to {0} ms)")]
    ConnectionTimeout(u64),

    #[error("authentication rejected by {host}: {reason}")]
    AuthFailed { host: String, reason: String },

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error(
        "cluster instance id mismatch. Current is {current_timestamp},{current_addr} \
         and server's was {server_timestamp},{server_addr}"
    )]
    ClusterMismatch {
        current_timestamp: i64,
        current_addr: i32,
        server_timestamp: i64,
        server_addr: i32,
    },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GridlinkError>;
