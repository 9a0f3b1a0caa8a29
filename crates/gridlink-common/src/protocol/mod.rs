//! GridLink Protocol Definitions
//!
//! This module defines the core protocol types exchanged between the client
//! and a GridLink cluster, plus the error type used throughout the system.
//!
//! # Protocol Types
//!
//! - **[`ProcedureInvocation`]**: a stored-procedure call with a
//!   caller-chosen 64-bit client handle, a procedure name, and parameters
//! - **[`ClientResponse`]**: the answer to an invocation, carrying the same
//!   client handle, a status, result tables, and round-trip measurements
//! - **[`ResultTable`]**: a tagged-column table used both for procedure
//!   results and for the client's statistics views
//! - **[`GridlinkError`]**: the error enum surfaced to callers
//!
//! # Reserved handle
//!
//! The client handle `i64::MAX` is reserved for internal heartbeats
//! (procedure [`HEARTBEAT_PROCEDURE`]) and must never be used by a caller.

pub mod error;
pub mod invocation;
pub mod response;
pub mod table;

#[cfg(test)]
mod tests;

pub use error::{GridlinkError, Result};
pub use invocation::{ProcedureInvocation, HEARTBEAT_HANDLE, HEARTBEAT_PROCEDURE};
pub use response::{ClientResponse, ResponseStatus};
pub use table::{ColumnInfo, ColumnType, ColumnValue, ResultTable};
