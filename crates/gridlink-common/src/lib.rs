//! GridLink Common Types and Transport
//!
//! This crate provides the protocol definitions and the network layer shared
//! by the GridLink client stack.
//!
//! # Overview
//!
//! GridLink is a client-side multiplexing transport for a clustered
//! transactional database. Callers submit stored-procedure invocations which
//! are fanned out over a small pool of persistent connections; responses come
//! back asynchronously and are correlated to the caller's completion handler
//! by a 64-bit client handle. This crate contains the pieces both ends of
//! that pipeline agree on:
//!
//! - **Protocol layer**: invocation and response records, the tagged-column
//!   result table, and the error type
//! - **Transport layer**: the length-prefixed frame codec, the blocking
//!   authentication handshake, and the reactor that owns connection I/O
//!
//! # Wire format
//!
//! Every message is a 4-byte big-endian length prefix followed by a
//! JSON-encoded body:
//!
//! ```text
//! [4-byte length] [JSON data]
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
