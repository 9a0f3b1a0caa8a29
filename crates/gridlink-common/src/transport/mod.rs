//! GridLink Transport Layer
//!
//! Three pieces, layered bottom-up:
//!
//! - [`codec`]: the pure frame codec, a 4-byte big-endian length prefix
//!   plus a JSON body, with blocking and async read/write helpers
//! - [`auth`]: the blocking authentication handshake that turns a host/port
//!   pair plus credentials into an [`auth::AuthenticatedSocket`]
//! - [`reactor`]: the I/O subsystem, which registers authenticated sockets,
//!   runs their reader/writer tasks on a dedicated runtime, delivers
//!   de-framed inbound bodies to a [`reactor::FrameHandler`], and keeps
//!   per-connection and global byte/message counters

pub mod auth;
pub mod codec;
pub mod reactor;

pub use auth::{authenticate, AuthenticatedSocket};
pub use codec::FrameCodec;
pub use reactor::{FrameHandler, IoStats, Reactor, ReactorConnection, GLOBAL_STATS_ID};
