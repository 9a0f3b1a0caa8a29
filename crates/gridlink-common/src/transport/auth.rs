//! Blocking authentication handshake.
//!
//! Connection creation is the one deliberately synchronous path in the
//! client: the caller blocks through DNS resolution, TCP connect, and the
//! login exchange, and only a fully authenticated socket is ever handed to
//! the reactor. The handshake itself is one request/response pair over the
//! standard framed wire.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::codec;
use crate::protocol::error::{GridlinkError, Result};

/// Timeout applied to each connect attempt and to the login exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub user: String,
    /// Pre-hashed password; the client never sees or picks a digest.
    pub hashed_password: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Zero on success; any other value rejects the connection.
    pub status: i8,
    pub error: Option<String>,
    /// Server-side id of the node that accepted the connection
    pub host_id: i32,
    /// Server-assigned id for this connection
    pub connection_id: i64,
    /// Cluster start timestamp, half of the cluster instance id
    pub cluster_timestamp: i64,
    /// Cluster leader address, the other half of the cluster instance id
    pub cluster_addr: i32,
    pub build_string: String,
}

/// A connected, authenticated socket plus everything the server reported
/// during login.
#[derive(Debug)]
pub struct AuthenticatedSocket {
    pub socket: TcpStream,
    pub hostname: String,
    pub port: u16,
    pub host_id: i32,
    pub connection_id: i64,
    pub cluster_timestamp: i64,
    pub cluster_addr: i32,
    pub build_string: String,
}

/// Resolve, connect, and log in to a cluster node.
///
/// The address may resolve to multiple socket addresses; each is tried in
/// turn until one accepts the TCP connection. Handshake timeouts are
/// cleared before the socket is returned; steady-state liveness is the
/// heartbeat machinery's job, not the socket's.
///
/// # Errors
///
/// - [`GridlinkError::UnknownHost`] if the name resolves to nothing
/// - [`GridlinkError::AuthFailed`] if the server rejects the credentials
/// - [`GridlinkError::Io`] for connect or handshake I/O failures
pub fn authenticate(host: &str, port: u16, user: &str, hashed_password: &[u8]) -> Result<AuthenticatedSocket> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| GridlinkError::UnknownHost(host.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(GridlinkError::UnknownHost(host.to_string()));
    }

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT) {
            Ok(socket) => return login(socket, host, port, user, hashed_password),
            Err(e) => last_err = Some(e),
        }
    }

    Err(GridlinkError::Io(last_err.expect("at least one connect attempt")))
}

fn login(
    mut socket: TcpStream,
    host: &str,
    port: u16,
    user: &str,
    hashed_password: &[u8],
) -> Result<AuthenticatedSocket> {
    socket.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    socket.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let request = LoginRequest {
        user: user.to_string(),
        hashed_password: hashed_password.to_vec(),
    };
    codec::write_frame(&mut socket, &serde_json::to_vec(&request)?)?;

    let body = codec::read_frame(&mut socket)?;
    let response: LoginResponse = serde_json::from_slice(&body)?;

    if response.status != 0 {
        return Err(GridlinkError::AuthFailed {
            host: host.to_string(),
            reason: response
                .error
                .unwrap_or_else(|| format!("status {}", response.status)),
        });
    }

    socket.set_read_timeout(None)?;
    socket.set_write_timeout(None)?;

    Ok(AuthenticatedSocket {
        socket,
        hostname: host.to_string(),
        port,
        host_id: response.host_id,
        connection_id: response.connection_id,
        cluster_timestamp: response.cluster_timestamp,
        cluster_addr: response.cluster_addr,
        build_string: response.build_string,
    })
}
