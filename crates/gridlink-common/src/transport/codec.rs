//! Frame codec for the GridLink wire protocol.
//!
//! # Wire Protocol
//!
//! Messages are sent with a 4-byte length prefix (big-endian u32) followed
//! by the JSON-encoded data:
//!
//! ```text
//! [4-byte length] [JSON data]
//! ```
//!
//! Encoding produces a complete frame (prefix included) ready to hand to a
//! write stream; decoding operates on a body that has already been de-framed
//! by the reactor or by one of the `read_frame` helpers below.

use std::io::{Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{GridlinkError, Result};
use crate::protocol::invocation::ProcedureInvocation;
use crate::protocol::response::ClientResponse;

/// Maximum accepted frame body (100 MB), guarding against absurd
/// length prefixes from a confused or hostile peer.
pub const MAX_FRAME_BYTES: usize = 100 * 1024 * 1024;

/// Stateless codec for invocations and responses.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode an invocation into a complete length-prefixed frame.
    pub fn encode_invocation(invocation: &ProcedureInvocation) -> Result<Vec<u8>> {
        Ok(frame(serde_json::to_vec(invocation)?))
    }

    /// Encode a response into a complete length-prefixed frame.
    pub fn encode_response(response: &ClientResponse) -> Result<Vec<u8>> {
        Ok(frame(serde_json::to_vec(response)?))
    }

    /// Decode a de-framed body into an invocation.
    pub fn decode_invocation(body: &[u8]) -> Result<ProcedureInvocation> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Decode a de-framed body into a response.
    pub fn decode_response(body: &[u8]) -> Result<ClientResponse> {
        Ok(serde_json::from_slice(body)?)
    }
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&body);
    framed
}

fn check_frame_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_BYTES {
        return Err(GridlinkError::InvalidFrame(format!(
            "frame too large: {} bytes (max {} bytes)",
            len, MAX_FRAME_BYTES
        )));
    }
    Ok(())
}

/// Write a length-prefixed frame (blocking).
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame body (blocking).
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    check_frame_len(len)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Write a length-prefixed frame (async).
pub async fn write_frame_async<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame body (async).
pub async fn read_frame_async<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    check_frame_len(len)?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_frame_round_trip() {
        let invocation = ProcedureInvocation::new(7, "Vote").with_params(vec![json!(3)]);

        let framed = FrameCodec::encode_invocation(&invocation).unwrap();
        let len = u32::from_be_bytes(framed[..4].try_into().unwrap()) as usize;
        assert_eq!(len, framed.len() - 4);

        let decoded = FrameCodec::decode_invocation(&framed[4..]).unwrap();
        assert_eq!(invocation, decoded);
    }

    #[test]
    fn test_prefix_is_big_endian() {
        let framed = frame(vec![0u8; 258]);
        assert_eq!(&framed[..4], &[0, 0, 1, 2]);
    }

    #[test]
    fn test_read_write_frame_blocking() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame(&mut cursor).unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_read_write_frame_async() {
        let mut buf = Vec::new();
        write_frame_async(&mut buf, b"world").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame_async(&mut cursor).await.unwrap();
        assert_eq!(body, b"world");
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("frame too large"));
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(b"abc");

        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_frame(&mut cursor).unwrap_err(),
            GridlinkError::Io(_)
        ));
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        assert!(matches!(
            FrameCodec::decode_response(b"not json").unwrap_err(),
            GridlinkError::Serialization(_)
        ));
    }
}
