//! RPC frames exchanged on locator TCP channels.
//!
//! Each frame is a big-endian `u32` length followed by that many bytes of
//! JSON. The same framing carries client requests (`resolve`,
//! `synchronize`) and locator responses and pushes.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorCode, LocatorError};
use crate::service::{ServiceInfo, ServiceTable};

/// Upper bound on a single frame body. Full service tables are small; this
/// exists to reject garbage length prefixes before allocating.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// One-shot lookup of a single service.
    Resolve { name: String },
    /// Subscribe to the full service table.
    Synchronize,
    /// Answer to `Resolve`.
    Resolved { info: ServiceInfo },
    /// Full service table, sent in answer to `Synchronize` and on every
    /// registry change afterwards.
    Chunk { table: ServiceTable },
    /// Request failed.
    Error { code: ErrorCode, message: String },
    /// The sender is closing this channel.
    Choke,
}

impl Frame {
    pub fn error(err: &LocatorError) -> Self {
        Frame::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Resolve { .. } => "resolve",
            Frame::Synchronize => "synchronize",
            Frame::Resolved { .. } => "resolved",
            Frame::Chunk { .. } => "chunk",
            Frame::Error { .. } => "error",
            Frame::Choke => "choke",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds maximum {MAX_FRAME_LEN}")]
    TooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<FrameError> for LocatorError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Malformed(e) => LocatorError::Decode(e.to_string()),
            other => LocatorError::TransportFailure(other.to_string()),
        }
    }
}

/// Serialize a frame into its length-prefixed wire form.
pub fn encode_frame(frame: &Frame) -> Result<BytesMut, FrameError> {
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(body.len()));
    }
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    Ok(buf)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode_frame(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
