//! Length-prefixed framing for stream transports (Unix sockets, TCP).
//!
//! Wire format: `[u32 BE length][payload]`. The length is the byte count of
//! the payload only (not including the 4-byte header). Payloads are encoded
//! envelopes, see [`crate::codec`].

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default maximum frame size: 64 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Errors that can occur during frame read/write.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u32 },
    /// The connection was closed (EOF before a frame header).
    #[error("connection closed")]
    ConnectionClosed,
}

/// Write one payload as a length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: u32) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let size = payload.len() as u64;
    if size > u64::from(max) {
        return Err(FrameError::TooLarge { size, max });
    }
    writer.write_all(&(size as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R, max: u32) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf);
    if len > max {
        return Err(FrameError::TooLarge {
            size: u64::from(len),
            max,
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
