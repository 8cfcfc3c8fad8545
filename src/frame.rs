//! Length-prefixed framing shared by the cache and remote-peer protocols.
//!
//! Every message is a 4-byte big-endian payload length followed by exactly
//! that many payload bytes. Reads loop until the full frame is buffered; a
//! peer closing mid-frame surfaces as an error, never as a short payload.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; a length prefix beyond this is treated as
/// a corrupt stream rather than an allocation request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write `payload` as one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Read one frame, blocking until the declared length is fully received.
///
/// A connection dropped before the frame completes yields
/// `io::ErrorKind::UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_prefix = [0u8; 4];
    reader.read_exact(&mut len_prefix).await?;
    let len = u32::from_be_bytes(len_prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit {}", len, MAX_FRAME_LEN),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
