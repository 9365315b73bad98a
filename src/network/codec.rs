// Length-prefixed framing for peer streams
//
// Each frame is a 4-byte big-endian payload length followed by the payload.
// Partial reads are absorbed by `read_exact`; oversized frames are refused
// before any payload is buffered.

use crate::network::PeerError;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub const FRAME_HEADER_LEN: usize = 4;

/// Write one frame and flush
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max_frame_bytes: usize,
) -> Result<(), PeerError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max_frame_bytes {
        return Err(PeerError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame_bytes,
        });
    }

    let len = u32::try_from(payload.len()).map_err(|_| PeerError::FrameTooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// Waits indefinitely for the first header byte; once a frame has started the
/// remainder must arrive within `frame_timeout`. Returns `Ok(None)` when the
/// stream ends cleanly between frames.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
    frame_timeout: Duration,
) -> Result<Option<Vec<u8>>, PeerError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];

    match reader.read_exact(&mut header[..1]).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let body = async {
        reader.read_exact(&mut header[1..]).await?;

        let len = u32::from_be_bytes(header) as usize;
        if len > max_frame_bytes {
            return Err(PeerError::FrameTooLarge {
                size: len,
                limit: max_frame_bytes,
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(payload)
    };

    match timeout(frame_timeout, body).await {
        Ok(result) => result.map(Some),
        Err(_) => Err(PeerError::Timeout),
    }
}
