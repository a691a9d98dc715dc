//! Length-prefix framing shared by every transport.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload
//! bytes. Both directions enforce [`MAX_FRAME_LEN`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Frames larger than this are refused on both read and write.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    if bytes.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(bytes.len()));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. A clean EOF surfaces as [`Error::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send,
{
    let len = reader.read_u32().await.map_err(eof_as_closed)? as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(eof_as_closed)?;
    Ok(buf)
}

fn eof_as_closed(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(err)
    }
}
