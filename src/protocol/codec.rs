//! Async Frame I/O
//!
//! Reads and writes complete frames over any tokio byte stream. TCP is a
//! stream protocol, so one `read()` is not guaranteed to fill a buffer;
//! both the header and the payload are read with `read_exact`, which
//! loops until the requested count arrives or the peer closes.
//!
//! ## Malformed Frames
//!
//! A header whose magic bytes do not verify still carries a readable
//! length field. `read_frame` consumes that many payload bytes anyway so
//! a single malformed frame cannot desynchronize the connection, then
//! surfaces it as [`FrameType::Invalid`] for the session to log.

use crate::protocol::frame::{decode_header, declared_len, Frame, ProtocolError, HEADER_LEN};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// I/O failure on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame could not be encoded (oversized payload).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the stream at a frame boundary.
    #[error("peer disconnected")]
    Disconnected,
}

/// Reads one complete frame: exactly 6 header bytes, then exactly the
/// declared number of payload bytes.
///
/// Returns [`CodecError::Disconnected`] when the stream ends cleanly
/// before the first header byte.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::Disconnected);
        }
        Err(e) => return Err(e.into()),
    }

    let len = declared_len(&header);
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    match decode_header(&header) {
        Ok((frame_type, _)) => Ok(Frame::new(frame_type, Bytes::from(payload))),
        Err(ProtocolError::BadMagic(_, _)) => Ok(Frame::invalid(len)),
        Err(e) => Err(e.into()),
    }
}

/// Writes one complete frame and flushes the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<usize, CodecError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{FrameType, MAGIC};

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let frame = Frame::command("checkUser-Bob");
        write_frame(&mut client, &frame).await.unwrap();

        let read = read_frame(&mut server).await.unwrap();
        assert_eq!(read, frame);
        assert_eq!(read.payload_text(), "checkUser-Bob");
    }

    #[tokio::test]
    async fn test_read_across_partial_writes() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let frame = Frame::file(vec![0xAB; 300]);
        let bytes = frame.encode().unwrap();

        // Dribble the frame out in small chunks; read_frame must loop.
        let reader = tokio::spawn(async move { read_frame(&mut server).await.unwrap() });
        for chunk in bytes.chunks(7) {
            client.write_all(chunk).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
        }

        let read = reader.await.unwrap();
        assert_eq!(read.frame_type, FrameType::FileTransfer);
        assert_eq!(read.payload.len(), 300);
    }

    #[tokio::test]
    async fn test_bad_magic_yields_invalid_not_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let mut bytes = Frame::answer("hello").encode().unwrap();
        bytes[0] = b'?';
        client.write_all(&bytes).await.unwrap();
        // A well-formed frame right behind the malformed one.
        write_frame(&mut client, &Frame::answer("next"))
            .await
            .unwrap();

        let invalid = read_frame(&mut server).await.unwrap();
        assert_eq!(invalid.frame_type, FrameType::Invalid);

        // The stream stays in sync: the next frame decodes normally.
        let next = read_frame(&mut server).await.unwrap();
        assert_eq!(next.frame_type, FrameType::Answer);
        assert_eq!(next.payload_text(), "next");
    }

    #[tokio::test]
    async fn test_eof_before_header_is_disconnect() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(CodecError::Disconnected)));
    }

    #[tokio::test]
    async fn test_eof_mid_payload_is_io_error() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let bytes = Frame::answer("truncated").encode().unwrap();
        client.write_all(&bytes[..HEADER_LEN + 3]).await.unwrap();
        drop(client);

        let result = read_frame(&mut server).await;
        assert!(matches!(result, Err(CodecError::Io(_))));
    }

    #[tokio::test]
    async fn test_wire_header_layout() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &Frame::answer("ok")).await.unwrap();

        let mut raw = [0u8; 8];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw[..2], &MAGIC);
        assert_eq!(raw[2] >> 6, 3); // Answer type id
        assert_eq!(&raw[3..6], &[0, 0, 2]); // big-endian length 2
        assert_eq!(&raw[6..], b"ok");
    }
}
