//! Async frame streams: buffered reading with an idle timeout, whole-frame
//! writes.
//!
//! A reader and a writer are deliberately separate types so a connection can
//! split its I/O object and serialize reads and writes independently on one
//! owning task.

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;
use crate::frame::Frame;

/// Initial capacity for the read assembly buffer.
const READ_BUF_CAPACITY: usize = 8 * 1024;

/// Reads frames from a byte stream, assembling partial reads.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    idle_timeout: Duration,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(io: R, idle_timeout: Duration) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_BUF_CAPACITY),
            idle_timeout,
        }
    }

    /// Read the next complete frame.
    ///
    /// Partial reads are buffered until a full frame is assembled. If no
    /// bytes arrive within the idle window the call fails with `Timeout`,
    /// which is distinct from a protocol error: the connection may still be
    /// healthy. A clean EOF between frames yields `Closed`; an EOF inside a
    /// frame is a `ProtocolViolation`.
    pub async fn read_frame(&mut self) -> Result<Frame, WireError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf)? {
                return Ok(frame);
            }

            let read = tokio::time::timeout(self.idle_timeout, self.io.read_buf(&mut self.buf))
                .await
                .map_err(|_| WireError::Timeout("idle read window elapsed".into()))??;

            if read == 0 {
                if self.buf.is_empty() {
                    return Err(WireError::Closed);
                }
                tracing::warn!(buffered = self.buf.len(), "connection closed mid-frame");
                return Err(WireError::ProtocolViolation(
                    "connection closed mid-frame".into(),
                ));
            }
        }
    }
}

/// Writes whole frames to a byte stream.
pub struct FrameWriter<W> {
    io: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(io: W) -> Self {
        Self { io }
    }

    /// Encode and write one frame, then flush.
    ///
    /// The size limit is validated before any byte reaches the stream; an
    /// oversize frame fails with `FrameTooLarge` and writes nothing.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), WireError> {
        // encode() validates before reserving, so an oversize frame neither
        // allocates nor writes.
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Flush any buffered bytes and shut the write half down.
    pub async fn shutdown(&mut self) -> Result<(), WireError> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;
    use bytes::Bytes;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, TIMEOUT);

        let frame = Frame::new(FrameType::Hello, &b"greetings"[..]).unwrap();
        writer.write_frame(&frame).await.unwrap();

        let received = reader.read_frame().await.unwrap();
        assert_eq!(received, frame);
    }

    #[tokio::test]
    async fn test_fragmented_delivery_is_assembled() {
        let (mut raw, server) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(server, TIMEOUT);

        let frame = Frame::new(FrameType::ExecResult, &b"fragmented payload"[..]).unwrap();
        let mut encoded = BytesMut::new();
        frame.encode(&mut encoded).unwrap();

        let handle = tokio::spawn(async move {
            for chunk in encoded.chunks(3) {
                raw.write_all(chunk).await.unwrap();
                raw.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            raw
        });

        let received = reader.read_frame().await.unwrap();
        assert_eq!(received, frame);
        drop(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_idle_timeout_is_distinct() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, Duration::from_millis(20));

        let result = reader.read_frame().await;
        assert!(matches!(result, Err(WireError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_clean_eof_between_frames() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut reader = FrameReader::new(server, TIMEOUT);

        let result = reader.read_frame().await;
        assert!(matches!(result, Err(WireError::Closed)));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_protocol_violation() {
        let (mut client, server) = tokio::io::duplex(64);
        // Header promising 100 payload bytes, then hang up.
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        client.write_all(&[FrameType::Hello.to_u8()]).await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server, TIMEOUT);
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(WireError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn test_oversize_send_writes_nothing() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);

        let oversized = Frame {
            frame_type: FrameType::ExecRequest,
            payload: Bytes::from(vec![0u8; (crate::frame::MAX_FRAME_BYTES + 1) as usize]),
        };
        let result = writer.write_frame(&oversized).await;
        assert!(matches!(result, Err(WireError::FrameTooLarge { .. })));

        // Peer sees a clean close, not a partial frame.
        drop(writer);
        let mut reader = FrameReader::new(server, TIMEOUT);
        assert!(matches!(reader.read_frame().await, Err(WireError::Closed)));
    }
}
