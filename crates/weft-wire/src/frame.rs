//! Binary frame format.
//!
//! Frame layout:
//! ```text
//! +--------+--------+--------+--------+
//! | Payload Length (4 bytes, BE)      |
//! +--------+--------+--------+--------+
//! | Type (1 byte) | Payload ...       |
//! +--------+--------+--------+--------+
//! ```
//!
//! One frame carries exactly one protocol message. The length field counts
//! payload bytes only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

/// Maximum frame payload size (64 MiB). Prevents memory exhaustion from a
/// hostile or broken peer.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Header size: length (4) + type (1).
pub const HEADER_SIZE: usize = 5;

/// Frame types carried on the wire.
///
/// This is a closed set: unknown bytes decode to a distinct error, never a
/// silent skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Client hello (session negotiation).
    Hello = 0x01,
    /// Engine hello acknowledgment.
    HelloAck = 0x02,
    /// Execution request.
    ExecRequest = 0x10,
    /// Execution result.
    ExecResult = 0x11,
    /// Explicit cancellation of engine-side work.
    Cancel = 0x12,
    /// Error response.
    Error = 0xFF,
}

impl FrameType {
    /// Parse from a wire byte. Returns `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Hello),
            0x02 => Some(Self::HelloAck),
            0x10 => Some(Self::ExecRequest),
            0x11 => Some(Self::ExecResult),
            0x12 => Some(Self::Cancel),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// One wire frame: a type tag and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, validating the payload against [`MAX_FRAME_BYTES`].
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Result<Self, WireError> {
        let payload = payload.into();
        if payload.len() as u64 > MAX_FRAME_BYTES as u64 {
            return Err(WireError::FrameTooLarge {
                size: payload.len() as u64,
                max: MAX_FRAME_BYTES as u64,
            });
        }
        Ok(Self {
            frame_type,
            payload,
        })
    }

    /// Total encoded size of this frame.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the frame into `dst`.
    ///
    /// The size limit is re-checked before anything is written; on failure
    /// `dst` is untouched (no partial write).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), WireError> {
        if self.payload.len() as u64 > MAX_FRAME_BYTES as u64 {
            return Err(WireError::FrameTooLarge {
                size: self.payload.len() as u64,
                max: MAX_FRAME_BYTES as u64,
            });
        }

        dst.reserve(self.encoded_len());
        dst.put_u32(self.payload.len() as u32);
        dst.put_u8(self.frame_type.to_u8());
        dst.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode one frame from `src`, consuming its bytes.
    ///
    /// Returns `Ok(None)` when more data is needed; the buffer is left
    /// intact so partial reads accumulate until a full frame is assembled.
    /// The declared length is validated before any payload is extracted.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, WireError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if declared_len > MAX_FRAME_BYTES {
            return Err(WireError::ProtocolViolation(format!(
                "declared payload length {declared_len} exceeds limit {MAX_FRAME_BYTES}"
            )));
        }

        let frame_type = FrameType::from_u8(src[4]).ok_or(WireError::UnknownFrameType(src[4]))?;

        let total_len = HEADER_SIZE + declared_len as usize;
        if src.len() < total_len {
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(declared_len as usize).freeze();

        Ok(Some(Self {
            frame_type,
            payload,
        }))
    }
}

// Compile-time assertions for the wire contract.
const _ASSERT_HEADER_SIZE: () = assert!(HEADER_SIZE == 5, "header must be 5 bytes");
const _ASSERT_MAX_FRAME: () =
    assert!(MAX_FRAME_BYTES == 64 * 1024 * 1024, "frame cap must be 64 MiB");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new(FrameType::ExecRequest, &b"payload bytes"[..]).unwrap();

        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.encoded_len());

        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_send_size_guard_before_write() {
        let oversized = vec![0u8; (MAX_FRAME_BYTES + 1) as usize];
        let result = Frame::new(FrameType::ExecRequest, oversized);
        assert!(matches!(result, Err(WireError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_recv_size_guard_without_allocation() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_BYTES + 1);
        buf.put_u8(FrameType::Hello.to_u8());

        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(WireError::ProtocolViolation(_))));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u8(0x7E);

        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(WireError::UnknownFrameType(0x7E))));
    }

    #[test]
    fn test_incomplete_header_needs_more_data() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_incomplete_payload_needs_more_data() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_u8(FrameType::Hello.to_u8());
        buf.extend_from_slice(b"half");

        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Buffer intact until the rest arrives.
        assert_eq!(buf.len(), HEADER_SIZE + 4);

        buf.extend_from_slice(b"insix.");
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"halfinsix.");
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let first = Frame::new(FrameType::Hello, &b"one"[..]).unwrap();
        let second = Frame::new(FrameType::Cancel, &b"two"[..]).unwrap();

        let mut buf = BytesMut::new();
        first.encode(&mut buf).unwrap();
        second.encode(&mut buf).unwrap();

        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), second);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_frame_type_roundtrip() {
        for frame_type in [
            FrameType::Hello,
            FrameType::HelloAck,
            FrameType::ExecRequest,
            FrameType::ExecResult,
            FrameType::Cancel,
            FrameType::Error,
        ] {
            assert_eq!(FrameType::from_u8(frame_type.to_u8()), Some(frame_type));
        }
        assert_eq!(FrameType::from_u8(0x33), None);
    }

    #[test]
    fn test_empty_payload_frame() {
        let frame = Frame::new(FrameType::Cancel, Bytes::new()).unwrap();
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
    }
}
