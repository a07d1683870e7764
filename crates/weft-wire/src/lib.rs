//! # Weft Wire
//!
//! Length-prefixed binary framing for the Weft protocol.
//!
//! Wire unit: `[u32 big-endian payload length][u8 frame type][payload]`.
//! Frames are capped at [`MAX_FRAME_BYTES`] in both directions: oversize
//! sends fail locally before a single byte leaves the process, and oversize
//! declared lengths on the receive path abort the connection before any
//! allocation.
//!
//! This crate knows nothing about payload contents; message semantics live
//! in `weft-session`.

pub mod error;
pub mod frame;
pub mod stream;

pub use error::WireError;
pub use frame::{Frame, FrameType, HEADER_SIZE, MAX_FRAME_BYTES};
pub use stream::{FrameReader, FrameWriter};
