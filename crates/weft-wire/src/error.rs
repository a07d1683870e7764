//! Error types for the wire layer.

use thiserror::Error;

/// Transport-level errors.
///
/// `Timeout` and `Busy` are retryable by the caller; every other variant is
/// connection-fatal and the connection must be closed without acting on any
/// partial state.
#[derive(Debug, Error)]
pub enum WireError {
    /// Outbound frame exceeds the size limit. Nothing was written.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    /// The peer violated the framing contract (bad length, truncation).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer sent a frame type this implementation does not know.
    #[error("unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// No complete frame arrived within the idle-read window.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The bounded outbound queue is full; the send was not enqueued.
    #[error("outbound queue full")]
    Busy,

    /// The connection closed cleanly between frames.
    #[error("connection closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the caller may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WireError::Timeout(_) | WireError::Busy)
    }
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
