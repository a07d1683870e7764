//! Error types for the session module.

use thiserror::Error;

/// Negotiation failures. All of these are fatal: the session never reaches
/// Ready and the connection must be torn down without sending requests.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The engine selected a protocol version the client did not offer.
    #[error("version mismatch: engine selected {selected:?}, client supports {supported:?}")]
    VersionMismatch {
        selected: (u16, u16),
        supported: Vec<(u16, u16)>,
    },

    /// The engine's contract major version differs from ours.
    #[error("contract mismatch: engine {engine}, client compiled against {client}")]
    ContractMismatch { engine: String, client: String },

    /// The engine advertised a hash primitive other than the fixed one.
    ///
    /// Not negotiable. Accepting a different primitive would make every
    /// downstream fingerprint comparison meaningless.
    #[error("hash primitive mismatch: engine offered {offered:?}, required {required:?}")]
    HashPrimitiveMismatch { offered: String, required: String },

    /// A required handshake field was absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors from message encoding/decoding and session-state guards.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Payload serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Payload deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// An operation required a Ready session.
    #[error("session not ready (state: {0})")]
    NotReady(&'static str),

    /// Frame-level failure while building or reading a message.
    #[error(transparent)]
    Wire(#[from] weft_wire::WireError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
