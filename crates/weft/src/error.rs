//! Error types for the Weft client adapter.
//!
//! The taxonomy mirrors the protocol's trust boundaries:
//! - negotiation failures are fatal; Ready is never reached
//! - transport failures are connection-fatal except `Timeout`/`Busy`
//! - request failures are scoped to one request; the connection stays usable
//! - determinism failures are never swallowed and never retried

use std::time::Duration;
use thiserror::Error;

use weft_core::CoreError;
use weft_session::{ErrorCode, NegotiationError, SessionError};
use weft_wire::WireError;

use crate::replay::ReplayReport;

/// Unified error type for client operations.
#[derive(Debug, Error)]
pub enum WeftError {
    /// Handshake refused. The session never reached Ready and no request
    /// was sent.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Wire(#[from] WireError),

    /// Message encoding/decoding or session-state failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Canonicalization or hashing failure. Indicates a logic bug; never
    /// auto-retried.
    #[error("determinism error: {0}")]
    Core(#[from] CoreError),

    /// The request's client-side deadline expired. Local bookkeeping was
    /// freed; engine-side work may still be running until a Cancel is sent.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The engine answered with an Error payload for this request.
    #[error("engine rejected request ({code:?}): {message}")]
    EngineRejected { code: ErrorCode, message: String },

    /// A result digest carried a different algorithm prefix than the
    /// session negotiated. The result is rejected outright.
    #[error("result digest algorithm {got:?} does not match negotiated {expected:?}")]
    DigestPrimitiveMismatch { got: String, expected: String },

    /// Two supposedly equivalent runs produced different digests.
    #[error("digest mismatch on replay: {} event divergence(s)", .report.event_diffs.len())]
    ReplayMismatch { report: ReplayReport },

    /// The circuit breaker is open for this endpoint.
    #[error("circuit open; next probe in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The connection task is gone.
    #[error("connection closed")]
    ConnectionClosed,
}

impl WeftError {
    /// Whether the caller may retry the operation (with backoff).
    pub fn is_retryable(&self) -> bool {
        match self {
            WeftError::Wire(e) => e.is_retryable(),
            WeftError::RequestTimeout(_) => true,
            WeftError::EngineRejected { code, .. } => matches!(
                code,
                ErrorCode::Timeout | ErrorCode::ResourceExhausted | ErrorCode::ServiceUnavailable
            ),
            _ => false,
        }
    }

    /// One-line remediation hint for user-facing surfaces.
    ///
    /// Raw internals are only exposed for determinism diagnostics, which are
    /// aimed at engineers; negotiation and transport failures get hints.
    pub fn remediation(&self) -> &'static str {
        match self {
            WeftError::Negotiation(NegotiationError::VersionMismatch { .. }) => {
                "upgrade the client or the engine so they share a protocol version"
            }
            WeftError::Negotiation(NegotiationError::ContractMismatch { .. }) => {
                "client and engine were built against different contract majors; align deployments"
            }
            WeftError::Negotiation(NegotiationError::HashPrimitiveMismatch { .. }) => {
                "the engine is configured with a foreign hash primitive; fix the engine deployment"
            }
            WeftError::Negotiation(NegotiationError::MissingField(_)) => {
                "the engine sent an incomplete handshake; check engine version and logs"
            }
            WeftError::Wire(WireError::FrameTooLarge { .. }) => {
                "shrink the request payload or split the workflow"
            }
            WeftError::Wire(WireError::Busy) => "the connection is backlogged; retry with backoff",
            WeftError::Wire(_) | WeftError::ConnectionClosed => {
                "reconnect; if this persists check network and engine health"
            }
            WeftError::RequestTimeout(_) => {
                "retry, raise the request timeout, or send Cancel to stop engine-side work"
            }
            WeftError::EngineRejected { .. } => "inspect the engine error code and message",
            WeftError::CircuitOpen { .. } => "wait for the cool-down before retrying",
            WeftError::Core(_)
            | WeftError::DigestPrimitiveMismatch { .. }
            | WeftError::ReplayMismatch { .. } => {
                "determinism violation; capture the diff and file it against the engine"
            }
            WeftError::Session(_) => "check session state; reconnect if the session is closed",
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, WeftError>;
