//! Error types for Weft Core.

use thiserror::Error;

/// Errors from canonicalization and hashing.
///
/// Every variant here indicates a logic bug in the caller, not a transient
/// condition. None of these are retryable.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The value cannot be represented canonically (NaN, infinity).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// The structure exceeds the maximum nesting depth.
    ///
    /// Tree-shaped values cannot form reference cycles in Rust; this variant
    /// fires on pathologically deep input, which is the observable equivalent.
    #[error("cyclic or pathologically nested structure (depth {depth})")]
    CyclicStructure { depth: usize },

    /// `update` or `finalize` was called on a finalized hash stream.
    #[error("hash stream already finalized")]
    AlreadyFinalized,

    /// A fingerprint string does not have the `<algorithm>:<hex>` shape.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}
