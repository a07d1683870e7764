//! Hashing: incremental streams, ordered combination, and fingerprints.
//!
//! The production hash primitive is BLAKE3, full stop. Session negotiation
//! refuses any engine that advertises a different primitive, so a fallback
//! can never be substituted silently in a live session.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::serialize;
use crate::error::CoreError;
use crate::value::CanonicalValue;

/// The one hash primitive this deployment agreed on.
pub const HASH_PRIMITIVE: &str = "blake3";

/// An incremental, chainable hash accumulator.
///
/// ```
/// use weft_core::HashStream;
///
/// let mut stream = HashStream::new();
/// stream.update("hello ").unwrap().update("world").unwrap();
/// let digest = stream.finalize().unwrap();
/// assert_eq!(digest, weft_core::hash_string("hello world"));
/// ```
#[derive(Debug, Clone)]
pub struct HashStream {
    hasher: blake3::Hasher,
    finalized: bool,
}

impl HashStream {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            finalized: false,
        }
    }

    /// Feed bytes into the stream. Chainable.
    ///
    /// Fails with `AlreadyFinalized` once `finalize` has been called.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> Result<&mut Self, CoreError> {
        if self.finalized {
            return Err(CoreError::AlreadyFinalized);
        }
        self.hasher.update(data.as_ref());
        Ok(self)
    }

    /// Consume the stream state and return the lowercase hex digest.
    ///
    /// A second call fails with `AlreadyFinalized`.
    pub fn finalize(&mut self) -> Result<String, CoreError> {
        if self.finalized {
            return Err(CoreError::AlreadyFinalized);
        }
        self.finalized = true;
        Ok(hex::encode(self.hasher.finalize().as_bytes()))
    }
}

impl Default for HashStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a string in one shot.
pub fn hash_string(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash raw bytes in one shot.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

/// Hash the ordered concatenation of the inputs.
///
/// Order-sensitive by design: callers needing order independence must sort
/// the inputs themselves before combining.
pub fn combine_hashes<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = blake3::Hasher::new();
    for item in items {
        hasher.update(item.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// An algorithm-prefixed digest string: `"<algorithm>:<hex>"`.
///
/// Produced only over canonical bytes, so equal logical values always yield
/// equal fingerprints regardless of how they were constructed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw bytes with the production primitive.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(format!("{}:{}", HASH_PRIMITIVE, hash_bytes(data)))
    }

    /// Fingerprint a value's canonical serialization.
    pub fn of_value(value: &CanonicalValue) -> Result<Self, CoreError> {
        Ok(Self::of_bytes(&serialize(value)?))
    }

    /// Parse and validate an `<algorithm>:<hex>` string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (algorithm, digest) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidFingerprint(s.to_string()))?;
        if algorithm.is_empty()
            || digest.is_empty()
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(CoreError::InvalidFingerprint(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The algorithm prefix (e.g. `"blake3"`).
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or("")
    }

    /// The hex digest after the prefix.
    pub fn hex_digest(&self) -> &str {
        self.0.split_once(':').map(|(_, d)| d).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.0.len() > 23 { &self.0[..23] } else { &self.0 };
        write!(f, "Fingerprint({shown})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunking_equivalence() {
        let mut chunked = HashStream::new();
        chunked.update("hello ").unwrap().update("world").unwrap();
        let mut whole = HashStream::new();
        whole.update("hello world").unwrap();
        assert_eq!(chunked.finalize().unwrap(), whole.finalize().unwrap());
    }

    #[test]
    fn test_update_after_finalize_fails() {
        let mut stream = HashStream::new();
        stream.update("data").unwrap();
        stream.finalize().unwrap();
        assert!(matches!(
            stream.update("more"),
            Err(CoreError::AlreadyFinalized)
        ));
        assert!(matches!(
            stream.finalize(),
            Err(CoreError::AlreadyFinalized)
        ));
    }

    #[test]
    fn test_hash_string_matches_stream() {
        let mut stream = HashStream::new();
        stream.update("abc").unwrap();
        assert_eq!(stream.finalize().unwrap(), hash_string("abc"));
    }

    #[test]
    fn test_combine_order_sensitive() {
        let ab = combine_hashes(["a", "b"]);
        let ba = combine_hashes(["b", "a"]);
        assert_ne!(ab, ba);
        assert_eq!(ab, combine_hashes(["a", "b"]));
    }

    #[test]
    fn test_fingerprint_prefix_and_parse() {
        let fp = Fingerprint::of_bytes(b"payload");
        assert_eq!(fp.algorithm(), HASH_PRIMITIVE);
        assert_eq!(fp.hex_digest().len(), 64);

        let parsed = Fingerprint::parse(fp.as_str()).unwrap();
        assert_eq!(parsed, fp);

        assert!(Fingerprint::parse("no-separator").is_err());
        assert!(Fingerprint::parse("blake3:not-hex!").is_err());
        assert!(Fingerprint::parse(":abcd").is_err());
    }

    #[test]
    fn test_fingerprint_construction_order_independent() {
        let a = CanonicalValue::from_json(&json!({"x": 1, "y": 2})).unwrap();
        let b = CanonicalValue::from_json(&json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(
            Fingerprint::of_value(&a).unwrap(),
            Fingerprint::of_value(&b).unwrap()
        );
    }
}
