//! # Weft Core
//!
//! Pure determinism primitives for the Weft execution fabric: canonical
//! values, deterministic ordering, seeded randomness, and hashing.
//!
//! This crate contains no I/O, no networking, no clocks. It is pure
//! computation, and every operation is reproducible: the same input produces
//! the same bytes on every platform, in every process, forever.
//!
//! ## Key Types
//!
//! - [`CanonicalValue`] - Tree-shaped value with sorted object keys
//! - [`DeterministicMap`] - String-keyed map with reproducible iteration
//! - [`SeededRng`] - Reproducible pseudo-random sequences from a string seed
//! - [`HashStream`] - Incremental, chainable BLAKE3 accumulator
//! - [`Fingerprint`] - Algorithm-prefixed digest over canonical bytes
//!
//! ## Canonicalization
//!
//! Structurally equal values always serialize to identical bytes. See the
//! [`canonical`] module for the normalization rules.

pub mod canonical;
pub mod error;
pub mod hash;
pub mod ordering;
pub mod prng;
pub mod value;

pub use canonical::{canonicalize, equal, serialize};
pub use error::CoreError;
pub use hash::{combine_hashes, hash_string, Fingerprint, HashStream, HASH_PRIMITIVE};
pub use ordering::{sorted_entries, sorted_keys, stable_sort_by, DeterministicMap};
pub use prng::SeededRng;
pub use value::{CanonicalValue, MAX_DEPTH};
