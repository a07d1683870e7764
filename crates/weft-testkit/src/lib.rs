//! # Weft Testkit
//!
//! Testing utilities for the Weft execution fabric:
//!
//! - [`vectors`] - golden canonicalization/fingerprint vectors that every
//!   implementation must reproduce byte for byte
//! - [`generators`] - proptest strategies for canonical value trees
//! - [`engine`] - an in-process stub engine serving the full protocol over
//!   `tokio::io::duplex`, for end-to-end handshake and replay tests

pub mod engine;
pub mod generators;
pub mod vectors;

pub use engine::{StubEngine, StubEngineConfig};
pub use generators::{arb_canonical_value, arb_flat_object};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
