//! # Weft
//!
//! The unified client adapter for the Weft execution fabric: deterministic
//! sessions over a binary, length-framed wire protocol.
//!
//! ## Overview
//!
//! A client negotiates a session with an execution engine, submits
//! execution requests, and receives results whose digests are byte-identical
//! across repeated runs, processes, and implementing languages:
//!
//! - **Negotiation**: a versioned HELLO / HELLO-ACK handshake that fails
//!   closed on any capability, contract, or hash-primitive mismatch
//! - **Transport**: length-prefixed frames with backpressure, timeouts, and
//!   size limits
//! - **Correlation**: multiple in-flight requests on one connection, paired
//!   to completions by id
//! - **Replay verification**: fingerprint comparison with structured diffs
//!   instead of bare booleans
//!
//! ## Usage
//!
//! ```rust,no_run
//! use weft::{Client, ClientConfig, ExecRequest};
//! use weft_session::Workflow;
//!
//! async fn example(stream: tokio::net::TcpStream) -> anyhow::Result<()> {
//!     // Handshake; fails closed on any determinism-contract mismatch.
//!     let client = Client::connect(stream, ClientConfig::default()).await?;
//!
//!     let workflow = Workflow {
//!         name: "nightly-report".into(),
//!         version: "1.0.0".into(),
//!         steps: vec![],
//!     };
//!     let result = client.execute(&ExecRequest::new("run-1", workflow)).await?;
//!     println!("digest: {}", result.result_digest);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! The component crates are re-exported for convenience:
//!
//! - `weft::core` - determinism primitives (canonical values, hashing, PRNG)
//! - `weft::wire` - framing and frame streams
//! - `weft::session` - protocol messages and negotiation

pub mod breaker;
pub mod client;
pub mod connection;
pub mod error;
pub mod replay;
pub mod retry;

// Re-export component crates
pub use weft_core as core;
pub use weft_session as session;
pub use weft_wire as wire;

// Re-export main types for convenience
pub use breaker::{BreakerOptions, CircuitBreaker, CircuitState};
pub use client::{Client, ClientConfig, ExecRequest, RunHandle};
pub use connection::ConnectionState;
pub use error::{Result, WeftError};
pub use replay::{
    require_replay_equivalent, verify_digest, verify_replay, EventDiff, EventDiffKind,
    ReplayReport,
};
pub use retry::{JitterSource, RetryPolicy, SeededJitter, ThreadRngJitter};

// Re-export commonly used component types
pub use weft_core::{
    canonicalize, combine_hashes, equal, hash_string, serialize, CanonicalValue,
    DeterministicMap, Fingerprint, HashStream, SeededRng, HASH_PRIMITIVE,
};
pub use weft_session::{
    Encoding, ExecResultPayload, RunStatus, Session, SessionState, Workflow, WorkflowStep,
};
