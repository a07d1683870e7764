//! # Weft Session
//!
//! Protocol messages and session negotiation for the Weft execution fabric.
//!
//! A session starts with a HELLO / HELLO-ACK exchange and fails closed on
//! any capability, contract, or hash-primitive mismatch: if the engine does
//! not speak exactly the determinism contract this client was compiled
//! against, Ready is never reached and no request is ever sent.
//!
//! Payloads are CBOR in production; JSON exists purely as a debug aid.

pub mod error;
pub mod fixed;
pub mod messages;
pub mod negotiate;

pub use error::{NegotiationError, SessionError};
pub use fixed::{MicroUsd, Ppm};
pub use messages::{
    Action, CancelPayload, CapabilityFlags, Decision, Encoding, ErrorCode, ErrorPayload,
    ExecRequestPayload, ExecResultPayload, ExecutionControls, ExecutionMetrics, HelloAckPayload,
    HelloPayload, LatencyHistogram, Message, Policy, PolicyCondition, PolicyRule, RunEvent,
    RunStatus, StepType, Workflow, WorkflowStep,
};
pub use negotiate::{
    accept, contract_major, respond, EngineIdentity, Session, SessionState, CONTRACT_VERSION,
    PROTOCOL_VERSIONS,
};
