//! Protocol message payloads.
//!
//! All payloads use CBOR encoding in production; JSON is a debug fallback
//! advertised in `Hello.preferred_encoding`. Deterministic maps are
//! `BTreeMap` throughout so the same logical message always serializes to
//! the same bytes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::BitOr;

use weft_wire::{Frame, FrameType};

use crate::error::SessionError;
use crate::fixed::{MicroUsd, Ppm};

/// Capability flags for feature negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilityFlags(pub u64);

impl CapabilityFlags {
    pub const NONE: Self = Self(0);
    /// Binary length-prefixed framing.
    pub const BINARY_PROTOCOL: Self = Self(1 << 0);
    /// CBOR payload encoding.
    pub const CBOR_ENCODING: Self = Self(1 << 1);
    /// Multiple in-flight requests on one connection.
    pub const PIPELINING: Self = Self(1 << 2);
    /// Explicit Cancel messages honored engine-side.
    pub const CANCELLATION: Self = Self(1 << 3);
    /// Result digests are replay-verifiable.
    pub const DETERMINISTIC_REPLAY: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for CapabilityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Payload encoding options. CBOR is production; JSON is a debug aid only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Cbor,
    Json,
}

/// Client hello: the first message on every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Client name (e.g. "weft-adapter").
    pub client_name: String,
    /// Client version (semver).
    pub client_version: String,
    /// Protocol versions the client speaks, as (major, minor) pairs.
    pub supported_versions: Vec<(u16, u16)>,
    /// Preferred payload encoding.
    pub preferred_encoding: Encoding,
    /// Capability flags.
    pub capabilities: CapabilityFlags,
}

impl HelloPayload {
    pub fn new(client_name: &str, client_version: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
            supported_versions: crate::negotiate::PROTOCOL_VERSIONS.to_vec(),
            preferred_encoding: Encoding::Cbor,
            capabilities: CapabilityFlags::BINARY_PROTOCOL
                | CapabilityFlags::CBOR_ENCODING
                | CapabilityFlags::PIPELINING
                | CapabilityFlags::CANCELLATION
                | CapabilityFlags::DETERMINISTIC_REPLAY,
        }
    }

    /// Check whether a given version is in the supported set.
    pub fn supports_version(&self, version: (u16, u16)) -> bool {
        self.supported_versions.contains(&version)
    }
}

/// Engine hello acknowledgment.
///
/// String fields decode with defaults so an absent field surfaces as a
/// `MissingField` negotiation error rather than an opaque decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloAckPayload {
    /// Protocol version the engine selected.
    pub selected_version: (u16, u16),
    /// Engine capabilities.
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    /// Engine build version.
    #[serde(default)]
    pub engine_version: String,
    /// Determinism contract version (semver; major is what matters).
    #[serde(default)]
    pub contract_version: String,
    /// Hash primitive the engine computes digests with.
    #[serde(default)]
    pub hash_version: String,
    /// Content-addressed-storage layout version.
    #[serde(default)]
    pub cas_version: String,
    /// Engine-assigned session identifier.
    #[serde(default)]
    pub session_id: String,
}

/// Execution request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequestPayload {
    /// Correlation id linking this request to its eventual result.
    pub correlation_id: u64,
    /// Caller-chosen run identifier.
    pub run_id: String,
    /// Workflow definition.
    pub workflow: Workflow,
    /// Execution controls.
    pub controls: ExecutionControls,
    /// Policy configuration.
    pub policy: Policy,
    /// Opaque request metadata (e.g. normalized trigger payloads). Sorted map.
    pub metadata: BTreeMap<String, String>,
}

/// Workflow definition as carried on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub version: String,
    pub steps: Vec<WorkflowStep>,
}

/// Single workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub step_type: StepType,
    /// Step configuration. Sorted map keeps serialization stable.
    pub config: BTreeMap<String, serde_json::Value>,
    /// Step ids that must complete first.
    pub depends_on: Vec<String>,
}

/// Step types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ToolCall,
    EmitArtifact,
    Decision,
    Pause,
}

/// Execution controls. Durations are integer microseconds; zero means
/// unlimited.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionControls {
    pub max_steps: Option<u32>,
    pub step_timeout_us: u64,
    pub run_timeout_us: u64,
    pub budget_limit_usd: MicroUsd,
    pub min_step_interval_us: u64,
}

/// Policy configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub rules: Vec<PolicyRule>,
    pub default_decision: Decision,
}

/// Single policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub condition: PolicyCondition,
    pub decision: Decision,
}

/// Policy condition. The core never evaluates these; they ride through to
/// the engine as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyCondition {
    Capability { name: String },
    StepLimit { max: u32 },
    BudgetLimit { max_usd: MicroUsd },
    ToolAllowed { tool_name: String },
    And { conditions: Vec<PolicyCondition> },
    Or { conditions: Vec<PolicyCondition> },
}

/// Decision outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny {
        reason: String,
    },
    #[default]
    Prompt,
}

/// Execution result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResultPayload {
    /// Correlation id copied from the originating request.
    pub correlation_id: u64,
    pub run_id: String,
    pub status: RunStatus,
    /// `<algorithm>:<hex>` digest over the canonicalized execution trace.
    pub result_digest: String,
    pub events: Vec<RunEvent>,
    pub final_action: Option<Action>,
    pub metrics: ExecutionMetrics,
    /// Session the run executed under.
    pub session_id: String,
}

/// Run status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { reason: String },
    Cancelled { reason: String },
}

/// One event from the execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_id: String,
    pub event_type: String,
    /// Engine-assigned logical timestamp in microseconds. Deterministic
    /// engines derive this from step order, not wall clocks.
    pub timestamp_us: i64,
    /// Event payload. Sorted map keeps serialization stable.
    pub payload: BTreeMap<String, serde_json::Value>,
}

/// Final action of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolCall {
        step_id: String,
        tool_name: String,
        input: BTreeMap<String, serde_json::Value>,
    },
    EmitArtifact {
        step_id: String,
        artifact_id: String,
    },
    Done,
}

/// Execution metrics. No floats on the wire (see [`crate::fixed`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub steps_executed: u32,
    pub elapsed_us: u64,
    pub budget_spent_usd: MicroUsd,
    /// Throughput in milli-ops per second.
    pub throughput_milli_ops: u64,
    pub cas_hit_rate: Ppm,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_histogram: LatencyHistogram,
}

/// Latency histogram with microsecond bucket boundaries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Sorted bucket boundaries in microseconds.
    pub boundaries_us: Vec<u64>,
    /// Counts per bucket; length is `boundaries_us.len() + 1` (overflow).
    pub counts: Vec<u64>,
}

/// Explicit cancellation. The only legitimate way to stop engine-side work;
/// a client-side timeout merely frees local bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelPayload {
    pub correlation_id: u64,
    pub run_id: String,
}

/// Error codes carried in Error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Protocol errors
    InvalidMessage,
    UnsupportedVersion,
    EncodingError,
    // Execution errors
    ExecutionFailed,
    BudgetExceeded,
    Timeout,
    PolicyDenied,
    // System errors
    InternalError,
    ResourceExhausted,
    ServiceUnavailable,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Correlation id of the failed request; 0 for connection-level errors.
    pub correlation_id: u64,
    pub code: ErrorCode,
    /// Human-readable message (may be redacted).
    pub message: String,
    /// Structured details, safe to log.
    pub details: BTreeMap<String, String>,
}

/// A decoded protocol message.
///
/// The set is closed and matched exhaustively; unknown frame types never
/// reach this enum (the wire layer rejects them).
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloPayload),
    HelloAck(HelloAckPayload),
    ExecRequest(ExecRequestPayload),
    ExecResult(ExecResultPayload),
    Cancel(CancelPayload),
    Error(ErrorPayload),
}

impl Message {
    /// The frame type this message travels as.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Message::Hello(_) => FrameType::Hello,
            Message::HelloAck(_) => FrameType::HelloAck,
            Message::ExecRequest(_) => FrameType::ExecRequest,
            Message::ExecResult(_) => FrameType::ExecResult,
            Message::Cancel(_) => FrameType::Cancel,
            Message::Error(_) => FrameType::Error,
        }
    }

    /// Encode into a wire frame. The frame size limit is enforced here,
    /// before anything is handed to the transport.
    pub fn encode(&self, encoding: Encoding) -> Result<Frame, SessionError> {
        let payload = match self {
            Message::Hello(p) => to_payload_bytes(p, encoding)?,
            Message::HelloAck(p) => to_payload_bytes(p, encoding)?,
            Message::ExecRequest(p) => to_payload_bytes(p, encoding)?,
            Message::ExecResult(p) => to_payload_bytes(p, encoding)?,
            Message::Cancel(p) => to_payload_bytes(p, encoding)?,
            Message::Error(p) => to_payload_bytes(p, encoding)?,
        };
        Ok(Frame::new(self.frame_type(), payload)?)
    }

    /// Decode a wire frame into a message.
    pub fn decode(frame: &Frame, encoding: Encoding) -> Result<Self, SessionError> {
        match frame.frame_type {
            FrameType::Hello => Ok(Message::Hello(from_payload_bytes(&frame.payload, encoding)?)),
            FrameType::HelloAck => Ok(Message::HelloAck(from_payload_bytes(
                &frame.payload,
                encoding,
            )?)),
            FrameType::ExecRequest => Ok(Message::ExecRequest(from_payload_bytes(
                &frame.payload,
                encoding,
            )?)),
            FrameType::ExecResult => Ok(Message::ExecResult(from_payload_bytes(
                &frame.payload,
                encoding,
            )?)),
            FrameType::Cancel => Ok(Message::Cancel(from_payload_bytes(
                &frame.payload,
                encoding,
            )?)),
            FrameType::Error => Ok(Message::Error(from_payload_bytes(&frame.payload, encoding)?)),
        }
    }
}

/// Serialize a payload with the session encoding.
pub fn to_payload_bytes<T: Serialize>(value: &T, encoding: Encoding) -> Result<Vec<u8>, SessionError> {
    match encoding {
        Encoding::Cbor => {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(value, &mut buf)
                .map_err(|e| SessionError::Encode(e.to_string()))?;
            Ok(buf)
        }
        Encoding::Json => serde_json::to_vec(value).map_err(|e| SessionError::Encode(e.to_string())),
    }
}

/// Deserialize a payload with the session encoding.
pub fn from_payload_bytes<T: DeserializeOwned>(
    bytes: &[u8],
    encoding: Encoding,
) -> Result<T, SessionError> {
    match encoding {
        Encoding::Cbor => {
            ciborium::de::from_reader(bytes).map_err(|e| SessionError::Decode(e.to_string()))
        }
        Encoding::Json => {
            serde_json::from_slice(bytes).map_err(|e| SessionError::Decode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ExecRequestPayload {
        ExecRequestPayload {
            correlation_id: 7,
            run_id: "run-123".to_string(),
            workflow: Workflow {
                name: "nightly-report".to_string(),
                version: "1.0.0".to_string(),
                steps: vec![WorkflowStep {
                    id: "step-1".to_string(),
                    step_type: StepType::ToolCall,
                    config: BTreeMap::new(),
                    depends_on: vec![],
                }],
            },
            controls: ExecutionControls::default(),
            policy: Policy::default(),
            metadata: BTreeMap::from([("source".to_string(), "hub".to_string())]),
        }
    }

    #[test]
    fn test_hello_roundtrip_cbor() {
        let hello = HelloPayload::new("weft-adapter", "0.1.0");
        let frame = Message::Hello(hello.clone()).encode(Encoding::Cbor).unwrap();
        let decoded = Message::decode(&frame, Encoding::Cbor).unwrap();
        assert_eq!(decoded, Message::Hello(hello));
    }

    #[test]
    fn test_exec_request_roundtrip_both_encodings() {
        let request = sample_request();
        for encoding in [Encoding::Cbor, Encoding::Json] {
            let frame = Message::ExecRequest(request.clone()).encode(encoding).unwrap();
            let decoded = Message::decode(&frame, encoding).unwrap();
            assert_eq!(decoded, Message::ExecRequest(request.clone()));
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let request = Message::ExecRequest(sample_request());
        let a = request.encode(Encoding::Cbor).unwrap();
        let b = request.encode(Encoding::Cbor).unwrap();
        assert_eq!(a.payload, b.payload);
    }

    #[test]
    fn test_hello_ack_missing_fields_decode_as_defaults() {
        // An ack with only a selected_version: other fields surface as
        // empty, for the negotiation layer to reject as MissingField.
        let bytes =
            to_payload_bytes(&serde_json::json!({"selected_version": [1, 0]}), Encoding::Json)
                .unwrap();
        let ack: HelloAckPayload = from_payload_bytes(&bytes, Encoding::Json).unwrap();
        assert_eq!(ack.selected_version, (1, 0));
        assert!(ack.hash_version.is_empty());
        assert!(ack.session_id.is_empty());
    }

    #[test]
    fn test_capability_flags() {
        let mut flags = CapabilityFlags::BINARY_PROTOCOL | CapabilityFlags::CBOR_ENCODING;
        assert!(flags.contains(CapabilityFlags::CBOR_ENCODING));
        assert!(!flags.contains(CapabilityFlags::PIPELINING));
        flags.insert(CapabilityFlags::PIPELINING);
        assert!(flags.contains(CapabilityFlags::PIPELINING));
    }

    #[test]
    fn test_message_frame_type_mapping() {
        let cancel = Message::Cancel(CancelPayload {
            correlation_id: 3,
            run_id: "run-3".to_string(),
        });
        assert_eq!(cancel.frame_type(), FrameType::Cancel);
        let frame = cancel.encode(Encoding::Cbor).unwrap();
        assert_eq!(frame.frame_type, FrameType::Cancel);
    }

    #[test]
    fn test_error_payload_roundtrip() {
        let error = Message::Error(ErrorPayload {
            correlation_id: 9,
            code: ErrorCode::BudgetExceeded,
            message: "budget limit exceeded".to_string(),
            details: BTreeMap::from([
                ("limit".to_string(), "10.000000".to_string()),
                ("spent".to_string(), "10.000001".to_string()),
            ]),
        });
        let frame = error.encode(Encoding::Cbor).unwrap();
        assert_eq!(Message::decode(&frame, Encoding::Cbor).unwrap(), error);
    }

    #[test]
    fn test_garbage_payload_is_decode_error() {
        let frame = Frame::new(FrameType::HelloAck, &b"\xff\xff\xff"[..]).unwrap();
        let result = Message::decode(&frame, Encoding::Cbor);
        assert!(matches!(result, Err(SessionError::Decode(_))));
    }
}
