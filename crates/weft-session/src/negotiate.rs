//! Session negotiation: HELLO / HELLO-ACK acceptance, fail-closed.
//!
//! Every check here must pass or the connection aborts before Ready. There
//! is no graceful degradation at a determinism boundary: a session that
//! would compute digests with a different primitive, or under a different
//! contract, is worthless and must be refused outright.

use serde::{Deserialize, Serialize};

use weft_core::HASH_PRIMITIVE;

use crate::error::{NegotiationError, SessionError};
use crate::messages::{CapabilityFlags, HelloAckPayload, HelloPayload};

/// Protocol versions this implementation speaks, newest first.
pub const PROTOCOL_VERSIONS: &[(u16, u16)] = &[(1, 0)];

/// The determinism contract version this client was compiled against.
/// Only the major component participates in compatibility checks.
pub const CONTRACT_VERSION: &str = "1.0.0";

/// Extract the major component of a semver-ish string.
pub fn contract_major(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Negotiating,
    Ready,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Negotiating => "negotiating",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

/// A negotiated session.
///
/// Ambient negotiated facts (session id, hash primitive) live here as an
/// explicit object passed to dependents; there is no process-wide mutable
/// state. `hash_primitive` is immutable once set.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    state: SessionState,
    negotiated_version: (u16, u16),
    capabilities: CapabilityFlags,
    engine_version: String,
    contract_version: String,
    hash_primitive: String,
    cas_version: String,
    session_id: String,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn negotiated_version(&self) -> (u16, u16) {
        self.negotiated_version
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.capabilities
    }

    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    pub fn contract_version(&self) -> &str {
        &self.contract_version
    }

    /// The hash primitive every digest on this session must carry.
    pub fn hash_primitive(&self) -> &str {
        &self.hash_primitive
    }

    pub fn cas_version(&self) -> &str {
        &self.cas_version
    }

    /// The engine-assigned session id, bound for the connection's lifetime
    /// and attached to all correlation/audit records.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Guard for request paths: no ExecRequest may be sent unless Ready.
    pub fn require_ready(&self) -> Result<(), SessionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::NotReady(self.state.as_str()))
        }
    }

    /// Transition to Closed. Terminal.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Transition to Failed. Terminal.
    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
    }
}

/// Client-side acceptance of a HELLO-ACK.
///
/// All checks must pass, in order:
/// 1. the engine selected a version the client offered;
/// 2. the engine's contract major matches the compiled contract major;
/// 3. the engine's hash primitive is exactly [`HASH_PRIMITIVE`] -- not
///    negotiable;
/// and every required field must be present.
pub fn accept(hello: &HelloPayload, ack: &HelloAckPayload) -> Result<Session, NegotiationError> {
    if ack.engine_version.is_empty() {
        return Err(NegotiationError::MissingField("engine_version"));
    }
    if ack.contract_version.is_empty() {
        return Err(NegotiationError::MissingField("contract_version"));
    }
    if ack.hash_version.is_empty() {
        return Err(NegotiationError::MissingField("hash_version"));
    }
    if ack.cas_version.is_empty() {
        return Err(NegotiationError::MissingField("cas_version"));
    }
    if ack.session_id.is_empty() {
        return Err(NegotiationError::MissingField("session_id"));
    }

    if !hello.supports_version(ack.selected_version) {
        return Err(NegotiationError::VersionMismatch {
            selected: ack.selected_version,
            supported: hello.supported_versions.clone(),
        });
    }

    let ours = contract_major(CONTRACT_VERSION);
    let theirs = contract_major(&ack.contract_version);
    if theirs.is_none() || ours != theirs {
        return Err(NegotiationError::ContractMismatch {
            engine: ack.contract_version.clone(),
            client: CONTRACT_VERSION.to_string(),
        });
    }

    if ack.hash_version != HASH_PRIMITIVE {
        return Err(NegotiationError::HashPrimitiveMismatch {
            offered: ack.hash_version.clone(),
            required: HASH_PRIMITIVE.to_string(),
        });
    }

    Ok(Session {
        state: SessionState::Ready,
        negotiated_version: ack.selected_version,
        capabilities: ack.capabilities,
        engine_version: ack.engine_version.clone(),
        contract_version: ack.contract_version.clone(),
        hash_primitive: ack.hash_version.clone(),
        cas_version: ack.cas_version.clone(),
        session_id: ack.session_id.clone(),
    })
}

/// What an engine reports about itself during the handshake.
#[derive(Debug, Clone)]
pub struct EngineIdentity {
    pub engine_version: String,
    pub contract_version: String,
    pub hash_version: String,
    pub cas_version: String,
    pub capabilities: CapabilityFlags,
}

impl Default for EngineIdentity {
    fn default() -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            contract_version: CONTRACT_VERSION.to_string(),
            hash_version: HASH_PRIMITIVE.to_string(),
            cas_version: "1".to_string(),
            capabilities: CapabilityFlags::BINARY_PROTOCOL
                | CapabilityFlags::CBOR_ENCODING
                | CapabilityFlags::PIPELINING
                | CapabilityFlags::CANCELLATION
                | CapabilityFlags::DETERMINISTIC_REPLAY,
        }
    }
}

/// Engine-side response to a HELLO: select the highest mutually supported
/// protocol version.
pub fn respond(
    hello: &HelloPayload,
    engine: &EngineIdentity,
    session_id: &str,
) -> Result<HelloAckPayload, NegotiationError> {
    let selected = PROTOCOL_VERSIONS
        .iter()
        .copied()
        .filter(|v| hello.supported_versions.contains(v))
        .max()
        .ok_or(NegotiationError::VersionMismatch {
            selected: *PROTOCOL_VERSIONS.first().unwrap_or(&(0, 0)),
            supported: hello.supported_versions.clone(),
        })?;

    Ok(HelloAckPayload {
        selected_version: selected,
        capabilities: engine.capabilities,
        engine_version: engine.engine_version.clone(),
        contract_version: engine.contract_version.clone(),
        hash_version: engine.hash_version.clone(),
        cas_version: engine.cas_version.clone(),
        session_id: session_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello() -> HelloPayload {
        HelloPayload::new("weft-adapter", "0.1.0")
    }

    fn good_ack() -> HelloAckPayload {
        respond(&hello(), &EngineIdentity::default(), "sess-1").unwrap()
    }

    #[test]
    fn test_accept_reaches_ready() {
        let session = accept(&hello(), &good_ack()).unwrap();
        assert!(session.is_ready());
        assert_eq!(session.negotiated_version(), (1, 0));
        assert_eq!(session.hash_primitive(), "blake3");
        assert_eq!(session.session_id(), "sess-1");
        session.require_ready().unwrap();
    }

    #[test]
    fn test_foreign_hash_primitive_is_refused() {
        let mut ack = good_ack();
        ack.hash_version = "sha256".to_string();
        let err = accept(&hello(), &ack).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::HashPrimitiveMismatch { ref offered, .. } if offered == "sha256"
        ));
    }

    #[test]
    fn test_unoffered_version_is_refused() {
        let mut ack = good_ack();
        ack.selected_version = (2, 0);
        assert!(matches!(
            accept(&hello(), &ack),
            Err(NegotiationError::VersionMismatch { selected: (2, 0), .. })
        ));
    }

    #[test]
    fn test_contract_major_mismatch_is_refused() {
        let mut ack = good_ack();
        ack.contract_version = "2.0.0".to_string();
        assert!(matches!(
            accept(&hello(), &ack),
            Err(NegotiationError::ContractMismatch { .. })
        ));

        // Minor drift within the same major is compatible.
        let mut ack = good_ack();
        ack.contract_version = "1.4.2".to_string();
        assert!(accept(&hello(), &ack).is_ok());
    }

    #[test]
    fn test_missing_fields_are_named() {
        for (field, mutate) in [
            ("engine_version", Box::new(|a: &mut HelloAckPayload| a.engine_version.clear())
                as Box<dyn Fn(&mut HelloAckPayload)>),
            ("contract_version", Box::new(|a| a.contract_version.clear())),
            ("hash_version", Box::new(|a| a.hash_version.clear())),
            ("cas_version", Box::new(|a| a.cas_version.clear())),
            ("session_id", Box::new(|a| a.session_id.clear())),
        ] {
            let mut ack = good_ack();
            mutate(&mut ack);
            match accept(&hello(), &ack) {
                Err(NegotiationError::MissingField(name)) => assert_eq!(name, field),
                other => panic!("expected MissingField({field}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_respond_selects_highest_mutual_version() {
        let mut hello = hello();
        hello.supported_versions = vec![(0, 9), (1, 0)];
        let ack = respond(&hello, &EngineIdentity::default(), "s").unwrap();
        assert_eq!(ack.selected_version, (1, 0));
    }

    #[test]
    fn test_respond_with_no_common_version_fails() {
        let mut hello = hello();
        hello.supported_versions = vec![(9, 9)];
        assert!(matches!(
            respond(&hello, &EngineIdentity::default(), "s"),
            Err(NegotiationError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_closed_session_rejects_requests() {
        let mut session = accept(&hello(), &good_ack()).unwrap();
        session.close();
        assert!(session.require_ready().is_err());
        assert_eq!(session.state(), SessionState::Closed);
    }
}
