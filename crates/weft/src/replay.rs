//! Replay verification: digest checks and structured event diffs.
//!
//! Two results for logically equivalent inputs must carry byte-identical
//! digests. When they do not, a bare boolean is useless for root-causing
//! non-determinism, so the verifier produces a position-indexed diff of the
//! event sequences. All comparison happens on parsed frame-level fields,
//! never on printed text.

use weft_core::{CanonicalValue, Fingerprint};
use weft_session::{ExecResultPayload, RunEvent, Session};

use crate::error::WeftError;

/// Outcome of comparing two results for replay equivalence.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub digest_a: String,
    pub digest_b: String,
    /// True iff the digests are byte-identical.
    pub equivalent: bool,
    /// Position-indexed divergences between the event sequences. Empty when
    /// equivalent.
    pub event_diffs: Vec<EventDiff>,
}

/// One divergence between event sequences at a given position.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDiff {
    pub index: usize,
    pub kind: EventDiffKind,
}

/// What diverged at a position.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDiffKind {
    /// Run A's sequence ended before this position.
    MissingInA { event_type: String },
    /// Run B's sequence ended before this position.
    MissingInB { event_type: String },
    /// Different event types at the same position.
    TypeMismatch { a: String, b: String },
    /// Same event type, different payload fingerprints.
    PayloadMismatch {
        event_type: String,
        fingerprint_a: Fingerprint,
        fingerprint_b: Fingerprint,
    },
}

/// Validate a result digest against the session's negotiated primitive.
///
/// The engine computes `result_digest` over the canonicalized execution
/// trace; the client re-validates the algorithm prefix here. A foreign
/// prefix means the digest proves nothing and the result is rejected.
pub fn verify_digest(result: &ExecResultPayload, session: &Session) -> Result<(), WeftError> {
    let fingerprint = Fingerprint::parse(&result.result_digest)?;
    if fingerprint.algorithm() != session.hash_primitive() {
        return Err(WeftError::DigestPrimitiveMismatch {
            got: fingerprint.algorithm().to_string(),
            expected: session.hash_primitive().to_string(),
        });
    }
    Ok(())
}

/// Compare two results for replay equivalence.
///
/// Equivalent inputs (same workflow, same deterministic seed, same policy)
/// must yield byte-identical digests. On mismatch the report carries the
/// event-level divergences.
pub fn verify_replay(
    a: &ExecResultPayload,
    b: &ExecResultPayload,
) -> Result<ReplayReport, WeftError> {
    let equivalent = a.result_digest == b.result_digest;
    let event_diffs = if equivalent {
        Vec::new()
    } else {
        diff_events(&a.events, &b.events)?
    };

    Ok(ReplayReport {
        digest_a: a.result_digest.clone(),
        digest_b: b.result_digest.clone(),
        equivalent,
        event_diffs,
    })
}

/// Verify replay equivalence, surfacing a mismatch as an error.
///
/// The mismatch is never swallowed: the error carries the full report.
pub fn require_replay_equivalent(
    a: &ExecResultPayload,
    b: &ExecResultPayload,
) -> Result<(), WeftError> {
    let report = verify_replay(a, b)?;
    if report.equivalent {
        Ok(())
    } else {
        Err(WeftError::ReplayMismatch { report })
    }
}

fn diff_events(a: &[RunEvent], b: &[RunEvent]) -> Result<Vec<EventDiff>, WeftError> {
    let mut diffs = Vec::new();
    let longest = a.len().max(b.len());

    for index in 0..longest {
        match (a.get(index), b.get(index)) {
            (Some(ea), None) => diffs.push(EventDiff {
                index,
                kind: EventDiffKind::MissingInB {
                    event_type: ea.event_type.clone(),
                },
            }),
            (None, Some(eb)) => diffs.push(EventDiff {
                index,
                kind: EventDiffKind::MissingInA {
                    event_type: eb.event_type.clone(),
                },
            }),
            (Some(ea), Some(eb)) => {
                if ea.event_type != eb.event_type {
                    diffs.push(EventDiff {
                        index,
                        kind: EventDiffKind::TypeMismatch {
                            a: ea.event_type.clone(),
                            b: eb.event_type.clone(),
                        },
                    });
                    continue;
                }
                let fa = event_fingerprint(ea)?;
                let fb = event_fingerprint(eb)?;
                if fa != fb {
                    diffs.push(EventDiff {
                        index,
                        kind: EventDiffKind::PayloadMismatch {
                            event_type: ea.event_type.clone(),
                            fingerprint_a: fa,
                            fingerprint_b: fb,
                        },
                    });
                }
            }
            (None, None) => unreachable!("index bounded by longest sequence"),
        }
    }

    Ok(diffs)
}

/// Fingerprint one event over its canonical form (id, type, logical time,
/// payload).
fn event_fingerprint(event: &RunEvent) -> Result<Fingerprint, WeftError> {
    let json = serde_json::json!({
        "event_id": event.event_id,
        "event_type": event.event_type,
        "timestamp_us": event.timestamp_us,
        "payload": event.payload,
    });
    let value = CanonicalValue::from_json(&json)?;
    Ok(Fingerprint::of_value(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_session::{ExecutionMetrics, RunStatus};

    fn event(event_type: &str, payload_value: i64) -> RunEvent {
        RunEvent {
            event_id: format!("evt-{event_type}-{payload_value}"),
            event_type: event_type.to_string(),
            timestamp_us: payload_value,
            payload: BTreeMap::from([(
                "value".to_string(),
                serde_json::json!(payload_value),
            )]),
        }
    }

    fn result(digest: &str, events: Vec<RunEvent>) -> ExecResultPayload {
        ExecResultPayload {
            correlation_id: 1,
            run_id: "run-1".to_string(),
            status: RunStatus::Completed,
            result_digest: digest.to_string(),
            events,
            final_action: None,
            metrics: ExecutionMetrics::default(),
            session_id: "sess-1".to_string(),
        }
    }

    #[test]
    fn test_identical_digests_are_equivalent() {
        let a = result("blake3:aa11", vec![event("step_started", 1)]);
        let b = result("blake3:aa11", vec![event("step_started", 1)]);
        let report = verify_replay(&a, &b).unwrap();
        assert!(report.equivalent);
        assert!(report.event_diffs.is_empty());
        require_replay_equivalent(&a, &b).unwrap();
    }

    #[test]
    fn test_mismatch_produces_positioned_diff() {
        let a = result(
            "blake3:aa11",
            vec![event("step_started", 1), event("step_completed", 2)],
        );
        let b = result(
            "blake3:bb22",
            vec![
                event("step_started", 1),
                event("step_failed", 2),
                event("run_aborted", 3),
            ],
        );

        let report = verify_replay(&a, &b).unwrap();
        assert!(!report.equivalent);
        assert_eq!(report.event_diffs.len(), 2);

        assert_eq!(report.event_diffs[0].index, 1);
        assert!(matches!(
            report.event_diffs[0].kind,
            EventDiffKind::TypeMismatch { ref a, ref b }
                if a == "step_completed" && b == "step_failed"
        ));

        assert_eq!(report.event_diffs[1].index, 2);
        assert!(matches!(
            report.event_diffs[1].kind,
            EventDiffKind::MissingInA { ref event_type } if event_type == "run_aborted"
        ));
    }

    #[test]
    fn test_payload_divergence_is_fingerprinted() {
        let a = result("blake3:aa11", vec![event("tool_output", 42)]);
        let mut divergent = event("tool_output", 42);
        divergent
            .payload
            .insert("value".to_string(), serde_json::json!(43));
        let b = result("blake3:bb22", vec![divergent]);

        let report = verify_replay(&a, &b).unwrap();
        assert_eq!(report.event_diffs.len(), 1);
        match &report.event_diffs[0].kind {
            EventDiffKind::PayloadMismatch {
                event_type,
                fingerprint_a,
                fingerprint_b,
            } => {
                assert_eq!(event_type, "tool_output");
                assert_ne!(fingerprint_a, fingerprint_b);
                assert_eq!(fingerprint_a.algorithm(), "blake3");
            }
            other => panic!("expected PayloadMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_digest_primitive_must_match_session() {
        let hello = weft_session::HelloPayload::new("weft-adapter", "0.1.0");
        let ack =
            weft_session::respond(&hello, &weft_session::EngineIdentity::default(), "s").unwrap();
        let session = weft_session::accept(&hello, &ack).unwrap();

        let good = result("blake3:abcd", vec![]);
        verify_digest(&good, &session).unwrap();

        let foreign = result("sha256:abcd", vec![]);
        assert!(matches!(
            verify_digest(&foreign, &session),
            Err(WeftError::DigestPrimitiveMismatch { .. })
        ));

        let malformed = result("not-a-digest", vec![]);
        assert!(matches!(
            verify_digest(&malformed, &session),
            Err(WeftError::Core(_))
        ));
    }

    #[test]
    fn test_require_surfaces_report() {
        let a = result("blake3:aa11", vec![event("x", 1)]);
        let b = result("blake3:bb22", vec![event("y", 1)]);
        match require_replay_equivalent(&a, &b) {
            Err(WeftError::ReplayMismatch { report }) => {
                assert_eq!(report.event_diffs.len(), 1);
            }
            other => panic!("expected ReplayMismatch, got {other:?}"),
        }
    }
}
