//! A stub engine serving the Weft protocol over an in-process pipe.
//!
//! The stub negotiates sessions, executes workflows deterministically
//! (logical timestamps, seeded outputs), computes result digests over the
//! canonicalized event trace, and honors Cancel. Its identity is fully
//! configurable so tests can probe the fail-closed paths: a foreign hash
//! primitive, a divergent contract major, missing handshake fields.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use weft_core::{CanonicalValue, Fingerprint, SeededRng};
use weft_session::{
    respond, Action, Encoding, EngineIdentity, ExecRequestPayload, ExecResultPayload,
    ExecutionMetrics, LatencyHistogram, Message, MicroUsd, Ppm, RunEvent, RunStatus,
};
use weft_wire::{FrameReader, FrameWriter, WireError};

/// Stub engine configuration.
#[derive(Debug, Clone)]
pub struct StubEngineConfig {
    /// What the engine claims about itself in the HelloAck. Override
    /// `hash_version` or `contract_version` to test fail-closed paths.
    pub identity: EngineIdentity,
    pub encoding: Encoding,
    pub session_id: String,
    /// Run ids the engine holds without answering until a Cancel arrives.
    pub hold_runs: Vec<String>,
    /// Stop reading after the handshake. Lets tests fill the outbound path
    /// and observe backpressure.
    pub deaf_after_handshake: bool,
    /// Capacity of the in-process duplex pipe.
    pub io_capacity: usize,
}

impl Default for StubEngineConfig {
    fn default() -> Self {
        Self {
            identity: EngineIdentity::default(),
            encoding: Encoding::Cbor,
            session_id: "stub-session-1".to_string(),
            hold_runs: Vec::new(),
            deaf_after_handshake: false,
            io_capacity: 256 * 1024,
        }
    }
}

/// A running stub engine.
pub struct StubEngine {
    requests_seen: Arc<AtomicU32>,
    handle: JoinHandle<()>,
}

impl StubEngine {
    /// Spawn the engine; returns the client's end of the pipe.
    pub fn spawn(config: StubEngineConfig) -> (DuplexStream, StubEngine) {
        let (client_io, server_io) = tokio::io::duplex(config.io_capacity);
        let requests_seen = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&requests_seen);
        let handle = tokio::spawn(serve(server_io, config, counter));
        (
            client_io,
            StubEngine {
                requests_seen,
                handle,
            },
        )
    }

    /// Number of ExecRequest frames the engine has received.
    pub fn requests_seen(&self) -> u32 {
        self.requests_seen.load(Ordering::SeqCst)
    }

    /// Tear the engine down.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn serve(io: DuplexStream, config: StubEngineConfig, requests_seen: Arc<AtomicU32>) {
    let (read_half, write_half) = tokio::io::split(io);
    let mut reader = FrameReader::new(read_half, Duration::from_secs(30));
    let mut writer = FrameWriter::new(write_half);
    let mut held: HashMap<u64, ExecRequestPayload> = HashMap::new();

    loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(WireError::Closed) => break,
            Err(error) => {
                tracing::debug!(%error, "stub engine read failed");
                break;
            }
        };

        let message = match Message::decode(&frame, config.encoding) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(%error, "stub engine decode failed");
                break;
            }
        };

        match message {
            Message::Hello(hello) => {
                let ack = match respond(&hello, &config.identity, &config.session_id) {
                    Ok(ack) => ack,
                    Err(error) => {
                        tracing::debug!(%error, "stub engine refused hello");
                        break;
                    }
                };
                if writer
                    .write_frame(&Message::HelloAck(ack).encode(config.encoding).expect("ack encodes"))
                    .await
                    .is_err()
                {
                    break;
                }
                if config.deaf_after_handshake {
                    std::future::pending::<()>().await;
                }
            }

            Message::ExecRequest(request) => {
                requests_seen.fetch_add(1, Ordering::SeqCst);
                if config.hold_runs.contains(&request.run_id) {
                    held.insert(request.correlation_id, request);
                    continue;
                }
                let result = execute(&request, &config.session_id);
                if writer
                    .write_frame(
                        &Message::ExecResult(result)
                            .encode(config.encoding)
                            .expect("result encodes"),
                    )
                    .await
                    .is_err()
                {
                    break;
                }
            }

            Message::Cancel(cancel) => {
                if let Some(request) = held.remove(&cancel.correlation_id) {
                    let result = cancelled_result(&request, &config.session_id);
                    if writer
                        .write_frame(
                            &Message::ExecResult(result)
                                .encode(config.encoding)
                                .expect("result encodes"),
                        )
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }

            other => {
                tracing::debug!(frame_type = ?other.frame_type(), "unexpected client frame");
                break;
            }
        }
    }
}

/// Execute a request deterministically.
///
/// Event timestamps are logical (derived from step order), step outputs come
/// from the seeded PRNG keyed by workflow identity and run id, and the
/// digest covers the canonicalized event log. Byte-identical requests
/// produce byte-identical digests; changing any request field changes the
/// opening event's request fingerprint and therefore the digest.
pub fn execute(request: &ExecRequestPayload, session_id: &str) -> ExecResultPayload {
    let mut rng = SeededRng::new(&format!(
        "{}:{}:{}",
        request.workflow.name, request.workflow.version, request.run_id
    ));

    let request_fingerprint = fingerprint_request(request);
    let mut events = Vec::new();
    events.push(RunEvent {
        event_id: "evt-0000".to_string(),
        event_type: "run_started".to_string(),
        timestamp_us: 0,
        payload: BTreeMap::from([
            (
                "request_fingerprint".to_string(),
                serde_json::json!(request_fingerprint.as_str()),
            ),
            ("run_id".to_string(), serde_json::json!(request.run_id)),
        ]),
    });

    for (index, step) in request.workflow.steps.iter().enumerate() {
        let base_us = 1_000 + (index as i64) * 1_000;
        events.push(RunEvent {
            event_id: format!("evt-{:04}", index * 2 + 1),
            event_type: "step_started".to_string(),
            timestamp_us: base_us,
            payload: BTreeMap::from([(
                "step_id".to_string(),
                serde_json::json!(step.id),
            )]),
        });
        let output = rng.next_int(1_000_000);
        events.push(RunEvent {
            event_id: format!("evt-{:04}", index * 2 + 2),
            event_type: "step_completed".to_string(),
            timestamp_us: base_us + 500,
            payload: BTreeMap::from([
                ("step_id".to_string(), serde_json::json!(step.id)),
                ("output".to_string(), serde_json::json!(output)),
            ]),
        });
    }

    let steps = request.workflow.steps.len() as u64;
    let elapsed_us = 1_000 + steps * 1_500;
    events.push(RunEvent {
        event_id: format!("evt-{:04}", steps * 2 + 1),
        event_type: "run_completed".to_string(),
        timestamp_us: elapsed_us as i64,
        payload: BTreeMap::new(),
    });

    ExecResultPayload {
        correlation_id: request.correlation_id,
        run_id: request.run_id.clone(),
        status: RunStatus::Completed,
        result_digest: digest_event_log(&events, &request.run_id).as_str().to_string(),
        events,
        final_action: Some(Action::Done),
        metrics: deterministic_metrics(steps, elapsed_us),
        session_id: session_id.to_string(),
    }
}

/// Build the Cancelled result for a held run.
pub fn cancelled_result(request: &ExecRequestPayload, session_id: &str) -> ExecResultPayload {
    let events = vec![RunEvent {
        event_id: "evt-0000".to_string(),
        event_type: "run_cancelled".to_string(),
        timestamp_us: 0,
        payload: BTreeMap::from([(
            "run_id".to_string(),
            serde_json::json!(request.run_id),
        )]),
    }];

    ExecResultPayload {
        correlation_id: request.correlation_id,
        run_id: request.run_id.clone(),
        status: RunStatus::Cancelled {
            reason: "cancelled by client".to_string(),
        },
        result_digest: digest_event_log(&events, &request.run_id).as_str().to_string(),
        events,
        final_action: None,
        metrics: ExecutionMetrics::default(),
        session_id: session_id.to_string(),
    }
}

/// Fingerprint the request fields that define the run (everything except
/// the correlation id, which is connection-local).
fn fingerprint_request(request: &ExecRequestPayload) -> Fingerprint {
    let json = serde_json::json!({
        "run_id": request.run_id,
        "workflow": request.workflow,
        "controls": request.controls,
        "policy": request.policy,
        "metadata": request.metadata,
    });
    let value = CanonicalValue::from_json(&json).expect("request converts to canonical form");
    Fingerprint::of_value(&value).expect("request fingerprints")
}

/// Digest the event log bound to its run id.
fn digest_event_log(events: &[RunEvent], run_id: &str) -> Fingerprint {
    let json = serde_json::json!({
        "event_log": events,
        "run_id": run_id,
    });
    let value = CanonicalValue::from_json(&json).expect("event log converts to canonical form");
    Fingerprint::of_value(&value).expect("event log fingerprints")
}

fn deterministic_metrics(steps: u64, elapsed_us: u64) -> ExecutionMetrics {
    let p50 = 400 + steps * 10;
    ExecutionMetrics {
        steps_executed: steps as u32,
        elapsed_us,
        budget_spent_usd: MicroUsd::from_micros((steps * 1_250) as i64),
        throughput_milli_ops: if elapsed_us == 0 {
            0
        } else {
            steps * 1_000 * 1_000_000 / elapsed_us
        },
        cas_hit_rate: Ppm::from_ratio(0.95),
        latency_p50_us: p50,
        latency_p95_us: p50 * 3,
        latency_p99_us: p50 * 5,
        latency_histogram: LatencyHistogram {
            boundaries_us: vec![500, 1_000, 5_000],
            counts: vec![steps / 2, steps - steps / 2, 0, 0],
        },
    }
}
