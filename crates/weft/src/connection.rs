//! The connection I/O task.
//!
//! One task owns all frame I/O for a connection: the pending-request table
//! and the outbound path live exclusively on this task, and every other
//! caller hands off through a bounded channel. No locks on the hot path.
//!
//! Frames are processed strictly FIFO. Request completions may arrive in
//! any order; correlation ids pair them with their submitters (pipelining).

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use weft_session::{Encoding, ExecResultPayload, Message, Session};
use weft_wire::{Frame, FrameReader, FrameWriter, WireError};

use crate::error::WeftError;
use crate::replay;

/// How often the pending table is swept for expired deadlines.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

/// Transport-level connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket yet.
    Idle,
    /// Byte stream established, nothing sent.
    Connected,
    /// Hello sent, awaiting HelloAck.
    Negotiating,
    /// Session negotiated; requests may flow.
    Ready,
    /// Close requested; queued outbound work is flushing.
    Draining,
    /// Closed cleanly.
    Closed,
    /// Torn down by a fatal error.
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connected => "connected",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Ready => "ready",
            ConnectionState::Draining => "draining",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

/// A registered in-flight request. Exclusively owned by the I/O task.
struct PendingRequest {
    deadline: Instant,
    timeout: Duration,
    resolver: oneshot::Sender<Result<ExecResultPayload, WeftError>>,
}

/// Commands handed to the I/O task by other callers.
pub(crate) enum Command {
    Submit {
        correlation_id: u64,
        frame: Frame,
        deadline: Instant,
        timeout: Duration,
        resolver: oneshot::Sender<Result<ExecResultPayload, WeftError>>,
    },
    Cancel {
        frame: Frame,
    },
    Close,
}

/// Spawn the I/O task for a negotiated connection.
pub(crate) fn spawn<R, W>(
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    session: Session,
    encoding: Encoding,
    queue_bound: usize,
) -> mpsc::Sender<Command>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (commands, rx) = mpsc::channel(queue_bound.max(1));
    tokio::spawn(run(reader, writer, rx, session, encoding));
    commands
}

async fn run<R, W>(
    mut reader: FrameReader<R>,
    mut writer: FrameWriter<W>,
    mut commands: mpsc::Receiver<Command>,
    session: Session,
    encoding: Encoding,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = ConnectionState::Ready;
    let mut pending: HashMap<u64, PendingRequest> = HashMap::new();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::debug!(session_id = session.session_id(), "connection task started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Submit { correlation_id, frame, deadline, timeout, resolver }) => {
                    match writer.write_frame(&frame).await {
                        Ok(()) => {
                            pending.insert(correlation_id, PendingRequest {
                                deadline,
                                timeout,
                                resolver,
                            });
                        }
                        Err(error) => {
                            tracing::warn!(%error, correlation_id, "outbound write failed");
                            let _ = resolver.send(Err(WeftError::Wire(error)));
                            fail_all(&mut pending);
                            state = ConnectionState::Failed;
                            break;
                        }
                    }
                }
                Some(Command::Cancel { frame }) => {
                    if let Err(error) = writer.write_frame(&frame).await {
                        tracing::warn!(%error, "cancel write failed");
                        fail_all(&mut pending);
                        state = ConnectionState::Failed;
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    state = ConnectionState::Draining;
                    break;
                }
            },

            frame = reader.read_frame() => match frame {
                Ok(frame) => {
                    if let Err(error) = handle_frame(frame, &mut pending, &session, encoding) {
                        tracing::warn!(%error, "connection-fatal inbound frame");
                        fail_all(&mut pending);
                        state = ConnectionState::Failed;
                        break;
                    }
                }
                // An idle read window is not a protocol error; it just gives
                // the deadline sweep a chance to run.
                Err(WireError::Timeout(_)) => {}
                Err(error) => {
                    tracing::warn!(%error, "read failed, tearing down connection");
                    fail_all(&mut pending);
                    state = ConnectionState::Failed;
                    break;
                }
            },

            _ = sweep.tick() => {
                expire_deadlines(&mut pending);
            }
        }
    }

    if state == ConnectionState::Draining {
        // Flush queued cancels; queued submits can never complete once we
        // stop reading, so resolve them honestly.
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Cancel { frame } => {
                    let _ = writer.write_frame(&frame).await;
                }
                Command::Submit { resolver, .. } => {
                    let _ = resolver.send(Err(WeftError::ConnectionClosed));
                }
                Command::Close => {}
            }
        }
        fail_all(&mut pending);
        let _ = writer.shutdown().await;
        state = ConnectionState::Closed;
    }

    tracing::debug!(
        session_id = session.session_id(),
        state = state.as_str(),
        "connection task finished"
    );
}

/// Dispatch one inbound frame. Returns `Err` only for connection-fatal
/// conditions; per-request failures are routed to their resolver.
fn handle_frame(
    frame: Frame,
    pending: &mut HashMap<u64, PendingRequest>,
    session: &Session,
    encoding: Encoding,
) -> Result<(), WeftError> {
    let message = Message::decode(&frame, encoding)?;

    match message {
        Message::ExecResult(result) => {
            let Some(entry) = pending.remove(&result.correlation_id) else {
                // Late completion after a local timeout, or a confused
                // engine. Either way there is nobody to hand it to.
                tracing::warn!(
                    correlation_id = result.correlation_id,
                    run_id = %result.run_id,
                    "result for unknown correlation id dropped"
                );
                return Ok(());
            };

            // Re-validate the digest against the negotiated primitive
            // before the caller ever sees the result.
            let outcome = match replay::verify_digest(&result, session) {
                Ok(()) => Ok(result),
                Err(error) => Err(error),
            };
            let _ = entry.resolver.send(outcome);
            Ok(())
        }

        Message::Error(error) => {
            if error.correlation_id == 0 {
                return Err(WeftError::EngineRejected {
                    code: error.code,
                    message: error.message,
                });
            }
            if let Some(entry) = pending.remove(&error.correlation_id) {
                let _ = entry.resolver.send(Err(WeftError::EngineRejected {
                    code: error.code,
                    message: error.message,
                }));
            } else {
                tracing::warn!(
                    correlation_id = error.correlation_id,
                    "error for unknown correlation id dropped"
                );
            }
            Ok(())
        }

        // Nothing else is legitimate on an established client connection.
        other => Err(WeftError::Wire(WireError::ProtocolViolation(format!(
            "unexpected {:?} frame on ready connection",
            other.frame_type()
        )))),
    }
}

/// Expire pending requests whose deadline passed.
///
/// This frees local bookkeeping only; engine-side work continues until an
/// explicit Cancel.
fn expire_deadlines(pending: &mut HashMap<u64, PendingRequest>) {
    let now = Instant::now();
    let expired: Vec<u64> = pending
        .iter()
        .filter(|(_, entry)| entry.deadline <= now)
        .map(|(id, _)| *id)
        .collect();

    for correlation_id in expired {
        if let Some(entry) = pending.remove(&correlation_id) {
            tracing::debug!(correlation_id, "request deadline expired");
            let _ = entry
                .resolver
                .send(Err(WeftError::RequestTimeout(entry.timeout)));
        }
    }
}

fn fail_all(pending: &mut HashMap<u64, PendingRequest>) {
    for (_, entry) in pending.drain() {
        let _ = entry.resolver.send(Err(WeftError::ConnectionClosed));
    }
}
