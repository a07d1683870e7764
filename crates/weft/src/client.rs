//! The Weft client: negotiated sessions and correlated request exchange.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use weft_session::{
    accept, CancelPayload, Encoding, ExecRequestPayload, ExecResultPayload, ExecutionControls,
    HelloPayload, Message, Policy, Session, Workflow,
};
use weft_wire::{FrameReader, FrameWriter, WireError};

use crate::breaker::{BreakerOptions, CircuitBreaker};
use crate::connection::{self, Command, ConnectionState};
use crate::error::WeftError;
use crate::retry::{self, JitterSource, RetryPolicy};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_name: String,
    pub client_version: String,
    /// Payload encoding. CBOR in production; JSON only for debugging.
    pub encoding: Encoding,
    /// How long to wait for the HelloAck.
    pub connect_timeout: Duration,
    /// Per-request deadline. Expiry frees local bookkeeping only.
    pub request_timeout: Duration,
    /// Idle-read window on the connection.
    pub idle_read_timeout: Duration,
    /// Bound of the outbound command queue. When full, submits fail fast
    /// with `Busy`.
    pub outbound_queue: usize,
    pub breaker: BreakerOptions,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "weft-adapter".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            encoding: Encoding::Cbor,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_read_timeout: Duration::from_secs(60),
            outbound_queue: 64,
            breaker: BreakerOptions::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// An execution request as callers build it. The client assigns the
/// correlation id at submit time.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub run_id: String,
    pub workflow: Workflow,
    pub controls: ExecutionControls,
    pub policy: Policy,
    /// Opaque metadata (e.g. normalized trigger payloads from the hub).
    pub metadata: BTreeMap<String, String>,
}

impl ExecRequest {
    pub fn new(run_id: impl Into<String>, workflow: Workflow) -> Self {
        Self {
            run_id: run_id.into(),
            workflow,
            controls: ExecutionControls::default(),
            policy: Policy::default(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A submitted request awaiting its result.
///
/// Completions arrive in any order; each handle resolves independently of
/// submission order.
pub struct RunHandle {
    correlation_id: u64,
    receiver: oneshot::Receiver<Result<ExecResultPayload, WeftError>>,
    breaker: Arc<CircuitBreaker>,
}

impl RunHandle {
    /// The correlation id assigned at submit time. Needed for `cancel`.
    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    /// Await the result. Feeds the endpoint's circuit breaker: transport
    /// failures and timeouts count against it, engine-level rejections do
    /// not (the endpoint answered).
    pub async fn result(self) -> Result<ExecResultPayload, WeftError> {
        match self.receiver.await {
            Ok(Ok(result)) => {
                self.breaker.record_success();
                Ok(result)
            }
            Ok(Err(error)) => {
                if matches!(
                    error,
                    WeftError::RequestTimeout(_) | WeftError::Wire(_) | WeftError::ConnectionClosed
                ) {
                    self.breaker.record_failure();
                }
                Err(error)
            }
            Err(_) => {
                self.breaker.record_failure();
                Err(WeftError::ConnectionClosed)
            }
        }
    }
}

/// A connected client with a Ready session.
#[derive(Debug)]
pub struct Client {
    session: Session,
    commands: mpsc::Sender<Command>,
    next_correlation: AtomicU64,
    breaker: Arc<CircuitBreaker>,
    config: ClientConfig,
}

impl Client {
    /// Connect over an established byte stream: send Hello, await HelloAck,
    /// run the fail-closed acceptance checks, and spawn the connection's
    /// I/O task.
    ///
    /// Any negotiation failure aborts before Ready; no request is ever sent
    /// on a session that did not negotiate cleanly.
    pub async fn connect<IO>(io: IO, config: ClientConfig) -> Result<Self, WeftError>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut state = ConnectionState::Idle;
        tracing::debug!(state = state.as_str(), "connecting");
        let (read_half, write_half) = tokio::io::split(io);
        let mut reader = FrameReader::new(read_half, config.idle_read_timeout);
        let mut writer = FrameWriter::new(write_half);
        state = ConnectionState::Connected;
        tracing::debug!(state = state.as_str(), "byte stream established");

        let hello = HelloPayload::new(&config.client_name, &config.client_version);
        writer
            .write_frame(&Message::Hello(hello.clone()).encode(config.encoding)?)
            .await?;
        state = ConnectionState::Negotiating;
        tracing::debug!(state = state.as_str(), "hello sent");

        let frame = match tokio::time::timeout(config.connect_timeout, reader.read_frame()).await {
            Ok(frame) => frame?,
            Err(_) => {
                return Err(WeftError::Wire(WireError::Timeout(
                    "awaiting hello-ack".into(),
                )))
            }
        };

        let ack = match Message::decode(&frame, config.encoding)? {
            Message::HelloAck(ack) => ack,
            Message::Error(error) => {
                return Err(WeftError::EngineRejected {
                    code: error.code,
                    message: error.message,
                })
            }
            other => {
                return Err(WeftError::Wire(WireError::ProtocolViolation(format!(
                    "expected hello-ack, got {:?}",
                    other.frame_type()
                ))))
            }
        };

        // Fail closed: a mismatch here drops the connection on the floor.
        let session = accept(&hello, &ack)?;
        tracing::debug!(
            session_id = session.session_id(),
            version = ?session.negotiated_version(),
            "session ready"
        );

        let commands = connection::spawn(
            reader,
            writer,
            session.clone(),
            config.encoding,
            config.outbound_queue,
        );

        Ok(Self {
            session,
            commands,
            next_correlation: AtomicU64::new(1),
            breaker: Arc::new(CircuitBreaker::new(config.breaker.clone())),
            config,
        })
    }

    /// The negotiated session, read-only.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Submit a request: size-check the encoded frame, assign a correlation
    /// id and deadline, and register the pending entry with the I/O task.
    ///
    /// Fails fast with `Busy` when the outbound queue is full.
    pub fn submit(&self, request: &ExecRequest) -> Result<RunHandle, WeftError> {
        self.session.require_ready()?;
        self.breaker.allow()?;

        let correlation_id = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let payload = ExecRequestPayload {
            correlation_id,
            run_id: request.run_id.clone(),
            workflow: request.workflow.clone(),
            controls: request.controls.clone(),
            policy: request.policy.clone(),
            metadata: request.metadata.clone(),
        };

        // Frame-size validation happens here, before anything is queued.
        let frame = Message::ExecRequest(payload).encode(self.config.encoding)?;

        let (resolver, receiver) = oneshot::channel();
        let command = Command::Submit {
            correlation_id,
            frame,
            deadline: Instant::now() + self.config.request_timeout,
            timeout: self.config.request_timeout,
            resolver,
        };
        self.commands.try_send(command).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => WeftError::Wire(WireError::Busy),
            mpsc::error::TrySendError::Closed(_) => WeftError::ConnectionClosed,
        })?;

        Ok(RunHandle {
            correlation_id,
            receiver,
            breaker: Arc::clone(&self.breaker),
        })
    }

    /// Submit and await the result.
    pub async fn execute(&self, request: &ExecRequest) -> Result<ExecResultPayload, WeftError> {
        self.submit(request)?.result().await
    }

    /// Execute with the configured retry policy.
    ///
    /// Only retryable failures are retried. The jitter source is injected
    /// so tests can pin retry timing with a seeded source.
    pub async fn execute_with_retry(
        &self,
        request: &ExecRequest,
        jitter: &mut dyn JitterSource,
    ) -> Result<ExecResultPayload, WeftError> {
        let policy = self.config.retry.clone();
        retry::retry(&policy, jitter, || self.execute(request)).await
    }

    /// Request cancellation of engine-side work.
    ///
    /// This is the only way to stop a running request; a local timeout never
    /// cancels anything on the engine.
    pub fn cancel(&self, correlation_id: u64, run_id: &str) -> Result<(), WeftError> {
        self.session.require_ready()?;
        let payload = CancelPayload {
            correlation_id,
            run_id: run_id.to_string(),
        };
        let frame = Message::Cancel(payload).encode(self.config.encoding)?;
        self.commands
            .try_send(Command::Cancel { frame })
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => WeftError::Wire(WireError::Busy),
                mpsc::error::TrySendError::Closed(_) => WeftError::ConnectionClosed,
            })
    }

    /// Close the connection, draining queued outbound work.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close).await;
        self.session.close();
    }
}
