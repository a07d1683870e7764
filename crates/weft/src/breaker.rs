//! Circuit breaker for outbound dispatch to one engine endpoint.
//!
//! N consecutive failures open the circuit for a cool-down window; after the
//! window one probe is allowed through, and its outcome decides whether the
//! circuit closes again. This bounds retry amplification against an
//! unreachable engine.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::WeftError;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerOptions {
    /// Consecutive failures before the circuit opens.
    pub threshold: u32,
    /// How long the circuit stays open before allowing a probe.
    pub cooldown: Duration,
    /// Probes allowed in the half-open state.
    pub half_open_max: u32,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_max: 1,
        }
    }
}

/// Circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow.
    Closed,
    /// Requests are refused until the cool-down elapses.
    Open,
    /// A limited number of probes may test the endpoint.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    probes_in_flight: u32,
    opened_at: Option<Instant>,
}

/// A circuit breaker guarding one engine endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    opts: BreakerOptions,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(opts: BreakerOptions) -> Self {
        Self {
            opts,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probes_in_flight: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Check whether a request may go out.
    ///
    /// In the open state this transitions to half-open once the cool-down
    /// has elapsed; otherwise it fails with `CircuitOpen` and the remaining
    /// wait.
    pub fn allow(&self) -> Result<(), WeftError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.opts.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.probes_in_flight = 1;
                    Ok(())
                } else {
                    Err(WeftError::CircuitOpen {
                        retry_after: self.opts.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.opts.half_open_max {
                    inner.probes_in_flight += 1;
                    Ok(())
                } else {
                    Err(WeftError::CircuitOpen {
                        retry_after: Duration::ZERO,
                    })
                }
            }
        }
    }

    /// Record a successful request. Closes a half-open circuit and resets
    /// the failure counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.probes_in_flight = 0;
            inner.opened_at = None;
        }
    }

    /// Record a failed request. Opens the circuit at the threshold, and
    /// re-opens immediately from half-open.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.opts.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.consecutive_failures = 0;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probes_in_flight = 0;
            }
            CircuitState::Open => {}
        }
    }
}
