//! Retry with bounded exponential backoff and injectable jitter.
//!
//! Production uses thread-local randomness for jitter; tests inject a seeded
//! source so CI retry timing stays reproducible run to run.

use std::future::Future;
use std::time::Duration;

use weft_core::SeededRng;

use crate::breaker::CircuitBreaker;
use crate::error::WeftError;

/// A source of jitter values in `[0, 1)`.
pub trait JitterSource: Send {
    fn next_jitter(&mut self) -> f64;
}

/// Production jitter from thread-local randomness.
#[derive(Debug, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn next_jitter(&mut self) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen()
    }
}

/// Deterministic jitter for tests, driven by the seeded PRNG.
#[derive(Debug)]
pub struct SeededJitter {
    rng: SeededRng,
}

impl SeededJitter {
    pub fn new(seed: &str) -> Self {
        Self {
            rng: SeededRng::new(seed),
        }
    }
}

impl JitterSource for SeededJitter {
    fn next_jitter(&mut self) -> f64 {
        self.rng.next()
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first try.
    pub max_retries: u32,
    /// Initial backoff delay.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Exponential multiplier per attempt.
    pub multiplier: f64,
    /// Jitter fraction in [0, 1]: the delay varies by +/- this share.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32, jitter: &mut dyn JitterSource) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let mut delay = (self.base_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());

        if self.jitter > 0.0 {
            let spread = jitter.next_jitter() * 2.0 - 1.0;
            delay += delay * self.jitter.clamp(0.0, 1.0) * spread;
        }

        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Run an operation with retries.
///
/// Only retryable errors (transport `Timeout`/`Busy`, request timeouts,
/// retryable engine rejections) are retried; determinism and negotiation
/// failures propagate immediately.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    jitter: &mut dyn JitterSource,
    mut op: F,
) -> Result<T, WeftError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WeftError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_retries {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt, jitter);
                tracing::debug!(attempt, ?delay, %error, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry behind a circuit breaker.
///
/// The breaker is consulted before every attempt; successes and failures
/// feed back into it, and an open circuit aborts the loop immediately.
pub async fn retry_with_breaker<T, F, Fut>(
    policy: &RetryPolicy,
    jitter: &mut dyn JitterSource,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T, WeftError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WeftError>>,
{
    let mut attempt = 0u32;
    loop {
        breaker.allow()?;
        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(error) => {
                breaker.record_failure();
                if !error.is_retryable() || attempt >= policy.max_retries {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt, jitter);
                tracing::debug!(attempt, ?delay, %error, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerOptions;
    use std::sync::atomic::{AtomicU32, Ordering};
    use weft_wire::WireError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    #[test]
    fn test_seeded_jitter_reproducible() {
        let policy = RetryPolicy::default();
        let mut a = SeededJitter::new("ci-jitter");
        let mut b = SeededJitter::new("ci-jitter");
        for attempt in 0..5 {
            assert_eq!(policy.delay_for(attempt, &mut a), policy.delay_for(attempt, &mut b));
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let mut jitter = SeededJitter::new("unused");
        let d0 = policy.delay_for(0, &mut jitter);
        let d1 = policy.delay_for(1, &mut jitter);
        let d10 = policy.delay_for(10, &mut jitter);
        assert_eq!(d0, Duration::from_millis(100));
        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d10, policy.max_delay);
    }

    #[tokio::test]
    async fn test_retries_only_retryable_errors() {
        let calls = AtomicU32::new(0);
        let mut jitter = SeededJitter::new("t");
        let result: Result<(), WeftError> = retry(&fast_policy(), &mut jitter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(WeftError::ConnectionClosed) }
        })
        .await;
        assert!(matches!(result, Err(WeftError::ConnectionClosed)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let mut jitter = SeededJitter::new("t");
        let result = retry(&fast_policy(), &mut jitter, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(WeftError::Wire(WireError::Busy))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_breaker_opens_during_retry() {
        let breaker = CircuitBreaker::new(BreakerOptions {
            threshold: 2,
            cooldown: Duration::from_secs(60),
            half_open_max: 1,
        });
        let mut jitter = SeededJitter::new("t");
        let result: Result<(), WeftError> =
            retry_with_breaker(&fast_policy(), &mut jitter, &breaker, || async {
                Err(WeftError::Wire(WireError::Busy))
            })
            .await;
        // Two failures trip the breaker; the third attempt is refused.
        assert!(matches!(result, Err(WeftError::CircuitOpen { .. })));
    }
}
