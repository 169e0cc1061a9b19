// src/fetch/retry.rs

use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::{FetchError, TransportError};

/// Delay schedule between attempts. Every schedule is bounded and never
/// shrinks from one attempt to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * 2^(n-1)` before retry `n`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Wraps one idempotent remote operation with bounded, sequential retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: fn(&TransportError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(8),
            },
            retryable: TransportError::is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, retryable: fn(&TransportError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up. `op` receives the 1-based attempt number.
    pub async fn run<T, Op, Fut>(&self, url: &str, mut op: Op) -> Result<T, FetchError>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < max_attempts && (self.retryable)(&e) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(%url, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(%url, attempt, error = %e, "giving up");
                    return Err(FetchError {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}
