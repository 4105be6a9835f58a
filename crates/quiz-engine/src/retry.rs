//! Retry with exponential backoff and jitter for collaborator calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff policy for retried operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Wait before the second attempt; doubled after each failure.
    pub base_backoff: Duration,
    /// Upper bound for the doubled backoff.
    pub max_backoff: Duration,
    /// Random extra wait added to each backoff, if any.
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// A policy with no waiting between attempts.
    #[must_use]
    pub const fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }

    fn wait_for(&self, backoff: Duration) -> Duration {
        match self.jitter_max {
            Some(jitter) if !jitter.is_zero() => {
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                backoff + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
            }
            _ => backoff,
        }
    }
}

/// Outcome of a retried operation that gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// Number of attempts made.
    pub attempts: usize,
    /// The error from the last attempt.
    pub last_error: E,
}

/// Runs `op` until it succeeds, `should_retry` rejects an error, or the
/// attempt budget is spent.
///
/// At least one attempt is always made, even when `max_attempts` is zero.
pub async fn retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut should_retry: P,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempts >= max_attempts || !should_retry(&e) => {
                return Err(RetryExhausted {
                    attempts,
                    last_error: e,
                });
            }
            Err(_) => {
                let wait = config.wait_for(backoff);
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

/// Runs `op` until it succeeds or the attempt budget is spent.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, op: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_if(config, |_| true, op).await
}
