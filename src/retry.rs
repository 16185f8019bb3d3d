//! Bounded retry for rate-limited provider calls.
//!
//! Only [`ErrorKind::RateLimit`] is retried, with the same credentials and a
//! Fibonacci-increasing delay. Every other kind is returned immediately.

use std::future::Future;
use std::time::Duration;

use backon::{FibonacciBuilder, Retryable};

use crate::config::RetryPolicy;
use crate::error::{ErrorKind, SpotifyError};

/// Delays of `base * fib(n)`: base, base, 2*base, ... capped at `max_retries`.
pub fn backoff(policy: RetryPolicy) -> FibonacciBuilder {
    FibonacciBuilder::default()
        .with_min_delay(policy.base_delay)
        .with_max_times(policy.max_retries as usize)
}

/// Runs `op`, retrying up to `policy.max_retries` times while it fails with a
/// rate-limit error.
pub async fn retry_rate_limited<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    op: F,
) -> Result<T, SpotifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SpotifyError>>,
{
    op.retry(backoff(policy))
        .when(|e: &SpotifyError| e.kind == ErrorKind::RateLimit)
        .notify(|e: &SpotifyError, delay: Duration| {
            tracing::warn!(
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "{} rate limited, backing off",
                what
            );
        })
        .await
        .inspect_err(|e| {
            if e.kind == ErrorKind::RateLimit {
                tracing::error!("{} still rate limited, giving up", what);
            }
        })
}
