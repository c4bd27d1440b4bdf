//! Retry-with-backoff combinator.
//!
//! One combinator serves the single-file, parallel-batch, and sequential
//! paths; the retryable-vs-terminal split lives on `SkiffError`.

use crate::xfer::error::SkiffResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retries with linear backoff (`backoff × attempt`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = try once).
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Run `op` until it succeeds, fails terminally, or exhausts the policy.
///
/// `op` receives the 1-based attempt number; callers open a fresh session
/// inside it so a connection that saw a failure is never reused.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> SkiffResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SkiffResult<T>>,
{
    let attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = policy.backoff.saturating_mul(attempt);
                log::warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    attempts,
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
