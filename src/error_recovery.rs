// src/error_recovery.rs
//! Retry with exponential backoff for page fetches.

use crate::error::FetchError;
use std::time::Duration;

/// How many times, and how patiently, a page fetch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_FETCH_ATTEMPTS,
            initial_backoff: crate::constants::DEFAULT_INITIAL_BACKOFF,
            max_backoff: crate::constants::DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Retries an async operation with exponential backoff.
///
/// Only retryable failures are retried; a definitive failure (such as
/// `NotFound`) is returned on the attempt that produced it.
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_backoff;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt == max_attempts => {
                log::warn!("Giving up after {} attempts: {}", attempt, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!(
                    "Attempt {} failed ({}), retrying after {:?}",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = std::cmp::min(delay * 2, policy.max_backoff);
            }
        }
    }

    unreachable!("the final attempt always returns")
}
