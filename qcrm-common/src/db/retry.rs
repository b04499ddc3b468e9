//! Retry of transient storage failures
//!
//! Operations failing with [`Error::StorageUnavailable`] are retried with
//! exponential backoff up to a fixed number of attempts; any other error is
//! returned immediately.

use std::time::Duration;

use crate::config::StorageRetryConfig;
use crate::{Error, Result};

/// Attempt cap and backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        StorageRetryConfig::default().into()
    }
}

impl From<StorageRetryConfig> for RetryPolicy {
    fn from(config: StorageRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: crate::time::millis_to_duration(config.initial_backoff_ms),
            max_backoff: crate::time::millis_to_duration(config.max_backoff_ms),
        }
    }
}

/// Run `operation`, retrying while it reports storage as unavailable
///
/// **Backoff Strategy:** starts at `initial_backoff`, doubles per attempt,
/// capped at `max_backoff`. After `max_attempts` the last error is returned.
pub async fn retry_on_unavailable<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Storage operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Storage unavailable, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff, policy.max_backoff);
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Storage operation failed: retry attempts exhausted"
                    );
                }
                return Err(match err {
                    Error::StorageUnavailable(msg) if attempt > 1 => Error::StorageUnavailable(
                        format!("{} (after {} attempts)", msg, attempt),
                    ),
                    other => other,
                });
            }
        }
    }
}

/// Doubled backoff, capped; saturates instead of overflowing
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
