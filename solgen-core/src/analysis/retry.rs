//! Whole-pipeline retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};

pub const DEFAULT_PIPELINE_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PIPELINE_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// A value together with the attempt that produced it (from 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy's attempts are spent,
/// sleeping `base_delay * attempt` between attempts. The operation receives
/// the attempt number. Returns the last error when every attempt fails.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<Retried<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(value) => {
                info!(label, attempt, "pipeline succeeded");
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(err) => {
                warn!(label, attempt, max_attempts, error = %err, "pipeline attempt failed");
                last_error = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Internal(format!("{} made no attempts", label))))
}
