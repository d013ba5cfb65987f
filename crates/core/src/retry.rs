//! Bounded retry with exponential backoff
//!
//! Used by stages when (re-)establishing external-service connections.

use std::future::Future;
use std::time::Duration;

use crate::ServiceError;

/// Retry policy for external-service connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on each further attempt.
    pub initial_backoff: Duration,
    /// Upper bound on the backoff between attempts.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff to sleep after failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Runs `op` until it succeeds or the policy's attempts are exhausted.
///
/// Failures between attempts are logged at debug level; the final failure is
/// returned to the caller, which decides how to degrade.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt + 1 < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                tracing::debug!(
                    service = what,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    %error,
                    "service connection attempt failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
