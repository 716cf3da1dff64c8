//! Transport retry with exponential backoff.
//!
//! Only transport failures (timeouts, refused connections, DNS) are retried.
//! HTTP error statuses and tool-level errors are returned on the first
//! occurrence; business-error retry policy belongs to the caller.

use std::future::Future;
use std::time::Duration;

use crate::error::McpError;

/// Retry budget for adapter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff unit; the wait after failed attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, waiting 2s then 4s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately (used by tests and local services).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails with a non-transport error, or the
/// attempt budget is spent. The closure receives the 1-based attempt number.
///
/// Returns the value together with the number of attempts it took.
pub async fn retry_transport<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    op: F,
) -> Result<(T, u32), McpError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, McpError>>,
{
    retry_transport_from(policy, op_name, 1, op).await
}

/// Like [`retry_transport`], for a call whose first `first_attempt - 1`
/// attempts were already spent elsewhere. Waits the backoff owed for those
/// before trying, and always makes at least one attempt.
pub async fn retry_transport_from<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    first_attempt: u32,
    mut op: F,
) -> Result<(T, u32), McpError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, McpError>>,
{
    let mut attempt = first_attempt.max(1);
    let max_attempts = policy.max_attempts.max(attempt);
    if attempt > 1 {
        tokio::time::sleep(policy.delay_for(attempt - 1)).await;
    }

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if e.is_transport() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    ?delay,
                    "Transport failure, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transport() {
                    tracing::warn!(
                        op = op_name,
                        attempts = attempt,
                        "Transport retries exhausted: {}",
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}
