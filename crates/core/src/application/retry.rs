// Conflict retry policy
use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts (first try included)
pub const DEFAULT_CONFLICT_ATTEMPTS: u32 = 3;

/// Default base delay between attempts (10ms)
pub const DEFAULT_CONFLICT_BASE_DELAY_MS: u64 = 10;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-run the operation after this delay (ms)
    Retry(u64),
    /// Give up and surface the error
    GiveUp,
}

/// Re-runs whole operations that lost an optimistic race
///
/// Only `Conflict` is retried: every other kind is deterministic and
/// would fail the same way again. Each attempt re-reads state from
/// scratch, so a retried call-next re-selects its ticket.
#[derive(Debug, Clone)]
pub struct ConflictRetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_ATTEMPTS, DEFAULT_CONFLICT_BASE_DELAY_MS)
    }
}

impl ConflictRetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first (minimum 1)
    /// * `base_delay_ms` - Delay before the first retry
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    /// No retries at all
    pub fn disabled() -> Self {
        Self::new(1, 0)
    }

    /// Decide what to do after `attempt` (1-based) failed with a conflict
    ///
    /// Backoff formula:
    /// delay = base_delay * 2^(attempt - 1) * (1.0 ± 0.1)
    pub fn should_retry(&self, operation: &str, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let base = self.base_delay_ms as f64 * 2f64.powi(attempt as i32 - 1);

        // Deterministic ±10% jitter seeded by operation name and attempt
        let jitter_seed = operation.bytes().map(u32::from).sum::<u32>() + attempt;
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        RetryDecision::Retry((base * jitter_factor) as u64)
    }

    /// Run `op`, re-running it while it fails with `Conflict`
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_retryable() => match self.should_retry(operation, attempt) {
                    RetryDecision::Retry(delay_ms) => {
                        debug!(
                            operation = operation,
                            attempt = attempt,
                            delay_ms = delay_ms,
                            error = %err,
                            "Retrying after conflict"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        warn!(
                            operation = operation,
                            attempts = attempt,
                            error = %err,
                            "Conflict persisted, giving up"
                        );
                        return Err(err);
                    }
                },
                other => return other,
            }
        }
    }
}
