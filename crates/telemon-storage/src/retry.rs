//! Bounded retries for operations that can fail on a flaky connection.

use std::future::Future;
use telemon_common::backoff::{Backoff, MAX_ATTEMPTS};

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Re-runs an operation while it fails with a [`Transient`] error.
///
/// Attempt `n` (0-based) that fails transiently is followed by a
/// `backoff.wait(n)` sleep. Permanent errors and the error of the final
/// attempt are returned unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryExecutor {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let wait = self.backoff.wait(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
