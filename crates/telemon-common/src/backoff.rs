//! Exponential backoff shared by HTTP delivery and storage retries.

use std::time::Duration;

/// Total attempts (first try included) for retried operations.
pub const MAX_ATTEMPTS: u32 = 4;

/// Wait before retrying after the given 0-based attempt: `2^attempt` seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use telemon_common::backoff::backoff;
///
/// assert_eq!(backoff(0), Duration::from_secs(1));
/// assert_eq!(backoff(3), Duration::from_secs(8));
/// ```
pub fn backoff(attempt: u32) -> Duration {
    Backoff::default().wait(attempt)
}

/// Deterministic exponential schedule, `unit * 2^attempt`, no jitter.
///
/// The unit is one second in production; tests shrink it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    unit: Duration,
}

impl Backoff {
    pub const fn with_unit(unit: Duration) -> Self {
        Self { unit }
    }

    pub fn wait(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::with_unit(Duration::from_secs(1))
    }
}
