//! Exponential backoff with full jitter, shared by every external-call site.
use std::time::Duration;

use rand::Rng;

/// Retry strategy configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub(crate) max_attempts: usize,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub(crate) const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before the given attempt (0-indexed; attempt 0 never waits).
    #[must_use]
    pub(crate) fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(63);
        let exponential_delay = self.base_delay_ms.checked_shl(shift).unwrap_or(u64::MAX);
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let jittered_delay = if capped_delay > 0 {
            rand::rng().random_range(0..=capped_delay)
        } else {
            0
        };

        Duration::from_millis(jittered_delay)
    }

    #[must_use]
    pub(crate) const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

/// Transient-transport classification: timeouts, connection failures, 5xx, and 429.
pub(crate) fn is_retryable_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    if let Some(status) = error.status() {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return true;
        }
    }
    false
}
