//! Retry policy for throttled and re-authenticated requests.
//!
//! The transport re-sends the identical request when the API signals
//! throttling or an invalid token. `RetryPolicy` bounds how often that may
//! happen within one logical call and how long to wait between throttled
//! attempts, replacing unbounded recursive re-dispatch.

use std::time::Duration;

/// Bounded retry with fixed or exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Throttled requests allowed per logical call, including the first.
    /// The re-authentication resend is not counted.
    pub max_attempts: u32,
    /// Wait before the first retry of a throttled request.
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    /// Growth factor applied per throttled retry; `1.0` keeps the wait fixed.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and fixed delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// No retries at all.
    pub fn disabled() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay.max(self.base_delay))
    }

    /// Whether another request may be sent after `attempts` were made.
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
