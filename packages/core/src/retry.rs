//! Retry policy: decides backoff delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for automatic retries.
///
/// The n-th retry waits `base_delay * 2^n`, where n is the retry count after
/// it was incremented for the failure being handled. With the default one
/// second base this is `2^n` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Largest exponent applied, keeps the delay finite for large retry limits.
    const MAX_EXPONENT: u32 = 20;

    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Delay before re-enqueueing a job whose retry count is now `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(Self::MAX_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
