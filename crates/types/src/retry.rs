//! Retry policy declarations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_duration;

/// Fixed-delay retry rule applied to invocations that end in a retryable error.
///
/// `max_retry_count` counts re-attempts, so a policy of 3 allows up to four attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retry_count: u32,
    #[serde(with = "serde_duration")]
    pub delay_interval: Duration,
}

impl RetryPolicy {
    pub fn fixed_delay(max_retry_count: u32, delay_interval: Duration) -> Self {
        Self {
            max_retry_count,
            delay_interval,
        }
    }

    /// Single attempt, no delay. Equivalent to declaring no policy.
    pub fn none() -> Self {
        Self::fixed_delay(0, Duration::ZERO)
    }

    /// Upper bound on handler attempts under this policy.
    pub fn max_attempts(&self) -> u32 {
        self.max_retry_count.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
