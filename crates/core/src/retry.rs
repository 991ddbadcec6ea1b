//! Exponential-backoff policy for optimistic-concurrency retries.
//!
//! One policy serves every document mutation: `base * 2^(attempt-1)` plus a
//! small random jitter, bounded by a maximum attempt count. The jittered
//! delay keeps concurrent writers to the same document from retrying in
//! lockstep.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the optimistic-retry strategy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before giving up (first try included).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each failure after that.
    pub base_delay: Duration,
    /// Upper bound (exclusive) on the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after the given failed attempt
    /// (1-based): `base * 2^(attempt-1)`.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Full delay including sampled jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::rng().random_range(0..self.max_jitter.as_millis() as u64)
        };
        self.exponential_delay(attempt) + Duration::from_millis(jitter_ms)
    }
}
