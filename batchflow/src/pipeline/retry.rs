//! Per-task retry policy with optional capped exponential backoff.

use crate::errors::BatchflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry behavior of a task or a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts (including the initial one). Always at least 1.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Whether the delay doubles after each failed attempt.
    #[serde(default)]
    pub exponential: bool,
    /// Maximum delay cap in milliseconds (exponential backoff only).
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            exponential: false,
            max_delay_ms: u64::MAX,
        }
    }
}

impl RetryPolicy {
    /// Creates a single-attempt policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fixed-delay policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_base_delay(delay)
    }

    /// Creates a capped exponential backoff policy.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::fixed(max_attempts, base_delay)
            .with_exponential(true)
            .with_max_delay(max_delay)
    }

    /// Sets the maximum attempts; values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = duration_ms(delay);
        self
    }

    /// Enables or disables exponential backoff.
    #[must_use]
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Sets the maximum delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff delay following failed attempt `attempt` (1-indexed).
    ///
    /// `base` when exponential backoff is off, otherwise
    /// `min(base * 2^(attempt-1), max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay();
        }
        let exponent = attempt.saturating_sub(1);
        let multiplier = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Delay before the attempt after `attempt`, or `None` if it was the last.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.backoff_delay(attempt))
    }

    /// Decides what happens after attempt `attempt` failed with `error`.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &BatchflowError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        match self.delay_after(attempt) {
            Some(delay) => RetryDecision::Retry(delay),
            None => RetryDecision::GiveUp,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts remain.
    GiveUp,
    /// The error is not retryable.
    NotRetryable,
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn minutes(delay: Duration) -> u64 {
        delay.as_secs() / 60
    }

    #[test]
    fn test_default_is_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_after(1), None);
    }

    #[test]
    fn test_max_attempts_at_least_one() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_exponential_sequence_is_capped() {
        let policy = RetryPolicy::exponential(10, 5 * MINUTE, 30 * MINUTE);
        let delays: Vec<u64> = (1..=6).map(|n| minutes(policy.backoff_delay(n))).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30, 30]);
    }

    #[test]
    fn test_linear_sequence_is_constant() {
        let policy = RetryPolicy::fixed(10, 5 * MINUTE);
        let delays: Vec<u64> = (1..=5).map(|n| minutes(policy.backoff_delay(n))).collect();
        assert_eq!(delays, vec![5, 5, 5, 5, 5]);
    }

    #[test]
    fn test_delay_after_last_attempt() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(120));
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(120)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(120)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::exponential(u32::MAX, MINUTE, 30 * MINUTE);
        assert_eq!(policy.backoff_delay(200), 30 * MINUTE);
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(10));
        let transient = BatchflowError::execution("flaky");
        let fatal = BatchflowError::duplicate_result("t", "k");

        assert_eq!(
            policy.decide(1, &transient),
            RetryDecision::Retry(Duration::from_millis(10))
        );
        assert_eq!(policy.decide(2, &transient), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, &fatal), RetryDecision::NotRetryable);
    }

    #[test]
    fn test_serde_round_trip_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts":3,"base_delay_ms":5000,"max_delay_ms":5000}"#)
                .unwrap();
        assert!(!policy.exponential);
        assert_eq!(policy.base_delay(), Duration::from_secs(5));
    }
}
