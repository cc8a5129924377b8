//! Stage retry policy with configurable backoff and jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(retry - 1)
    #[default]
    Exponential,
    /// delay = base * retry
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to spread out concurrent retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// How the controller retries a stage that failed retryably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per stage, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "crate::config::duration_ms")]
    pub base_delay: Duration,
    /// Upper bound on any delay.
    #[serde(with = "crate::config::duration_ms")]
    pub max_delay: Duration,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the maximum attempts, at least one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Returns true if another attempt is allowed after `attempt` attempts.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `retry` (1 for the first retry).
    ///
    /// A quota reset hint raises the delay to at least the hint, still capped
    /// at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let base = self.base_delay;
        let n = retry.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(n - 1);
                base.checked_mul(factor).unwrap_or(self.max_delay)
            }
            BackoffStrategy::Linear => base.checked_mul(n).unwrap_or(self.max_delay),
            BackoffStrategy::Constant => base,
        }
        .min(self.max_delay);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
            }
            JitterStrategy::Equal => {
                let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let half = ms / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
            }
        };

        match hint {
            Some(hint) => jittered.max(hint).min(self.max_delay),
            None => jittered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let policy = RetryPolicy::new().with_max_delay(Duration::from_secs(10));
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40, None), Duration::from_secs(10));
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(3, None), Duration::from_millis(300));

        let constant = linear.with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for(5, None), Duration::from_millis(100));
    }

    #[test]
    fn test_hint_raises_delay_within_cap() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(7))), Duration::from_secs(7));
        assert_eq!(policy.delay_for(2, Some(Duration::from_secs(1))), Duration::from_secs(4));
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(600))), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounds() {
        let full = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Full);
        let equal = full.clone().with_jitter(JitterStrategy::Equal);
        for _ in 0..20 {
            assert!(full.delay_for(1, None) <= Duration::from_millis(100));
            let d = equal.delay_for(1, None);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_allows_retry() {
        let policy = RetryPolicy::new().with_max_attempts(3);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!RetryPolicy::no_retry().allows_retry(1));
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts, 1);
    }
}
