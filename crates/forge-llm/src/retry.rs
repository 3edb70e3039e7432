//! Bounded exponential backoff.

use crate::error::LlmError;
use rand::Rng;
use std::time::Duration;

/// Retry policy for LLM calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Backoff growth per attempt.
    pub multiplier: f64,
    /// Upper bound for any single delay, including `retry_after` hints.
    pub max_delay: Duration,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(3),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Whether `error` on zero-based `attempt` should be retried.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &LlmError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Delay before retrying after `error` on zero-based `attempt`.
    ///
    /// A provider `retry_after` hint replaces the computed backoff.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimit {
            retry_after: Some(hint),
        } = error
        {
            return (*hint).min(self.max_delay);
        }

        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let mut secs = base.min(self.max_delay.as_secs_f64());
        if self.jitter && secs > 0.0 {
            secs += rand::thread_rng().gen_range(0.0..=secs * 0.25);
            secs = secs.min(self.max_delay.as_secs_f64());
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1)).without_jitter();
        let err = LlmError::Timeout(10);
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &err), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1))
            .without_jitter()
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(8, &LlmError::Timeout(1)), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3)).without_jitter();
        let err = LlmError::RateLimit {
            retry_after: Some(Duration::from_millis(250)),
        };
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(250));

        let huge = LlmError::RateLimit {
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert_eq!(policy.delay_for(0, &huge), policy.max_delay);
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        for _ in 0..50 {
            let d = policy.delay_for(0, &LlmError::Network("x".into()));
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let transient = LlmError::Network("reset".into());
        assert!(policy.should_retry(0, &transient));
        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(2, &transient));
        assert!(!policy.should_retry(0, &LlmError::Authentication("no".into())));
        assert!(!RetryPolicy::none().should_retry(0, &transient));
    }
}
