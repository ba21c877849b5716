//! Per-round retry policy for transient provider failures.

use std::time::Duration;

use longform_config::RetryConfig;
use longform_core::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Bounds on how hard one round is retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per round, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap on any single backoff delay.
    pub max_delay: Duration,
    /// Minimum wait after a rate-limit response.
    pub rate_limit_delay: Duration,
    /// Bound on opening a stream and on each wait for the next fragment.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try the round again.
    RetryAfter(Duration),
    /// Transient, but the attempt budget is spent.
    Exhausted,
    /// Not worth retrying.
    Fatal,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt after `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    /// Classify the failure of attempt number `attempt` (1-based).
    pub fn decide(&self, error: &ProviderError, attempt: u32) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::Fatal;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        if error.is_rate_limit() {
            let hinted = error
                .retry_after_secs()
                .map(Duration::from_secs)
                .unwrap_or_default();
            return RetryDecision::RetryAfter(self.rate_limit_delay.max(hinted));
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            rate_limit_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn defaults_match_config() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_millis(1000));
        assert_eq!(p.rate_limit_delay, Duration::from_secs(10));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(1000));
        assert_eq!(p.backoff(2), Duration::from_millis(2000));
        assert_eq!(p.backoff(3), Duration::from_millis(3000));
        assert_eq!(p.backoff(40), Duration::from_millis(3000));
    }

    #[test]
    fn transient_errors_retry_until_exhausted() {
        let p = policy();
        let err = ProviderError::Network("reset".into());
        assert_eq!(
            p.decide(&err, 1),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
        assert_eq!(
            p.decide(&err, 2),
            RetryDecision::RetryAfter(Duration::from_millis(2000))
        );
        assert_eq!(p.decide(&err, 3), RetryDecision::Exhausted);
    }

    #[test]
    fn rate_limit_waits_at_least_the_floor() {
        let p = policy();
        let short = ProviderError::RateLimited { retry_after_secs: 2 };
        assert_eq!(
            p.decide(&short, 1),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
        let long = ProviderError::RateLimited { retry_after_secs: 30 };
        assert_eq!(
            p.decide(&long, 1),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
    }

    #[test]
    fn non_transient_is_fatal() {
        let p = policy();
        let err = ProviderError::InvalidRequest("bad".into());
        assert_eq!(p.decide(&err, 1), RetryDecision::Fatal);
        let err = ProviderError::AuthenticationFailed("key".into());
        assert_eq!(p.decide(&err, 1), RetryDecision::Fatal);
    }

    #[test]
    fn single_attempt_policy() {
        let p = RetryPolicy::none();
        assert_eq!(
            p.decide(&ProviderError::Timeout("t".into()), 1),
            RetryDecision::Exhausted
        );
    }
}
