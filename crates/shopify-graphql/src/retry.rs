//! Retry advice for callers.
//!
//! The gateway never retries on its own; callers ask a [`RetryPolicy`] what to
//! do with an error they received.

use std::time::Duration;

use rand::Rng;

use crate::error::GatewayError;

/// Retry decision result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after a delay.
    RetryAfter(Duration),
    /// Do not retry.
    DoNotRetry,
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: usize,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum jitter to add to delays.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Decide whether to retry based on the error and attempt count.
    ///
    /// A server-supplied `retry_after` replaces the backoff delay.
    #[must_use]
    pub fn decide(&self, error: &GatewayError, attempt: usize) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = if let Some(hint) = error.retry_after() {
            u64::try_from(hint.as_millis()).unwrap_or(u64::MAX)
        } else {
            let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
            let exp = 2_u64
                .saturating_pow(u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
            base_ms.saturating_mul(exp)
        };
        let delay_ms = delay_ms.min(max_ms);

        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            let jitter_max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
            rand::thread_rng().gen_range(0..=jitter_max)
        };
        RetryDecision::RetryAfter(Duration::from_millis(delay_ms.saturating_add(jitter_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttled(retry_after: Option<Duration>) -> GatewayError {
        GatewayError::Throttled {
            message: "data: Throttled".to_string(),
            retry_after,
            errors: Vec::new(),
        }
    }

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn throttled_errors_back_off_exponentially() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&throttled(None), 1),
            RetryDecision::RetryAfter(Duration::from_millis(500))
        );
        assert_eq!(
            policy.decide(&throttled(None), 3),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }

    #[test]
    fn server_hint_wins_but_is_capped() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&throttled(Some(Duration::from_secs(3))), 1),
            RetryDecision::RetryAfter(Duration::from_secs(3))
        );
        assert_eq!(
            policy.decide(&throttled(Some(Duration::from_secs(600))), 1),
            RetryDecision::RetryAfter(Duration::from_secs(20))
        );
    }

    #[test]
    fn graphql_errors_are_not_retried() {
        let err = GatewayError::Graphql {
            message: "shop: Not found".to_string(),
            errors: Vec::new(),
        };
        assert_eq!(no_jitter().decide(&err, 1), RetryDecision::DoNotRetry);
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&throttled(None), policy.max_attempts),
            RetryDecision::DoNotRetry
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..32 {
            let RetryDecision::RetryAfter(delay) = policy.decide(&throttled(None), 1) else {
                panic!("expected retry");
            };
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(750));
        }
    }
}
