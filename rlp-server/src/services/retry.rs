//! Exponential backoff with full jitter

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub const fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Upper bound of the wait before `attempt` (0-based); zero for the first
    pub fn max_delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(attempt - 1).unwrap_or(u64::MAX));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Randomized wait in `[0, max_delay_for_attempt]`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let cap = self.max_delay_for_attempt(attempt).as_millis() as u64;
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }

    /// Another attempt is allowed after `attempts_made`
    pub fn can_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Transport failures, timeouts, 429 and 5xx are worth retrying
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

pub fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().is_some_and(is_retryable_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_delay() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let config = RetryConfig::new(10, 100, 1_000);
        assert_eq!(config.max_delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.max_delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.max_delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.max_delay_for_attempt(5), Duration::from_millis(1_000));
        assert_eq!(config.max_delay_for_attempt(80), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_within_cap() {
        let config = RetryConfig::new(5, 100, 1_000);
        for _ in 0..50 {
            assert!(config.delay_for_attempt(3) <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_can_retry() {
        let config = RetryConfig::default();
        assert!(config.can_retry(1));
        assert!(config.can_retry(2));
        assert!(!config.can_retry(3));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
    }
}
