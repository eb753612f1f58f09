use super::ClientError;
use std::time::Duration;

/// How many times a request is attempted and how long to wait in between.
///
/// The wait before retry `n` (counting from zero) is `base_delay * 2^n`, so
/// with the default one second base the pauses are 1s, 2s, 4s...
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// When `false`, failures that will not go away on their own (4xx
    /// answers, unreadable local files) stop the retry loop early.
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            retry_client_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Pause after the failed attempt number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn should_retry(&self, err: &ClientError) -> bool {
        self.retry_client_errors || err.is_transient()
    }
}
