//! Retry policy for transient stage failures.
//!
//! Only failures that look like infrastructure hiccups are retried; anything
//! else propagates immediately. Backoff is linear: the delay grows by one
//! base interval per failed attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Message fragments that mark a failure as transient.
const TRANSIENT_SIGNALS: [&str; 6] = ["rate", "limit", "timeout", "provider", "connection", "api"];

/// Whether an error message looks like a transient infrastructure failure.
pub fn is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNALS.iter().any(|s| lower.contains(s))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds; attempt n waits n * base
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
        }
    }
}

impl RetryPolicy {
    /// Delay after a specific failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(attempt.max(1) as u64))
    }

    /// Whether another attempt should follow this failure.
    pub fn should_retry(&self, attempt: u32, message: &str) -> bool {
        attempt < self.max_attempts && is_transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 30_000,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(90));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient("Rate limit exceeded"));
        assert!(is_transient("provider unavailable"));
        assert!(is_transient("connection timeout while fetching"));
        assert!(is_transient("API returned 503"));
        assert!(!is_transient("unknown column: 'age'"));
        assert!(!is_transient("validation failed: empty column name"));
    }

    #[test]
    fn test_retry_bounded_by_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        };
        assert!(policy.should_retry(1, "timeout"));
        assert!(policy.should_retry(2, "timeout"));
        assert!(!policy.should_retry(3, "timeout"));
        assert!(!policy.should_retry(1, "bad schema"));
    }
}
