use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Fixed-base backoff with additive jitter. The delay does not grow with the
/// attempt number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before the next attempt: `base_delay + uniform(0, max_jitter)`.
    pub fn backoff(&self) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base_delay;
        }
        let jitter = rand::rng().random_range(0..=jitter_ms);
        self.base_delay + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..1000 {
            let delay = policy.backoff();
            assert!(delay >= Duration::from_millis(2500));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_backoff_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_jitter_ms: 0,
        });
        assert_eq!(policy.max_attempts, 1);
    }
}
