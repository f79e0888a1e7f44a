//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Deadline for each remote call made while pushing an item.
    pub push_timeout: Duration,
    /// Backoff used by `sync_with_retry`.
    pub retry: RetryConfig,
    /// Whether a run first drops items synced by earlier runs.
    pub auto_compact: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            push_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            auto_compact: true,
        }
    }

    /// Sets the per-call push timeout.
    #[must_use]
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether runs compact synced items first.
    #[must_use]
    pub fn with_auto_compact(mut self, value: bool) -> Self {
        self.auto_compact = value;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff between whole sync runs.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of runs, the first included.
    pub max_attempts: u32,
    /// Delay before the second run.
    pub initial_delay: Duration,
    /// Upper bound on any delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor between delays.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration allowing `max_attempts` runs.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A configuration that runs once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, value: bool) -> Self {
        self.add_jitter = value;
        self
    }

    /// Delay before run `attempt` (0-indexed; the first run has none).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter && capped > 0.0 {
            let jitter = rand::thread_rng().gen_range(0.0..=0.25);
            Duration::from_secs_f64(capped * (1.0 + jitter))
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_push_timeout(Duration::from_secs(5))
            .with_auto_compact(false)
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.push_timeout, Duration::from_secs(5));
        assert!(!config.auto_compact);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(RetryConfig::default().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn delays_grow_exponentially() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));
        for _ in 0..50 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(5));
    }
}
