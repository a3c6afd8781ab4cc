use std::time::Duration;

/// Retry configuration for list fetches
///
/// The default is three attempts with a fixed one-second pause between them
/// (`backoff_multiplier` of 1.0 keeps the delay flat).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 1000, max_delay_ms: 30000, backoff_multiplier: 1.0 }
    }
}

impl RetryConfig {
    /// Create from the `[fetch]` config section
    ///
    /// The cap is raised to the configured delay so a long delay is honored.
    pub fn from_options(max_attempts: u32, retry_delay_ms: u64) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay_ms: retry_delay_ms,
            max_delay_ms: defaults.max_delay_ms.max(retry_delay_ms),
            ..defaults
        }
    }

    /// Calculate delay before the given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = if attempt == 0 {
            0
        } else {
            let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
            delay.min(self.max_delay_ms as f64) as u64
        };

        Duration::from_millis(delay_ms)
    }

    /// Check if another attempt is allowed given the attempt number
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 1000);
    }

    #[test]
    fn test_default_delay_is_fixed() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0).as_millis(), 0);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 1000);
    }

    #[test]
    fn test_retry_delay_with_backoff() {
        let config = RetryConfig { initial_delay_ms: 500, backoff_multiplier: 3.0, ..Default::default() };

        assert_eq!(config.delay_for_attempt(1).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 1500);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 4500);
    }

    #[test]
    fn test_retry_delay_with_max() {
        let config =
            RetryConfig { initial_delay_ms: 1000, backoff_multiplier: 10.0, max_delay_ms: 5000, ..Default::default() };

        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 5000);
    }

    #[test]
    fn test_from_options_keeps_at_least_one_attempt() {
        let config = RetryConfig::from_options(0, 250);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 250);
    }

    #[test]
    fn test_from_options_honors_delay_above_default_cap() {
        let config = RetryConfig::from_options(3, 45_000);
        assert_eq!(config.max_delay_ms, 45_000);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 45_000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 45_000);

        assert_eq!(RetryConfig::from_options(3, 1000).max_delay_ms, 30_000);
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig { max_attempts: 3, ..Default::default() };

        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }
}
