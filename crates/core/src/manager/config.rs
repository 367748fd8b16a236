//! # Coordinator Configuration

use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_TRY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for [`TxManager`](super::TxManager).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Try-phase budget for a whole transaction.
    pub try_timeout: Duration,
    /// Spacing between monitor ticks.
    pub monitor_interval: Duration,
    /// Gates the reconciliation loop.
    pub enable_monitor: bool,
    /// Backoff parameters for confirm/cancel delivery.
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            try_timeout: DEFAULT_TRY_TIMEOUT,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            enable_monitor: true,
            retry: RetryPolicy::standard(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_try_timeout(mut self, timeout: Duration) -> Self {
        self.try_timeout = timeout;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_monitor_enabled(mut self, enabled: bool) -> Self {
        self.enable_monitor = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from `TCC_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        fn env_ms(key: &str) -> Option<Duration> {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        }

        let mut config = Self::default();

        if let Some(timeout) = env_ms("TCC_TRY_TIMEOUT_MS") {
            config.try_timeout = timeout;
        }
        if let Some(interval) = env_ms("TCC_MONITOR_INTERVAL_MS") {
            config.monitor_interval = interval;
        }
        if let Ok(enabled) = std::env::var("TCC_ENABLE_MONITOR") {
            if let Ok(enabled) = enabled.parse() {
                config.enable_monitor = enabled;
            }
        }
        if let Some(max_retries) = std::env::var("TCC_RETRY_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry.max_retries = max_retries;
        }
        if let Some(base_delay) = env_ms("TCC_RETRY_BASE_DELAY_MS") {
            config.retry.base_delay = base_delay;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CoordinatorConfig::default();

        assert_eq!(config.try_timeout, Duration::from_secs(30));
        assert_eq!(config.monitor_interval, Duration::from_secs(10));
        assert!(config.enable_monitor);
        assert_eq!(config.retry, RetryPolicy::standard());
    }

    #[test]
    fn builder_chain() {
        let config = CoordinatorConfig::new()
            .with_try_timeout(Duration::from_millis(250))
            .with_monitor_interval(Duration::from_secs(1))
            .with_monitor_enabled(false)
            .with_retry(RetryPolicy::aggressive());

        assert_eq!(config.try_timeout, Duration::from_millis(250));
        assert_eq!(config.monitor_interval, Duration::from_secs(1));
        assert!(!config.enable_monitor);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn env_loading() {
        unsafe {
            std::env::set_var("TCC_TRY_TIMEOUT_MS", "1500");
            std::env::set_var("TCC_ENABLE_MONITOR", "false");
            std::env::set_var("TCC_RETRY_MAX_RETRIES", "7");
        }

        let config = CoordinatorConfig::from_env();

        assert_eq!(config.try_timeout, Duration::from_millis(1500));
        assert!(!config.enable_monitor);
        assert_eq!(config.retry.max_retries, 7);

        unsafe {
            std::env::remove_var("TCC_TRY_TIMEOUT_MS");
            std::env::remove_var("TCC_ENABLE_MONITOR");
            std::env::remove_var("TCC_RETRY_MAX_RETRIES");
        }
    }
}
