//! Retry for directory fetches - exponential backoff with jitter
//!
//! Disabled by default (`max_retries = 0`): a failed fetch fails on the
//! first attempt unless retries are configured.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
    /// Random spread applied to each delay (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Retry executor
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    /// Create strategy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Strategy that never retries
    pub fn none() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate delay for nth retry
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Run `operation`, retrying fetch-class failures
    pub async fn execute<F, Fut, T>(&self, operation: F, operation_name: &str) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "{} succeeded on retry attempt {}/{}",
                            operation_name, attempt, self.config.max_retries
                        );
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = self.calculate_delay(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        operation_name, e, attempt, self.config.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = RetryStrategy::new(no_jitter(3));

        assert_eq!(strategy.calculate_delay(0).as_millis(), 1000);
        assert_eq!(strategy.calculate_delay(1).as_millis(), 2000);
        assert_eq!(strategy.calculate_delay(2).as_millis(), 4000);
        assert_eq!(strategy.calculate_delay(10).as_millis(), 5000);
    }

    #[tokio::test]
    async fn test_default_does_not_retry() {
        let calls = &AtomicU32::new(0);

        let result: Result<()> = RetryStrategy::none()
            .execute(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Fetch("connection refused".into()))
                },
                "fetch",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_fetch_errors_until_success() {
        let calls = &AtomicU32::new(0);

        let result = RetryStrategy::new(no_jitter(3))
            .execute(
                || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(Error::Fetch("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                },
                "fetch",
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);

        let result: Result<()> = RetryStrategy::new(no_jitter(2))
            .execute(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Timeout { millis: 1000, operation: "fetch".into() })
                },
                "fetch",
            )
            .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_errors_not_retried() {
        let calls = &AtomicU32::new(0);

        let result: Result<()> = RetryStrategy::new(no_jitter(5))
            .execute(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Validation("missing iban".into()))
                },
                "fetch",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
