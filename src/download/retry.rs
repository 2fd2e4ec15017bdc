//! Retry logic for tool invocations

use crate::error::MultidlError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Total number of attempts
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Retry executor
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `func` until it succeeds, fails with a non-retryable error, or
    /// attempts run out. `label` names the operation in log output.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut func: F) -> Result<T, MultidlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MultidlError>>,
    {
        let mut delay = self.config.initial_delay;
        let attempts = self.config.attempts();

        for attempt in 1..=attempts {
            let error = match func().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt == attempts {
                return Err(error);
            }

            warn!("Attempt {} failed for {}: {}", attempt, label, error);

            let jitter = if self.config.jitter_factor > 0.0 {
                let jitter_range = delay.as_millis() as f64 * self.config.jitter_factor;
                let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
                Duration::from_millis(jitter.abs() as u64)
            } else {
                Duration::ZERO
            };
            tokio::time::sleep(delay + jitter).await;

            delay = Duration::from_millis(
                (delay.as_millis() as f64 * self.config.backoff_multiplier) as u64,
            )
            .min(self.config.max_delay);
        }

        Err(MultidlError::Generic(format!(
            "All retry attempts failed for {}",
            label
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn fast(max_retries: u32) -> RetryExecutor {
        RetryExecutor::with_config(RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.attempts(), 2);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_max_retries_at_u32_max_still_runs() {
        let config = RetryConfig {
            max_retries: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.attempts(), u32::MAX);

        let result = RetryExecutor::with_config(config)
            .execute("test", || async { Ok::<_, MultidlError>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retry_executor_success_after_failure() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = fast(1)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(MultidlError::Timeout("slow".to_string()))
                    } else {
                        Ok("Success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_executor_max_retries() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), MultidlError> = fast(2)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MultidlError::Timeout("slow".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(MultidlError::Timeout(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test]
    async fn test_retry_executor_non_retryable_error() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), MultidlError> = fast(3)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MultidlError::AuthRequired("login".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(MultidlError::AuthRequired(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), MultidlError> = fast(0)
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(MultidlError::Timeout("slow".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
