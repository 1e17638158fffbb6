//! Bounded exponential backoff around a single outbound call.

use std::future::Future;
use std::time::Duration;

use depot_shared::RetryConfig;
use tracing::warn;

use super::error::StorageError;

/// Retry policy applied to every network call an adapter makes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
    /// Cap on a single delay.
    pub max_interval: Duration,
    /// Retry errors classified as permanent too.
    pub retry_permanent_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            max_interval: Duration::from_millis(config.max_interval_ms),
            retry_permanent_errors: config.retry_permanent_errors,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Whether `err` should be retried under this policy.
    #[must_use]
    pub fn should_retry(&self, err: &StorageError) -> bool {
        self.retry_permanent_errors || err.is_retryable()
    }

    /// Runs `call` until it succeeds, fails permanently or the retry budget
    /// is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if retry < self.max_retries && self.should_retry(&err) => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        operation,
                        attempt = retry,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "storage call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            ..RetryPolicy::default()
        }
    }

    fn transient() -> StorageError {
        StorageError::backend("test", "connection reset", true)
    }

    #[test]
    fn test_defaults_match_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.initial_interval, Duration::from_millis(500));
        assert!(!policy.retry_permanent_errors);
    }

    #[test]
    fn test_delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let policy = fast_policy();
        let mut attempts = 0u32;

        let result = policy
            .run("test", || {
                attempts += 1;
                let attempt = attempts;
                async move {
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_always_failing_exhausts_budget() {
        let policy = fast_policy();
        let mut attempts = 0u32;

        let result: Result<(), _> = policy
            .run("test", || {
                attempts += 1;
                let attempt = attempts;
                async move {
                    Err(StorageError::backend(
                        "test",
                        format!("attempt {attempt}"),
                        true,
                    ))
                }
            })
            .await;

        assert_eq!(attempts, policy.max_attempts());
        let err = result.expect_err("should fail");
        assert_eq!(err.to_string(), "test failed: attempt 4");
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let policy = fast_policy();
        let mut attempts = 0u32;

        let result: Result<(), _> = policy
            .run("test", || {
                attempts += 1;
                async {
                    Err(StorageError::Http {
                        operation: "test",
                        status: 400,
                        body: "bad request".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_permanent_errors_restores_blanket_retry() {
        let policy = RetryPolicy {
            retry_permanent_errors: true,
            ..fast_policy()
        };
        let mut attempts = 0u32;

        let result: Result<(), _> = policy
            .run("test", || {
                attempts += 1;
                async { Err(StorageError::not_found("missing")) }
            })
            .await;

        assert!(matches!(result, Err(StorageError::NotFound { .. })));
        assert_eq!(attempts, 4);
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let policy = RetryPolicy::none();
        let mut attempts = 0u32;

        let _: Result<(), _> = policy
            .run("test", || {
                attempts += 1;
                async { Err(transient()) }
            })
            .await;

        assert_eq!(attempts, 1);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    // Delays never exceed the cap and never shrink between retries.
    proptest! {
        #[test]
        fn prop_delay_bounded_and_monotonic(
            initial_ms in 1u64..2_000,
            multiplier in 1.0f64..4.0,
            max_ms in 1u64..60_000,
            retry in 1u32..30,
        ) {
            let policy = RetryPolicy {
                initial_interval: Duration::from_millis(initial_ms),
                multiplier,
                max_interval: Duration::from_millis(max_ms),
                ..RetryPolicy::default()
            };

            let current = policy.delay_for(retry);
            let next = policy.delay_for(retry + 1);
            prop_assert!(current <= policy.max_interval);
            prop_assert!(next >= current);
        }
    }
}
