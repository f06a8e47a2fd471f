//! Retry with exponential backoff and jitter
//!
//! The delay before attempt `n + 1` is
//! `min(base_delay * backoff_factor^(n - 1), max_delay)`, optionally scaled
//! by a uniform random factor in `[0.5, 1.0]`. Only errors whose
//! [`ErrorKind`] matches [`RetryConfig::retry_on`] are retried; anything else
//! fails fast. Exhausting all attempts yields
//! [`ResilienceError::RetryExhausted`] carrying the last error.
//!
//! Backoff sleeps use `tokio::time::sleep`, so dropping the returned future
//! cancels the loop between attempts.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::error::{ResilienceError, ResilienceResult};
use crate::error::{ConfigError, ConfigResult, ErrorClassification, ErrorKind};
use crate::utils::serde::{duration_millis, duration_to_millis};

/// Which errors a retry loop may retry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Retry every error
    #[default]
    All,
    /// Retry errors whose kind is, or descends from, one of these kinds
    Kinds(Vec<ErrorKind>),
}

impl RetryOn {
    /// Retry only errors of the given kinds (and their subkinds)
    #[must_use]
    pub fn kinds<I: IntoIterator<Item = ErrorKind>>(kinds: I) -> Self {
        Self::Kinds(kinds.into_iter().collect())
    }

    /// Whether an error of `kind` should be retried
    #[must_use]
    pub fn matches(&self, kind: ErrorKind) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.iter().any(|ancestor| kind.is_a(*ancestor)),
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    #[serde(rename = "base_delay_ms", with = "duration_millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(rename = "max_delay_ms", with = "duration_millis")]
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
    /// Errors eligible for retry
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
            retry_on: RetryOn::All,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first out-of-range field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be greater than 0"));
        }

        if self.base_delay.is_zero() {
            return Err(ConfigError::invalid("base_delay", "must be greater than 0"));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(ConfigError::invalid(
                "backoff_factor",
                format!("must be a positive number, got {}", self.backoff_factor),
            ));
        }

        Ok(())
    }

    /// Backoff delay after failed attempt `attempt` (1-based), without jitter
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);

        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Backoff delay after failed attempt `attempt`, with jitter if enabled
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }
        delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    #[must_use]
    pub fn no_jitter(self) -> Self {
        self.jitter(false)
    }

    #[must_use]
    pub fn retry_on(mut self, retry_on: RetryOn) -> Self {
        self.config.retry_on = retry_on;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the assembled configuration is invalid.
    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an operation until it succeeds, fails with a non-retryable error or
/// runs out of attempts
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor; the configuration is validated here
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: RetryConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    ///
    /// # Errors
    /// Returns [`ResilienceError::RetryExhausted`] wrapping the last error once
    /// every attempt failed, or the first error whose kind is not retried as
    /// [`ResilienceError::Operation`].
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + std::error::Error + Send + Sync + 'static,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempt: u32 = 1;

        loop {
            debug!(attempt, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.kind();
            if !self.config.retry_on.matches(kind) {
                debug!(attempt, kind = %kind, error = %error, "Error is not retryable");
                return Err(ResilienceError::Operation(error));
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "All retry attempts exhausted");
                return Err(ResilienceError::RetryExhausted {
                    attempts: attempt,
                    max_attempts,
                    source: error,
                });
            }

            let delay = self.config.jittered_delay(attempt);
            warn!(
                attempt,
                delay_ms = duration_to_millis(delay),
                error = %error,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Validate `config` and run `operation` under it
///
/// An invalid configuration is reported as
/// [`ResilienceError::InvalidConfiguration`] before the operation runs.
///
/// # Errors
/// Returns [`ResilienceError::InvalidConfiguration`] if `config` is invalid,
/// otherwise the same errors as [`RetryExecutor::execute`].
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, operation: F) -> ResilienceResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    RetryExecutor::new(config)?.execute(operation).await
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(100))
            .no_jitter()
            .build()
            .unwrap()
    }

    /// Operation that fails `failures` times with a timeout, then returns the
    /// attempt number.
    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32, io::Error> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(io::Error::new(io::ErrorKind::TimedOut, format!("failure {call}")))
        } else {
            Ok(call)
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.backoff_factor, 2.0);
        assert!(config.jitter);
        assert_eq!(config.retry_on, RetryOn::All);
    }

    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::builder().max_attempts(0).build().is_err());
        assert!(RetryConfig::builder().base_delay(Duration::ZERO).build().is_err());
        assert!(RetryConfig::builder().backoff_factor(0.0).build().is_err());
        assert!(RetryConfig::builder().backoff_factor(f64::INFINITY).build().is_err());
        assert!(RetryConfig::builder().backoff_factor(1.0).build().is_ok());
    }

    /// Validates `delay_for_attempt` exponential growth and the max cap.
    ///
    /// Assertions:
    /// - Delays are 1s, 2s, 4s, 8s for attempts 1-4.
    /// - Delays never exceed `max_delay`, even for huge attempt numbers.
    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::builder().max_delay(Duration::from_secs(10)).build().unwrap();

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_bounds() {
        let config = RetryConfig::builder().base_delay(Duration::from_secs(4)).build().unwrap();

        for _ in 0..200 {
            let delay = config.jittered_delay(1);
            assert!(delay >= Duration::from_secs(2), "delay {delay:?} below half");
            assert!(delay <= Duration::from_secs(4), "delay {delay:?} above full");
        }

        let fixed = RetryConfig { jitter: false, ..config };
        assert_eq!(fixed.jittered_delay(1), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_on_matches_subkinds() {
        assert!(RetryOn::All.matches(ErrorKind::Value));

        let retry_on = RetryOn::kinds([ErrorKind::Os]);
        assert!(retry_on.matches(ErrorKind::Timeout));
        assert!(retry_on.matches(ErrorKind::Connection));
        assert!(!retry_on.matches(ErrorKind::Value));
    }

    #[test]
    fn test_config_serde() {
        let config: RetryConfig = serde_json::from_str(
            r#"{"max_attempts": 5, "base_delay_ms": 200, "retry_on": {"kinds": ["timeout"]}}"#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.retry_on, RetryOn::Kinds(vec![ErrorKind::Timeout]));

        let json = serde_json::to_value(RetryConfig::default()).unwrap();
        assert_eq!(json["retry_on"], "all");
    }

    /// Validates the two-failures-then-success sequence with three attempts.
    ///
    /// Assertions:
    /// - Returns the third attempt's value after exactly three calls.
    /// - Slept 100ms + 200ms of paused tokio time.
    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retries() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retry(fast_config(3), || flaky(&calls, 2)).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(350), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let calls = AtomicU32::new(0);

        let err = with_retry(fast_config(2), || flaky(&calls, 2)).await.unwrap_err();

        match err {
            ResilienceError::RetryExhausted { attempts, max_attempts, source } => {
                assert_eq!((attempts, max_attempts), (2, 2));
                assert_eq!(source.to_string(), "failure 2");
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let config =
            RetryConfig { retry_on: RetryOn::kinds([ErrorKind::Connection]), ..fast_config(5) };

        let err = with_retry(config, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ResilienceError::Operation(ref e) if e.to_string() == "denied"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_never_runs_operation() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig { max_attempts: 0, ..RetryConfig::default() };

        let err = with_retry(config, || flaky(&calls, 0)).await.unwrap_err();

        assert!(matches!(err, ResilienceError::InvalidConfiguration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_wraps_without_sleeping() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let err = with_retry(fast_config(1), || flaky(&calls, 5)).await.unwrap_err();

        assert!(err.is_retry_exhausted());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_future_cancels_retries() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::builder()
            .max_attempts(10)
            .base_delay(Duration::from_secs(10))
            .no_jitter()
            .build()
            .unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_secs(15),
            with_retry(config, || flaky(&calls, 10)),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
