//! Bulkhead pattern for limiting concurrent operations
//!
//! A [`Bulkhead`] is a named counting semaphore. Admission is wait-based:
//! [`Bulkhead::acquire`] suspends until a permit frees up. Two opt-in paths
//! reject instead of waiting, both reported as [`BulkheadFullError`]:
//! [`Bulkhead::try_acquire`] and an `acquire_timeout` in the config.
//!
//! A permit is an RAII [`BulkheadPermit`]; it is released when dropped, which
//! covers normal return, error and cancellation alike.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

use super::error::{ResilienceError, ResilienceResult};
use crate::error::{ConfigError, ConfigResult};
use crate::utils::serde::{duration_to_millis, option_duration_millis};

/// Configuration for bulkhead behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Maximum number of concurrent operations allowed
    pub max_concurrent: usize,
    /// Give up waiting for a permit after this long; wait forever if unset
    #[serde(default, rename = "acquire_timeout_ms", with = "option_duration_millis")]
    pub acquire_timeout: Option<Duration>,
}

impl BulkheadConfig {
    /// Wait-based configuration with the given capacity
    #[must_use]
    pub const fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent, acquire_timeout: None }
    }

    /// Set the acquire timeout
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if `max_concurrent` is zero or above
    /// [`Semaphore::MAX_PERMITS`], or if `acquire_timeout` is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::invalid("max_concurrent", "must be greater than 0"));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "max_concurrent",
                format!("must be at most {}", Semaphore::MAX_PERMITS),
            ));
        }
        if self.acquire_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::invalid("acquire_timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

/// No permit could be obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bulkhead '{name}' is full ({capacity} concurrent operations)")]
pub struct BulkheadFullError {
    pub name: String,
    pub capacity: usize,
}

impl<E> From<BulkheadFullError> for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: BulkheadFullError) -> Self {
        ResilienceError::BulkheadFull { name: err.name, capacity: err.capacity }
    }
}

/// Scoped bulkhead permit, released on drop
pub struct BulkheadPermit {
    bulkhead: Arc<str>,
    _permit: OwnedSemaphorePermit,
}

impl BulkheadPermit {
    /// Name of the bulkhead this permit belongs to
    #[must_use]
    pub fn bulkhead(&self) -> &str {
        &self.bulkhead
    }
}

impl fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadPermit")
            .field("bulkhead", &self.bulkhead)
            .finish_non_exhaustive()
    }
}

/// Metrics for bulkhead monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkheadMetrics {
    pub name: String,
    /// Maximum concurrent operations allowed
    pub max_concurrent: usize,
    /// Permits currently held
    pub in_flight: usize,
    /// Permits handed out since creation
    pub total_operations: u64,
    /// `try_acquire` calls that found no free permit
    pub rejected_operations: u64,
    /// Waits that hit the acquire timeout
    pub timeout_count: u64,
}

impl BulkheadMetrics {
    /// Current utilization in `[0.0, 1.0]`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        self.in_flight as f64 / self.max_concurrent as f64
    }

    /// Whether every permit is taken
    #[must_use]
    pub const fn is_at_capacity(&self) -> bool {
        self.in_flight >= self.max_concurrent
    }
}

/// Named bulkhead limiting concurrent operations
pub struct Bulkhead {
    name: Arc<str>,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    total_operations: AtomicU64,
    rejected_operations: AtomicU64,
    timeout_count: AtomicU64,
}

impl Bulkhead {
    /// Create a bulkhead; fails if the configuration is invalid
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> ConfigResult<Self> {
        config.validate()?;
        let name: String = name.into();

        Ok(Self {
            name: Arc::from(name),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            total_operations: AtomicU64::new(0),
            rejected_operations: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
        })
    }

    /// Create a wait-based bulkhead with the given capacity
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `max_concurrent` is out of range.
    pub fn with_capacity(name: impl Into<String>, max_concurrent: usize) -> ConfigResult<Self> {
        Self::new(name, BulkheadConfig::new(max_concurrent))
    }

    /// Wait for a permit, up to the configured acquire timeout
    ///
    /// # Errors
    /// Returns [`BulkheadFullError`] if the acquire timeout expires.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadFullError> {
        let pending = Arc::clone(&self.semaphore).acquire_owned();

        let permit = match self.config.acquire_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending).await {
                Ok(permit) => permit.map_err(|_| self.full_error())?,
                Err(_) => {
                    self.timeout_count.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        bulkhead = %self.name,
                        timeout_ms = duration_to_millis(timeout),
                        "Timed out waiting for bulkhead permit"
                    );
                    return Err(self.full_error());
                }
            },
            None => pending.await.map_err(|_| self.full_error())?,
        };

        Ok(self.admit(permit))
    }

    /// Take a permit only if one is free right now
    ///
    /// # Errors
    /// Returns [`BulkheadFullError`] if every permit is taken.
    pub fn try_acquire(&self) -> Result<BulkheadPermit, BulkheadFullError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(self.admit(permit)),
            Err(_) => {
                self.rejected_operations.fetch_add(1, Ordering::Relaxed);
                debug!(bulkhead = %self.name, "Bulkhead full, rejecting");
                Err(self.full_error())
            }
        }
    }

    /// Execute an operation while holding a permit
    ///
    /// # Errors
    /// Returns [`ResilienceError::BulkheadFull`] if no permit was obtained,
    /// otherwise the operation's own error as [`ResilienceError::Operation`].
    #[instrument(skip(self, operation), fields(bulkhead = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _permit = self.acquire().await?;
        operation().await.map_err(ResilienceError::Operation)
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> BulkheadPermit {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        BulkheadPermit { bulkhead: Arc::clone(&self.name), _permit: permit }
    }

    fn full_error(&self) -> BulkheadFullError {
        BulkheadFullError { name: self.name.to_string(), capacity: self.config.max_concurrent }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Permits currently free
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent.saturating_sub(self.available_permits())
    }

    /// Get bulkhead metrics
    #[must_use]
    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            name: self.name.to_string(),
            max_concurrent: self.config.max_concurrent,
            in_flight: self.in_flight(),
            total_operations: self.total_operations.load(Ordering::Acquire),
            rejected_operations: self.rejected_operations.load(Ordering::Acquire),
            timeout_count: self.timeout_count.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("max_concurrent", &self.config.max_concurrent)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
