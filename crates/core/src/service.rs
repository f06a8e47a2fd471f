//! Resilience orchestration service
//!
//! [`ErrorHandlingService`] owns the named circuit breakers and bulkheads,
//! the fallback and error-handler registries, and a service-wide error
//! counter. Construct one at startup and share it behind an `Arc`; nothing
//! here is a process global.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bulwark_common::error::{
    ConfigError, ConfigResult, ErrorClassification, ErrorKind, ErrorSeverity, RecoveryStrategy,
};
use bulwark_common::resilience::{
    retry, Bulkhead, BulkheadConfig, BulkheadFullError, BulkheadPermit, CircuitBreaker,
    CircuitBreakerConfig, CircuitState, Clock, ErrorMetrics, ResilienceError, ResilienceResult,
    RetryConfig, SystemClock,
};
use bulwark_common::utils::duration_to_millis;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ResilienceSettings;
use crate::handlers::{ErrorContext, ErrorHandler, FallbackHandler, HandlerRegistry};
use crate::health::{BreakerHealth, GlobalMetricsSnapshot, HealthReport};

/// Why a bulkhead permit could not be obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkheadAcquireError {
    #[error(transparent)]
    Full(#[from] BulkheadFullError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl<E> From<BulkheadAcquireError> for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: BulkheadAcquireError) -> Self {
        match err {
            BulkheadAcquireError::Full(full) => full.into(),
            BulkheadAcquireError::Config(config) => ResilienceError::InvalidConfiguration(config),
        }
    }
}

/// Named registries of resilience policies plus global error handling
///
/// Generic over [`Clock`]; every breaker the service creates shares its
/// clock, so a [`MockClock`](bulwark_common::resilience::MockClock) drives
/// them all in tests.
pub struct ErrorHandlingService<C: Clock + Clone = SystemClock> {
    settings: ResilienceSettings,
    clock: C,
    circuit_breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
    handlers: HandlerRegistry,
    global_metrics: Mutex<ErrorMetrics>,
}

impl ErrorHandlingService<SystemClock> {
    /// Service with default settings on the system clock
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: ResilienceSettings::default(),
            clock: SystemClock,
            circuit_breakers: DashMap::new(),
            bulkheads: DashMap::new(),
            handlers: HandlerRegistry::new(),
            global_metrics: Mutex::new(ErrorMetrics::new()),
        }
    }

    /// Service configured from loaded settings
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any contained config is invalid.
    pub fn from_settings(settings: ResilienceSettings) -> ConfigResult<Self> {
        Self::with_clock(settings, SystemClock)
    }
}

impl Default for ErrorHandlingService<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> ErrorHandlingService<C> {
    /// Service with custom settings and clock
    ///
    /// Bulkheads listed in `settings` are registered immediately.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any contained config is invalid.
    pub fn with_clock(settings: ResilienceSettings, clock: C) -> ConfigResult<Self> {
        settings.validate()?;

        let bulkheads = DashMap::new();
        for (name, config) in &settings.bulkheads {
            bulkheads.insert(name.clone(), Arc::new(Bulkhead::new(name.clone(), config.clone())?));
        }

        info!(
            circuit_breaker_overrides = settings.circuit_breakers.len(),
            bulkheads = bulkheads.len(),
            "Error handling service initialized"
        );

        Ok(Self {
            settings,
            clock,
            circuit_breakers: DashMap::new(),
            bulkheads,
            handlers: HandlerRegistry::new(),
            global_metrics: Mutex::new(ErrorMetrics::new()),
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Circuit breakers
    // ------------------------------------------------------------------

    /// Get the breaker registered under `name`, creating it if absent
    ///
    /// `config` is only used on creation; the first registration wins. With
    /// no `config`, the per-name override from settings is used, else the
    /// default breaker config.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a new breaker's config is invalid.
    pub fn create_circuit_breaker(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> ConfigResult<Arc<CircuitBreaker<C>>> {
        if let Some(existing) = self.circuit_breakers.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        match self.circuit_breakers.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let config =
                    config.unwrap_or_else(|| self.settings.circuit_breaker_config(name).clone());
                let breaker =
                    Arc::new(CircuitBreaker::with_clock(name, config, self.clock.clone())?);
                info!(
                    breaker = name,
                    failure_threshold = breaker.config().failure_threshold,
                    timeout_ms = duration_to_millis(breaker.config().timeout),
                    "Circuit breaker created"
                );
                Ok(Arc::clone(entry.insert(breaker).value()))
            }
        }
    }

    /// Breaker registered under `name`; never creates one
    #[must_use]
    pub fn get_circuit_breaker(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.circuit_breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Run `operation` through the breaker named `name`, creating it first
    /// if needed
    ///
    /// # Errors
    /// Returns [`ResilienceError::InvalidConfiguration`] if a new breaker's
    /// config is invalid, otherwise the same errors as [`CircuitBreaker::call`].
    pub async fn with_circuit_breaker<F, Fut, T, E>(
        &self,
        name: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let breaker = self.create_circuit_breaker(name, config)?;
        breaker.call(operation).await
    }

    /// Reset the breaker named `name`; `false` if there is none
    pub fn reset_circuit_breaker(&self, name: &str) -> bool {
        let Some(breaker) = self.get_circuit_breaker(name) else {
            return false;
        };
        breaker.reset();
        true
    }

    /// Reset every registered breaker, returning how many were reset
    pub fn reset_all_circuit_breakers(&self) -> usize {
        let breakers: Vec<_> =
            self.circuit_breakers.iter().map(|e| Arc::clone(e.value())).collect();
        for breaker in &breakers {
            breaker.reset();
        }
        info!(count = breakers.len(), "All circuit breakers reset");
        breakers.len()
    }

    /// Names of registered breakers, sorted
    #[must_use]
    pub fn circuit_breaker_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.circuit_breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Retry and fallback
    // ------------------------------------------------------------------

    /// Retry `operation` under `config`, or the default retry config
    ///
    /// # Errors
    /// Same as [`retry::with_retry`].
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        operation: F,
        config: Option<RetryConfig>,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + std::error::Error + Send + Sync + 'static,
    {
        let config = config.unwrap_or_else(|| self.settings.default_retry.clone());
        retry::with_retry(config, operation).await
    }

    /// Run `operation`; on error, answer with a fallback if one exists
    ///
    /// The explicit `fallback` takes precedence over one registered under
    /// `operation_name`. Without either, the error is returned unchanged.
    ///
    /// # Errors
    /// Returns the operation's error when no fallback applies, otherwise the
    /// fallback's own result.
    #[instrument(skip(self, operation, fallback))]
    pub async fn with_fallback<F, Fut, T, E>(
        &self,
        operation_name: &str,
        operation: F,
        fallback: Option<FallbackHandler<T, E>>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: fmt::Display + 'static,
    {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match fallback.or_else(|| self.handlers.fallback::<T, E>(operation_name)) {
            Some(handler) => {
                info!(
                    operation = operation_name,
                    error = %error,
                    "Operation failed, using fallback"
                );
                handler(error).await
            }
            None => {
                debug!(operation = operation_name, "No fallback registered");
                Err(error)
            }
        }
    }

    /// Register a fallback for `operation_name`, replacing any earlier one
    pub fn register_fallback<T, E>(&self, operation_name: &str, handler: FallbackHandler<T, E>)
    where
        T: 'static,
        E: 'static,
    {
        self.handlers.register_fallback(operation_name, handler);
    }

    /// Register a synchronous fallback for `operation_name`
    pub fn register_fallback_sync<T, E, F>(&self, operation_name: &str, handler: F)
    where
        F: Fn(E) -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.handlers.register_fallback(operation_name, crate::handlers::sync_fallback(handler));
    }

    // ------------------------------------------------------------------
    // Bulkheads
    // ------------------------------------------------------------------

    /// Get the bulkhead registered under `name`, creating it with
    /// `max_concurrent` permits if absent
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `max_concurrent` is zero or above the
    /// semaphore permit limit.
    pub fn create_bulkhead(
        &self,
        name: &str,
        max_concurrent: usize,
    ) -> ConfigResult<Arc<Bulkhead>> {
        if let Some(existing) = self.bulkheads.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        match self.bulkheads.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let mut config = BulkheadConfig::new(max_concurrent);
                config.acquire_timeout = self.settings.default_bulkhead_acquire_timeout;
                let bulkhead = Arc::new(Bulkhead::new(name, config)?);
                info!(bulkhead = name, max_concurrent, "Bulkhead created");
                Ok(Arc::clone(entry.insert(bulkhead).value()))
            }
        }
    }

    /// Bulkhead registered under `name`; never creates one
    #[must_use]
    pub fn get_bulkhead(&self, name: &str) -> Option<Arc<Bulkhead>> {
        self.bulkheads.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Wait for a permit from the bulkhead named `name`
    ///
    /// A missing bulkhead is created when `max_concurrent` is given. The
    /// permit is released when dropped.
    ///
    /// # Errors
    /// [`BulkheadAcquireError::Config`] if the bulkhead does not exist and
    /// no `max_concurrent` was given; [`BulkheadAcquireError::Full`] if its
    /// acquire timeout expires.
    pub async fn acquire_bulkhead(
        &self,
        name: &str,
        max_concurrent: Option<usize>,
    ) -> Result<BulkheadPermit, BulkheadAcquireError> {
        let bulkhead = match (self.get_bulkhead(name), max_concurrent) {
            (Some(bulkhead), _) => bulkhead,
            (None, Some(max)) => self.create_bulkhead(name, max)?,
            (None, None) => {
                return Err(ConfigError::missing(
                    format!("bulkhead '{name}'"),
                    "not registered and no max_concurrent given",
                )
                .into());
            }
        };

        Ok(bulkhead.acquire().await?)
    }

    /// Run `operation` while holding a permit from the bulkhead `name`
    ///
    /// The permit is released on every exit path, including cancellation.
    ///
    /// # Errors
    /// Returns [`ResilienceError::InvalidConfiguration`] if the bulkhead is
    /// missing and no size was given, [`ResilienceError::BulkheadFull`] if the
    /// acquire timeout expires, otherwise the operation's own error.
    pub async fn with_bulkhead<F, Fut, T, E>(
        &self,
        name: &str,
        max_concurrent: Option<usize>,
        operation: F,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _permit = self.acquire_bulkhead(name, max_concurrent).await?;
        operation().await.map_err(ResilienceError::Operation)
    }

    // ------------------------------------------------------------------
    // Global error handling
    // ------------------------------------------------------------------

    /// Register an error handler for `kind` and its subkinds
    ///
    /// Handlers are consulted in registration order.
    pub fn register_error_handler<T, E>(&self, kind: ErrorKind, handler: ErrorHandler<T, E>)
    where
        T: 'static,
        E: 'static,
    {
        self.handlers.register_error_handler(kind, handler);
    }

    /// Register a synchronous error handler for `kind` and its subkinds
    pub fn register_error_handler_sync<T, E, F>(&self, kind: ErrorKind, handler: F)
    where
        F: Fn(E, ErrorContext) -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.handlers.register_error_handler(kind, crate::handlers::sync_error_handler(handler));
    }

    /// Count `error` globally and pass it to the first matching handler
    ///
    /// Returns the handler's result, or the original error when no handler
    /// matches.
    ///
    /// # Errors
    /// Returns `error` unchanged if no registered handler matches its kind and
    /// type, otherwise the handler's result.
    pub async fn handle_error<T, E>(
        &self,
        error: E,
        context: Option<ErrorContext>,
    ) -> Result<T, E>
    where
        T: 'static,
        E: ErrorClassification + fmt::Display + 'static,
    {
        self.global_metrics.lock().record_error_event(self.clock.now());

        let kind = error.kind();
        match self.handlers.resolve_error_handler::<T, E>(kind) {
            Some(handler) => {
                debug!(kind = %kind, "Dispatching error to registered handler");
                handler(error, context.unwrap_or_default()).await
            }
            None => {
                warn!(
                    kind = %kind,
                    severity = %error.severity(),
                    error = %error,
                    "Unhandled error"
                );
                Err(error)
            }
        }
    }

    /// Advisory severity of `error`
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn classify_error_severity<E: ErrorClassification + ?Sized>(
        &self,
        error: &E,
    ) -> ErrorSeverity {
        error.severity()
    }

    /// Advisory recovery strategy for `error`
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn suggest_recovery_strategy<E: ErrorClassification + ?Sized>(
        &self,
        error: &E,
    ) -> RecoveryStrategy {
        error.recovery_strategy()
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Errors counted by [`handle_error`](Self::handle_error) and registry
    /// sizes
    #[must_use]
    pub fn get_global_metrics(&self) -> GlobalMetricsSnapshot {
        let snapshot = self.global_metrics.lock().snapshot(self.clock.now());
        let open_circuit_breakers = self
            .circuit_breakers
            .iter()
            .filter(|entry| entry.value().state() == CircuitState::Open)
            .count();

        GlobalMetricsSnapshot {
            total_errors: snapshot.error_count,
            seconds_since_last_error: snapshot.seconds_since_last_error,
            circuit_breakers: self.circuit_breakers.len(),
            open_circuit_breakers,
            bulkheads: self.bulkheads.len(),
        }
    }

    /// Zero the global error counter
    pub fn reset_global_metrics(&self) {
        self.global_metrics.lock().reset();
    }

    /// Health report over every breaker and bulkhead
    #[must_use]
    pub fn health_check(&self) -> HealthReport {
        let breakers = self
            .circuit_breakers
            .iter()
            .map(|entry| {
                let info = entry.value().get_state_info();
                BreakerHealth {
                    name: info.name,
                    state: info.state,
                    failure_rate: info.metrics.failure_rate,
                    total_requests: info.metrics.total_requests,
                }
            })
            .collect();
        let bulkheads = self.bulkheads.iter().map(|entry| entry.value().metrics()).collect();
        let total_errors = self.global_metrics.lock().error_count;

        HealthReport::new(total_errors, breakers, bulkheads)
    }
}

impl<C: Clock + Clone> fmt::Debug for ErrorHandlingService<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlingService")
            .field("circuit_breakers", &self.circuit_breaker_names())
            .field("bulkheads", &self.bulkheads.len())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
