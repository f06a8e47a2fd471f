//! Circuit breaker with consecutive and rate-based tripping
//!
//! A breaker starts CLOSED. It opens when either `failure_threshold`
//! consecutive calls fail or, once `min_requests` outcomes were recorded, the
//! cumulative failure rate reaches `failure_rate_threshold`. While OPEN,
//! calls are rejected with [`ResilienceError::CircuitOpen`] and the protected
//! operation is never invoked. After `timeout` the next call moves it to
//! `HALF_OPEN`; `success_threshold` consecutive successes close it again. A
//! failing trial call resets the success streak and resumes counting
//! `consecutive_failures`, but only a CLOSED circuit trips to OPEN.
//!
//! All bookkeeping happens under one lock. The operation itself runs outside
//! the lock, so concurrent callers are never serialized by a slow call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::error::{ResilienceError, ResilienceResult};
use super::metrics::{ErrorMetrics, MetricsSnapshot};
use crate::error::{ConfigError, ConfigResult};
use crate::utils::serde::duration_millis;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, testing whether the dependency recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit from closed
    pub failure_threshold: u32,
    /// Consecutive successes in half-open needed to close the circuit
    pub success_threshold: u32,
    /// Minimum time the circuit stays open before trial calls are admitted
    #[serde(rename = "timeout_ms", with = "duration_millis")]
    pub timeout: Duration,
    /// Cumulative failure percentage that opens the circuit
    pub failure_rate_threshold: f64,
    /// Outcomes required before the failure rate is considered
    pub min_requests: u64,
    /// Retention cap for tracked failures; informational only
    pub max_failures: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(60),
            failure_rate_threshold: 50.0,
            min_requests: 10,
            max_failures: 100,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first out-of-range field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be greater than 0"));
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::invalid("success_threshold", "must be greater than 0"));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "must be greater than 0"));
        }

        let rate = self.failure_rate_threshold;
        if !rate.is_finite() || rate <= 0.0 || rate > 100.0 {
            return Err(ConfigError::invalid(
                "failure_rate_threshold",
                format!("must be within (0, 100], got {rate}"),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    #[must_use]
    pub const fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent;
        self
    }

    #[must_use]
    pub const fn min_requests(mut self, min_requests: u64) -> Self {
        self.config.min_requests = min_requests;
        self
    }

    #[must_use]
    pub const fn max_failures(mut self, max_failures: u32) -> Self {
        self.config.max_failures = max_failures;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the assembled configuration is invalid.
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Read-only view of a breaker for dashboards and tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStateInfo {
    pub name: String,
    pub state: CircuitState,
    pub metrics: MetricsSnapshot,
    pub config: CircuitBreakerConfig,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub seconds_since_last_failure: Option<f64>,
    pub seconds_in_state: f64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    metrics: ErrorMetrics,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    state_changed_at: Instant,
}

impl BreakerInner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            metrics: ErrorMetrics::new(),
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            state_changed_at: now,
        }
    }
}

/// Named circuit breaker
///
/// Generic over [`Clock`] so tests can drive the open-state timeout with a
/// [`MockClock`](super::clock::MockClock).
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .field("consecutive_successes", &inner.consecutive_successes)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker on the system clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker with a custom clock
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.now();

        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new(now)),
            clock: Arc::new(clock),
        })
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// # Errors
    /// Returns [`ResilienceError::CircuitOpen`] without invoking `operation`
    /// while the circuit is open, otherwise the operation's own error as
    /// [`ResilienceError::Operation`].
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.admit()?;

        let started = self.clock.now();
        let outcome = operation().await;
        let elapsed = self.clock.now().saturating_duration_since(started);

        match outcome {
            Ok(value) => {
                self.record_success(elapsed);
                Ok(value)
            }
            Err(error) => {
                self.record_failure(elapsed);
                debug!(breaker = %self.name, error = %error, "Protected operation failed");
                Err(ResilienceError::Operation(error))
            }
        }
    }

    fn admit<E>(&self) -> ResilienceResult<(), E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open && self.open_timeout_elapsed(&inner, now) {
            self.transition(&mut inner, CircuitState::HalfOpen, now);
        }

        if inner.state == CircuitState::Closed && self.should_trip(&inner) {
            self.transition(&mut inner, CircuitState::Open, now);
        }

        if inner.state == CircuitState::Open {
            debug!(breaker = %self.name, "Circuit breaker rejecting call");
            return Err(ResilienceError::CircuitOpen {
                name: self.name.clone(),
                state: inner.state,
                metrics: inner.metrics.snapshot(now),
            });
        }

        Ok(())
    }

    fn record_success(&self, elapsed: Duration) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.metrics.record_success(elapsed);
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= self.config.success_threshold
        {
            self.transition(&mut inner, CircuitState::Closed, now);
        }
    }

    fn record_failure(&self, elapsed: Duration) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        inner.metrics.record_error(elapsed, now);
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;

        if inner.state == CircuitState::Closed && self.should_trip(&inner) {
            self.transition(&mut inner, CircuitState::Open, now);
        }
    }

    fn should_trip(&self, inner: &BreakerInner) -> bool {
        if inner.consecutive_failures >= self.config.failure_threshold {
            return true;
        }

        inner.metrics.total_requests() >= self.config.min_requests
            && inner.metrics.failure_rate >= self.config.failure_rate_threshold
    }

    fn open_timeout_elapsed(&self, inner: &BreakerInner, now: Instant) -> bool {
        inner
            .last_failure_time
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.timeout)
    }

    fn transition(&self, inner: &mut BreakerInner, next: CircuitState, now: Instant) {
        let previous = inner.state;
        inner.state = next;
        inner.state_changed_at = now;

        match next {
            CircuitState::Open => {
                inner.last_failure_time = Some(now);
                warn!(
                    breaker = %self.name,
                    from = %previous,
                    consecutive_failures = inner.consecutive_failures,
                    failure_rate = inner.metrics.failure_rate,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = 0;
                info!(breaker = %self.name, "Circuit breaker half-open, admitting trial calls");
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.metrics.recovery_time = Some(now);
                info!(
                    breaker = %self.name,
                    successes = inner.consecutive_successes,
                    "Circuit breaker closed after recovery"
                );
            }
        }
    }

    /// Whether a call made now would be attempted
    ///
    /// Read-only: an open circuit whose timeout has elapsed reports `true`
    /// but stays OPEN until a call moves it to `HALF_OPEN`.
    #[must_use]
    pub fn is_call_permitted(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner.state != CircuitState::Open || self.open_timeout_elapsed(&inner, now)
    }

    /// Open the circuit regardless of recorded outcomes
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open, now);
    }

    /// Reset the circuit breaker to closed state with zeroed metrics
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        *inner = BreakerInner::new(now);
        info!(breaker = %self.name, "Circuit breaker manually reset to closed state");
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of the breaker's metrics
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        self.inner.lock().metrics.snapshot(now)
    }

    /// Full read-only view: state, metrics, config and internal counters
    #[must_use]
    pub fn get_state_info(&self) -> CircuitBreakerStateInfo {
        let now = self.clock.now();
        let inner = self.inner.lock();

        CircuitBreakerStateInfo {
            name: self.name.clone(),
            state: inner.state,
            metrics: inner.metrics.snapshot(now),
            config: self.config.clone(),
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            seconds_since_last_failure: inner
                .last_failure_time
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
            seconds_in_state: now.saturating_duration_since(inner.state_changed_at).as_secs_f64(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
