//! Shared error taxonomy and resilience primitives for bulwark crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error kinds and classification, config errors, serde
//!   helpers
//! - `runtime`: clock abstraction, outcome metrics, circuit breaker, retry
//!   and bulkhead (pulls in tokio, tracing, `parking_lot` and rand)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{
    CommonError, CommonResult, ConfigError, ConfigResult, ErrorClassification, ErrorKind,
    ErrorSeverity, RecoveryStrategy,
};
#[cfg(feature = "runtime")]
pub use resilience::{
    with_retry, Bulkhead, BulkheadConfig, BulkheadPermit, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerStateInfo, CircuitState, Clock, ErrorMetrics, MetricsSnapshot, MockClock,
    ResilienceError, ResilienceResult, RetryConfig, RetryExecutor, RetryOn, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
