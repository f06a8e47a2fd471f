//! Resilience primitives: circuit breaker, retry and bulkhead
//!
//! Everything here is generic over the protected operation's error type and
//! holds no registry state. Named registries, fallbacks and kind-based error
//! handlers live in `bulwark-core`, which composes these primitives.
//!
//! | Primitive | Rejects with | Wraps operation errors as |
//! |-----------|--------------|---------------------------|
//! | [`CircuitBreaker`] | `CircuitOpen` | `Operation` |
//! | [`RetryExecutor`] | `InvalidConfiguration` | `RetryExhausted` / `Operation` |
//! | [`Bulkhead`] | `BulkheadFull` | `Operation` |
//!
//! Time is read through the [`Clock`] trait so tests can move a breaker's
//! open-state timeout forward with [`MockClock`].

pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod metrics;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadFullError, BulkheadMetrics, BulkheadPermit};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStateInfo,
    CircuitState,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ResilienceError, ResilienceResult};
pub use metrics::{ErrorMetrics, MetricsSnapshot, RESPONSE_TIME_WINDOW};
pub use retry::{with_retry, RetryConfig, RetryConfigBuilder, RetryExecutor, RetryOn};
