//! Wrapping combinators over [`ErrorHandlingService`]
//!
//! Each combinator takes the service explicitly plus a named policy and an
//! operation, and returns a new operation with the same zero-argument
//! calling convention. Wrapped operations can be wrapped again; use
//! [`lift`] to collapse the resulting `ResilienceError<ResilienceError<E>>`
//! back to a single layer.
//!
//! ```ignore
//! let guarded = lift(retry(
//!     Arc::clone(&service),
//!     None,
//!     circuit_breaker(Arc::clone(&service), "inventory", None, fetch_stock),
//! ));
//! let stock = guarded().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use bulwark_common::error::ErrorClassification;
use bulwark_common::resilience::{
    CircuitBreakerConfig, Clock, ResilienceError, ResilienceResult, RetryConfig,
};
use futures::future::{BoxFuture, FutureExt};

use crate::handlers::FallbackHandler;
use crate::service::ErrorHandlingService;

/// Guard `operation` with the service's breaker named `name`
pub fn circuit_breaker<C, F, Fut, T, E>(
    service: Arc<ErrorHandlingService<C>>,
    name: impl Into<String>,
    config: Option<CircuitBreakerConfig>,
    operation: F,
) -> impl Fn() -> BoxFuture<'static, ResilienceResult<T, E>> + Send + Sync + 'static
where
    C: Clock + Clone,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let name: Arc<str> = Arc::from(name.into());
    let operation = Arc::new(operation);

    move || {
        let service = Arc::clone(&service);
        let name = Arc::clone(&name);
        let operation = Arc::clone(&operation);
        let config = config.clone();
        async move { service.with_circuit_breaker(&name, || operation(), config).await }.boxed()
    }
}

/// Retry `operation` under `config`, or the service's default retry config
pub fn retry<C, F, Fut, T, E>(
    service: Arc<ErrorHandlingService<C>>,
    config: Option<RetryConfig>,
    operation: F,
) -> impl Fn() -> BoxFuture<'static, ResilienceResult<T, E>> + Send + Sync + 'static
where
    C: Clock + Clone,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    let operation = Arc::new(operation);

    move || {
        let service = Arc::clone(&service);
        let operation = Arc::clone(&operation);
        let config = config.clone();
        async move { service.with_retry(|| operation(), config).await }.boxed()
    }
}

/// Answer failures of `operation` with a fallback
///
/// `fallback` takes precedence over one registered under `operation_name`.
pub fn fallback<C, F, Fut, T, E>(
    service: Arc<ErrorHandlingService<C>>,
    operation_name: impl Into<String>,
    fallback: Option<FallbackHandler<T, E>>,
    operation: F,
) -> impl Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static
where
    C: Clock + Clone,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let operation_name: Arc<str> = Arc::from(operation_name.into());
    let operation = Arc::new(operation);

    move || {
        let service = Arc::clone(&service);
        let operation_name = Arc::clone(&operation_name);
        let operation = Arc::clone(&operation);
        let fallback = fallback.clone();
        async move { service.with_fallback(&operation_name, || operation(), fallback).await }
            .boxed()
    }
}

/// Limit concurrent runs of `operation` with the bulkhead named `name`
///
/// The bulkhead is created with `max_concurrent` permits on first use; if
/// it does not exist and `max_concurrent` is `None`, calls fail with
/// [`ResilienceError::InvalidConfiguration`].
pub fn bulkhead<C, F, Fut, T, E>(
    service: Arc<ErrorHandlingService<C>>,
    name: impl Into<String>,
    max_concurrent: Option<usize>,
    operation: F,
) -> impl Fn() -> BoxFuture<'static, ResilienceResult<T, E>> + Send + Sync + 'static
where
    C: Clock + Clone,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let name: Arc<str> = Arc::from(name.into());
    let operation = Arc::new(operation);

    move || {
        let service = Arc::clone(&service);
        let name = Arc::clone(&name);
        let operation = Arc::clone(&operation);
        async move { service.with_bulkhead(&name, max_concurrent, || operation()).await }.boxed()
    }
}

/// Collapse a doubly wrapped operation to a single [`ResilienceError`] layer
pub fn lift<F, Fut, T, E>(
    operation: F,
) -> impl Fn() -> BoxFuture<'static, ResilienceResult<T, E>> + Send + Sync + 'static
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ResilienceResult<T, ResilienceError<E>>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    move || operation().map(|result| result.map_err(ResilienceError::flatten)).boxed()
}
