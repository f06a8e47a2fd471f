//! Error-handler and fallback registries
//!
//! Handlers are stored type-erased and recovered by downcasting to the
//! concrete `(T, E)` handler type a call site asks for. Error handlers are
//! kept in registration order and matched against the error's
//! [`ErrorKind`]; a handler registered for a parent kind also matches its
//! subkinds. Handlers registered for a different `(T, E)` pair are skipped.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use bulwark_common::error::ErrorKind;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// Substitute result producer for a failed operation
pub type FallbackHandler<T, E> = Arc<dyn Fn(E) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Kind-matched handler for errors passed to `handle_error`
pub type ErrorHandler<T, E> =
    Arc<dyn Fn(E, ErrorContext) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Wrap an async closure as a [`FallbackHandler`]
#[must_use]
pub fn fallback_fn<T, E, F, Fut>(handler: F) -> FallbackHandler<T, E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |error| handler(error).boxed())
}

/// Wrap a synchronous closure as a [`FallbackHandler`]
#[must_use]
pub fn sync_fallback<T, E, F>(handler: F) -> FallbackHandler<T, E>
where
    F: Fn(E) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::new(move |error| futures::future::ready(handler(error)).boxed())
}

/// Wrap an async closure as an [`ErrorHandler`]
#[must_use]
pub fn error_handler_fn<T, E, F, Fut>(handler: F) -> ErrorHandler<T, E>
where
    F: Fn(E, ErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |error, context| handler(error, context).boxed())
}

/// Wrap a synchronous closure as an [`ErrorHandler`]
#[must_use]
pub fn sync_error_handler<T, E, F>(handler: F) -> ErrorHandler<T, E>
where
    F: Fn(E, ErrorContext) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::new(move |error, context| futures::future::ready(handler(error, context)).boxed())
}

/// Caller-supplied context handed to error handlers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    /// Name of the operation that failed, if known
    pub operation: Option<String>,
    /// Free-form attributes (request id, tenant, ...)
    pub attributes: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a named operation
    #[must_use]
    pub fn for_operation(operation: impl Into<String>) -> Self {
        Self { operation: Some(operation.into()), attributes: BTreeMap::new() }
    }

    /// Add an attribute
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

struct RegisteredHandler {
    kind: ErrorKind,
    handler: Box<dyn Any + Send + Sync>,
}

/// Type-erased registries for error handlers and fallbacks
#[derive(Default)]
pub struct HandlerRegistry {
    error_handlers: RwLock<Vec<RegisteredHandler>>,
    fallbacks: DashMap<String, Box<dyn Any + Send + Sync>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error handler for `kind`
    pub fn register_error_handler<T, E>(&self, kind: ErrorKind, handler: ErrorHandler<T, E>)
    where
        T: 'static,
        E: 'static,
    {
        self.error_handlers.write().push(RegisteredHandler { kind, handler: Box::new(handler) });
        debug!(kind = %kind, "Registered error handler");
    }

    /// First handler, in registration order, whose kind matches `kind` and
    /// whose type is `ErrorHandler<T, E>`
    #[must_use]
    pub fn resolve_error_handler<T, E>(&self, kind: ErrorKind) -> Option<ErrorHandler<T, E>>
    where
        T: 'static,
        E: 'static,
    {
        self.error_handlers
            .read()
            .iter()
            .filter(|registered| kind.is_a(registered.kind))
            .find_map(|registered| registered.handler.downcast_ref::<ErrorHandler<T, E>>())
            .cloned()
    }

    /// Register the fallback for an operation, replacing any previous one
    pub fn register_fallback<T, E>(
        &self,
        operation: impl Into<String>,
        handler: FallbackHandler<T, E>,
    ) where
        T: 'static,
        E: 'static,
    {
        let operation = operation.into();
        debug!(operation = %operation, "Registered fallback");
        self.fallbacks.insert(operation, Box::new(handler));
    }

    /// Fallback registered for `operation`, if it has type
    /// `FallbackHandler<T, E>`
    #[must_use]
    pub fn fallback<T, E>(&self, operation: &str) -> Option<FallbackHandler<T, E>>
    where
        T: 'static,
        E: 'static,
    {
        let entry = self.fallbacks.get(operation)?;
        let handler = entry.value().downcast_ref::<FallbackHandler<T, E>>().cloned();
        if handler.is_none() {
            debug!(operation, "Registered fallback has a different result type; ignoring");
        }
        handler
    }

    /// Number of registered error handlers
    #[must_use]
    pub fn error_handler_count(&self) -> usize {
        self.error_handlers.read().len()
    }

    /// Names of operations with a registered fallback, sorted
    #[must_use]
    pub fn fallback_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fallbacks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("error_handlers", &self.error_handler_count())
            .field("fallbacks", &self.fallback_names())
            .finish_non_exhaustive()
    }
}
