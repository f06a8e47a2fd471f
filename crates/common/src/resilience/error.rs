//! Error signals produced by the resilience primitives
//!
//! [`ResilienceError`] keeps the protected operation's own error intact in
//! [`ResilienceError::Operation`] and adds the synthetic signals a caller must
//! be able to tell apart from it:
//!
//! - [`ResilienceError::CircuitOpen`]: rejected, the operation never ran
//! - [`ResilienceError::RetryExhausted`]: gave up after retrying
//! - [`ResilienceError::BulkheadFull`]: no permit available in time
//! - [`ResilienceError::InvalidConfiguration`]: policy misconfigured
//!
//! Stacking primitives (a retry around a breaker, for example) produces a
//! nested `ResilienceError<ResilienceError<E>>`; [`ResilienceError::flatten`]
//! collapses it back to a single layer.

use thiserror::Error;

use super::circuit_breaker::CircuitState;
use super::metrics::MetricsSnapshot;
use crate::error::{ConfigError, ErrorClassification, ErrorKind};

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Errors that can occur in resilience operations
///
/// Generic over the underlying operation error type `E`, which is preserved
/// unchanged.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open; the operation was not attempted
    #[error("Circuit breaker '{name}' is {state}, call rejected")]
    CircuitOpen { name: String, state: CircuitState, metrics: MetricsSnapshot },

    /// All retry attempts failed with retryable errors
    #[error("Operation failed after {attempts} of {max_attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        max_attempts: u32,
        #[source]
        source: E,
    },

    /// Bulkhead has no free permit
    #[error("Bulkhead '{name}' is full ({capacity} concurrent operations)")]
    BulkheadFull { name: String, capacity: usize },

    /// Policy configuration is invalid or missing
    #[error(transparent)]
    InvalidConfiguration(#[from] ConfigError),

    /// The protected operation failed
    #[error(transparent)]
    Operation(E),
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the call was rejected by an open circuit
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether retries were exhausted
    #[must_use]
    pub const fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Whether a bulkhead rejected the call
    #[must_use]
    pub const fn is_bulkhead_full(&self) -> bool {
        matches!(self, Self::BulkheadFull { .. })
    }

    /// The operation's own error, if this error carries one
    ///
    /// Both [`Self::Operation`] and [`Self::RetryExhausted`] (the last
    /// failure) carry one.
    #[must_use]
    pub const fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(err) | Self::RetryExhausted { source: err, .. } => Some(err),
            _ => None,
        }
    }

    /// Consume the signal, keeping only the operation's own error
    #[must_use]
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(err) | Self::RetryExhausted { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

impl<E> ResilienceError<ResilienceError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Collapse a doubly wrapped error into one layer
    ///
    /// An inner operation error is lifted unchanged. An inner synthetic signal
    /// wins over the outer wrapper, except that exhausting retries over a
    /// plain operation error keeps the outer attempt counts.
    #[must_use]
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            Self::CircuitOpen { name, state, metrics } => {
                ResilienceError::CircuitOpen { name, state, metrics }
            }
            Self::BulkheadFull { name, capacity } => {
                ResilienceError::BulkheadFull { name, capacity }
            }
            Self::InvalidConfiguration(err) => ResilienceError::InvalidConfiguration(err),
            Self::Operation(inner) => inner,
            Self::RetryExhausted { attempts, max_attempts, source } => match source {
                ResilienceError::Operation(err) => {
                    ResilienceError::RetryExhausted { attempts, max_attempts, source: err }
                }
                other => other,
            },
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen { .. } | Self::BulkheadFull { .. } => ErrorKind::Rejected,
            Self::InvalidConfiguration(_) => ErrorKind::Value,
            Self::RetryExhausted { source, .. } => source.kind(),
            Self::Operation(err) => err.kind(),
        }
    }
}
