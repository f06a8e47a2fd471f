//! Common error types and classification for the bulwark workspace
//!
//! # Error Handling Architecture
//!
//! 1. **[`ErrorKind`]**: a small kind hierarchy used instead of concrete-type
//!    introspection. Handlers and retry filters match on kinds, and a rule
//!    registered for a general kind matches every subkind.
//!
//! 2. **[`ErrorClassification`] trait**: the one method an error type must
//!    provide (`kind()`) to participate in kind-based dispatch. Severity and
//!    recovery suggestions are derived from the kind.
//!
//! 3. **[`CommonError`]**: a ready-made classified error for callers that do
//!    not need a module-specific enum.
//!
//! 4. **[`ConfigError`]**: raised eagerly when a configuration value fails
//!    validation.
//!
//! ## Standard Error Patterns
//!
//! | Pattern | `CommonError` Variant | Kind |
//! |---------|---------------------|------|
//! | **Timeouts** | `Timeout` | `Timeout` |
//! | **Backend connectivity** | `Backend` | `Connection` |
//! | **Authorization** | `Unauthorized` | `Permission` |
//! | **Quotas / memory** | `ResourceExhausted` | `ResourceExhausted` |
//! | **File I/O** | `Persistence` | `Os` |
//! | **Validation** | `Validation` | `Value` |
//! | **Configuration** | `Config` | `Value` |
//! | **Internal** | `Internal` | `Programming` |
//! | **Shutdown** | `Terminated` | `Termination` |
//! | **Not Found** | `NotFound` | `Other` |
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use bulwark_common::error::{
//!     CommonError, ErrorClassification, ErrorKind, ErrorSeverity, RecoveryStrategy,
//! };
//!
//! let err = CommonError::timeout("fetch_profile", Duration::from_secs(5));
//! assert_eq!(err.kind(), ErrorKind::Timeout);
//! assert_eq!(err.severity(), ErrorSeverity::High);
//! assert_eq!(err.recovery_strategy(), RecoveryStrategy::Retry);
//! ```

mod kind;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use kind::{
    severity_for, strategy_for, ErrorClassification, ErrorKind, ErrorSeverity, RecoveryStrategy,
};

/// Standard result type using [`CommonError`]
pub type CommonResult<T> = Result<T, CommonError>;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// A named resource was used without being configured
    #[error("'{name}' is not configured: {message}")]
    Missing { name: String, message: String },
}

impl ConfigError {
    /// Create an invalid-field error
    #[must_use]
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }

    /// Create a missing-resource error
    #[must_use]
    pub fn missing<N: Into<String>, M: Into<String>>(name: N, message: M) -> Self {
        Self::Missing { name: name.into(), message: message.into() }
    }
}

impl ErrorClassification for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Value
    }
}

/// Common error variants that appear across callers of the resilience layer
#[derive(Debug, Clone, PartialEq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Timeout errors
    Timeout { operation: String, duration: Duration },

    /// Network or backend connectivity errors
    Backend { service: String, message: String },

    /// Permission or authorization errors
    Unauthorized { operation: String, required_permission: Option<String> },

    /// Memory, quota or handle exhaustion
    ResourceExhausted { resource: String, message: String },

    /// Data persistence errors (file I/O, database, etc.)
    Persistence { message: String, operation: Option<String> },

    /// Validation errors
    Validation { field: String, message: String, value: Option<String> },

    /// Resource not found errors
    NotFound { resource_type: String, identifier: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String, context: Option<String> },

    /// The process is shutting down
    Terminated { reason: String },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{field}': {message}")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{operation}' timed out after {duration:?}")
            }
            Self::Backend { service, message } => {
                write!(f, "Backend error from '{service}': {message}")
            }
            Self::Unauthorized { operation, required_permission } => {
                if let Some(perm) = required_permission {
                    write!(f, "Unauthorized to perform '{operation}' (requires: {perm})")
                } else {
                    write!(f, "Unauthorized to perform '{operation}'")
                }
            }
            Self::ResourceExhausted { resource, message } => {
                write!(f, "Resource '{resource}' exhausted: {message}")
            }
            Self::Persistence { message, operation } => {
                if let Some(op) = operation {
                    write!(f, "Persistence error during '{op}': {message}")
                } else {
                    write!(f, "Persistence error: {message}")
                }
            }
            Self::Validation { field, message, value } => {
                if let Some(value) = value {
                    write!(f, "Validation error for field '{field}' (value: '{value}'): {message}")
                } else {
                    write!(f, "Validation error for field '{field}': {message}")
                }
            }
            Self::NotFound { resource_type, identifier } => {
                if let Some(id) = identifier {
                    write!(f, "{resource_type} not found: '{id}'")
                } else {
                    write!(f, "{resource_type} not found")
                }
            }
            Self::Internal { message, context } => {
                if let Some(ctx) = context {
                    write!(f, "Internal error in '{ctx}': {message}")
                } else {
                    write!(f, "Internal error: {message}")
                }
            }
            Self::Terminated { reason } => write!(f, "Terminated: {reason}"),
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Validation { .. } => ErrorKind::Value,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Backend { .. } => ErrorKind::Connection,
            Self::Unauthorized { .. } => ErrorKind::Permission,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Persistence { .. } => ErrorKind::Os,
            Self::NotFound { .. } => ErrorKind::Other,
            Self::Internal { .. } => ErrorKind::Programming,
            Self::Terminated { .. } => ErrorKind::Termination,
        }
    }
}

impl CommonError {
    /// Create a simple configuration error
    #[must_use]
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    #[must_use]
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a backend connectivity error
    #[must_use]
    pub fn backend<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Backend { service: service.into(), message: message.into() }
    }

    /// Create an unauthorized error
    #[must_use]
    pub fn unauthorized<O: Into<String>>(operation: O) -> Self {
        Self::Unauthorized { operation: operation.into(), required_permission: None }
    }

    /// Create an unauthorized error with required permission
    #[must_use]
    pub fn unauthorized_with_perm<O: Into<String>, P: Into<String>>(
        operation: O,
        permission: P,
    ) -> Self {
        Self::Unauthorized {
            operation: operation.into(),
            required_permission: Some(permission.into()),
        }
    }

    /// Create a resource exhaustion error
    #[must_use]
    pub fn resource_exhausted<R: Into<String>, M: Into<String>>(resource: R, message: M) -> Self {
        Self::ResourceExhausted { resource: resource.into(), message: message.into() }
    }

    /// Create a simple persistence error
    #[must_use]
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence { message: message.into(), operation: None }
    }

    /// Create a persistence error for a specific operation
    #[must_use]
    pub fn persistence_op<S: Into<String>, O: Into<String>>(operation: O, message: S) -> Self {
        Self::Persistence { message: message.into(), operation: Some(operation.into()) }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: None }
    }

    /// Create a validation error with the invalid value
    #[must_use]
    pub fn validation_with_value<F: Into<String>, M: Into<String>, V: Into<String>>(
        field: F,
        message: M,
        value: V,
    ) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: Some(value.into()) }
    }

    /// Create a not found error
    #[must_use]
    pub fn not_found<T: Into<String>>(resource_type: T) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: None }
    }

    /// Create a not found error with identifier
    #[must_use]
    pub fn not_found_with_id<T: Into<String>, I: Into<String>>(
        resource_type: T,
        identifier: I,
    ) -> Self {
        Self::NotFound { resource_type: resource_type.into(), identifier: Some(identifier.into()) }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), context: None }
    }

    /// Create an internal error with context
    #[must_use]
    pub fn internal_with_context<S: Into<String>, C: Into<String>>(message: S, context: C) -> Self {
        Self::Internal { message: message.into(), context: Some(context.into()) }
    }

    /// Create a termination error
    #[must_use]
    pub fn terminated<S: Into<String>>(reason: S) -> Self {
        Self::Terminated { reason: reason.into() }
    }

    /// Get the error type name for categorization
    #[must_use]
    pub const fn error_type_name(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Persistence { .. } => "persistence",
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Internal { .. } => "internal",
            Self::Terminated { .. } => "terminated",
        }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        match ErrorClassification::kind(&err) {
            ErrorKind::Timeout => Self::timeout("io", Duration::ZERO),
            ErrorKind::Connection => Self::backend("io", err.to_string()),
            ErrorKind::Permission => Self::unauthorized(err.to_string()),
            ErrorKind::ResourceExhausted => Self::resource_exhausted("io", err.to_string()),
            _ => Self::persistence(err.to_string()),
        }
    }
}

impl From<ConfigError> for CommonError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid { field, message } => Self::config_field(field, message),
            ConfigError::Missing { name, message } => Self::config_field(name, message),
        }
    }
}
