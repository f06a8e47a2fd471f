//! Error kind hierarchy and advisory classification
//!
//! Errors are matched by *kind*, not by concrete type. Every kind has at most
//! one parent, and a handler or retry rule registered for a general kind
//! matches all of its subkinds:
//!
//! ```text
//! Any
//! ├── Termination
//! ├── Os
//! │   ├── ResourceExhausted
//! │   ├── Connection
//! │   ├── Timeout
//! │   └── Permission
//! ├── Programming
//! │   ├── Value
//! │   └── Type
//! ├── Rejected
//! └── Other
//! ```
//!
//! [`ErrorSeverity`] and [`RecoveryStrategy`] are pure lookups over this tree.
//! They never drive behavior on their own; callers decide whether to act on
//! the suggestion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of an error, used for handler dispatch, retry filtering and
/// classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Root of the hierarchy; matches every kind
    Any,
    /// Process termination requested (shutdown signal, interrupt)
    Termination,
    /// Operating-system level failure
    Os,
    /// Memory, file handle or quota exhaustion
    ResourceExhausted,
    /// Connection refused, reset or unreachable peer
    Connection,
    /// Deadline exceeded
    Timeout,
    /// Permission denied or unauthorized
    Permission,
    /// Bug in calling code
    Programming,
    /// Invalid value or argument
    Value,
    /// Value of the wrong shape or type
    Type,
    /// Call rejected before it was attempted (open circuit, full bulkhead)
    Rejected,
    /// Anything not covered above
    Other,
}

impl ErrorKind {
    /// Direct parent of this kind, `None` for [`ErrorKind::Any`]
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Any => None,
            Self::ResourceExhausted | Self::Connection | Self::Timeout | Self::Permission => {
                Some(Self::Os)
            }
            Self::Value | Self::Type => Some(Self::Programming),
            Self::Termination | Self::Os | Self::Programming | Self::Rejected | Self::Other => {
                Some(Self::Any)
            }
        }
    }

    /// Whether this kind equals `ancestor` or descends from it
    #[must_use]
    pub fn is_a(self, ancestor: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == ancestor {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Stable `snake_case` name, matching the serde representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Termination => "termination",
            Self::Os => "os",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::Programming => "programming",
            Self::Value => "value",
            Self::Type => "type",
            Self::Rejected => "rejected",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Expected or recoverable conditions
    Low,
    /// Programming or value errors
    Medium,
    /// Resource exhaustion and OS-level failures
    High,
    /// Process termination class
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Suggested way to recover from an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    /// Transient failure, try again after a delay
    Retry,
    /// Retrying cannot help, surface the error immediately
    FailFast,
    /// Stop calling the dependency for a while
    CircuitBreaker,
    /// Substitute a degraded result
    Fallback,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "RETRY"),
            Self::FailFast => write!(f, "FAIL_FAST"),
            Self::CircuitBreaker => write!(f, "CIRCUIT_BREAKER"),
            Self::Fallback => write!(f, "FALLBACK"),
        }
    }
}

/// Map an error kind to its severity
///
/// Termination is critical, the OS subtree is high, the programming subtree
/// is medium and everything else is low.
#[must_use]
pub fn severity_for(kind: ErrorKind) -> ErrorSeverity {
    if kind.is_a(ErrorKind::Termination) {
        ErrorSeverity::Critical
    } else if kind.is_a(ErrorKind::Os) {
        ErrorSeverity::High
    } else if kind.is_a(ErrorKind::Programming) {
        ErrorSeverity::Medium
    } else {
        ErrorSeverity::Low
    }
}

/// Map an error kind to a suggested recovery strategy
#[must_use]
pub fn strategy_for(kind: ErrorKind) -> RecoveryStrategy {
    if kind.is_a(ErrorKind::Connection) || kind.is_a(ErrorKind::Timeout) {
        RecoveryStrategy::Retry
    } else if kind.is_a(ErrorKind::Permission) {
        RecoveryStrategy::FailFast
    } else if kind.is_a(ErrorKind::ResourceExhausted) {
        RecoveryStrategy::CircuitBreaker
    } else {
        RecoveryStrategy::Fallback
    }
}

/// Error classification trait for kind-based dispatch
///
/// Implementors only need to report their [`ErrorKind`]; severity and
/// recovery suggestions are derived from it unless overridden.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark_common::error::{ErrorClassification, ErrorKind};
///
/// impl ErrorClassification for MyError {
///     fn kind(&self) -> ErrorKind {
///         match self {
///             Self::Unreachable(_) => ErrorKind::Connection,
///             Self::BadInput(_) => ErrorKind::Value,
///         }
///     }
/// }
/// ```
pub trait ErrorClassification {
    /// Kind of this error
    fn kind(&self) -> ErrorKind;

    /// Severity level, derived from the kind by default
    fn severity(&self) -> ErrorSeverity {
        severity_for(self.kind())
    }

    /// Suggested recovery strategy, derived from the kind by default
    fn recovery_strategy(&self) -> RecoveryStrategy {
        strategy_for(self.kind())
    }

    /// Whether this error requires immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

impl ErrorClassification for std::io::Error {
    fn kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;

        match self.kind() {
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe => ErrorKind::Connection,
            Io::PermissionDenied => ErrorKind::Permission,
            Io::OutOfMemory => ErrorKind::ResourceExhausted,
            Io::InvalidInput | Io::InvalidData => ErrorKind::Value,
            Io::Unsupported => ErrorKind::Programming,
            _ => ErrorKind::Os,
        }
    }
}

impl<T: ErrorClassification + ?Sized> ErrorClassification for Box<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}
