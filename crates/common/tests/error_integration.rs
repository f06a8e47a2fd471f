//! Integration tests for `bulwark_common::error`.
//!
//! These suites validate the kind hierarchy, severity and recovery lookups,
//! and classification of downstream error types, so the service layer can
//! dispatch on kinds without knowing concrete types.

use std::time::Duration;

use bulwark_common::error::{
    severity_for, strategy_for, CommonError, ConfigError, ErrorClassification, ErrorKind,
    ErrorSeverity, RecoveryStrategy,
};
use thiserror::Error;

/// Error type a downstream crate would define.
#[derive(Debug, Error)]
enum PaymentError {
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
    #[error("card declined")]
    Declined,
    #[error("out of connection slots")]
    PoolExhausted,
    #[error("shutdown in progress")]
    ShuttingDown,
}

impl ErrorClassification for PaymentError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Unreachable(_) => ErrorKind::Connection,
            Self::Declined => ErrorKind::Value,
            Self::PoolExhausted => ErrorKind::ResourceExhausted,
            Self::ShuttingDown => ErrorKind::Termination,
        }
    }
}

/// Validates that every leaf kind descends from `Any` and from its parent.
///
/// Assertions:
/// - `is_a` is reflexive and transitive along parent links.
/// - Siblings never match each other.
#[test]
fn kind_hierarchy_is_consistent() {
    let all = [
        ErrorKind::Any,
        ErrorKind::Termination,
        ErrorKind::Os,
        ErrorKind::ResourceExhausted,
        ErrorKind::Connection,
        ErrorKind::Timeout,
        ErrorKind::Permission,
        ErrorKind::Programming,
        ErrorKind::Value,
        ErrorKind::Type,
        ErrorKind::Rejected,
        ErrorKind::Other,
    ];

    for kind in all {
        assert!(kind.is_a(kind), "{kind} should match itself");
        assert!(kind.is_a(ErrorKind::Any), "{kind} should descend from any");
        if let Some(parent) = kind.parent() {
            assert!(kind.is_a(parent));
            assert!(!parent.is_a(kind));
        }
    }

    assert!(!ErrorKind::Timeout.is_a(ErrorKind::Connection));
    assert!(!ErrorKind::Value.is_a(ErrorKind::Os));
}

/// Validates severity and strategy precedence for a downstream error enum.
///
/// Assertions:
/// - Termination is critical, OS subtree high, programming medium.
/// - Connection retries, resource exhaustion suggests a circuit breaker.
#[test]
fn downstream_errors_classify_through_kind() {
    let unreachable = PaymentError::Unreachable("eu-west".to_string());
    assert_eq!(unreachable.severity(), ErrorSeverity::High);
    assert_eq!(unreachable.recovery_strategy(), RecoveryStrategy::Retry);

    assert_eq!(PaymentError::Declined.severity(), ErrorSeverity::Medium);
    assert_eq!(PaymentError::Declined.recovery_strategy(), RecoveryStrategy::Fallback);

    assert_eq!(PaymentError::PoolExhausted.severity(), ErrorSeverity::High);
    assert_eq!(PaymentError::PoolExhausted.recovery_strategy(), RecoveryStrategy::CircuitBreaker);

    assert!(PaymentError::ShuttingDown.is_critical());
    assert!(!PaymentError::Declined.is_critical());
}

#[test]
fn boxed_errors_keep_their_kind() {
    let boxed: Box<PaymentError> = Box::new(PaymentError::PoolExhausted);
    assert_eq!(boxed.kind(), ErrorKind::ResourceExhausted);
}

#[test]
fn lookup_tables_cover_every_subtree() {
    assert_eq!(severity_for(ErrorKind::Permission), ErrorSeverity::High);
    assert_eq!(severity_for(ErrorKind::Any), ErrorSeverity::Low);
    assert_eq!(strategy_for(ErrorKind::Permission), RecoveryStrategy::FailFast);
    assert_eq!(strategy_for(ErrorKind::Termination), RecoveryStrategy::Fallback);
    assert_eq!(strategy_for(ErrorKind::Rejected), RecoveryStrategy::Fallback);
}

#[test]
fn common_error_round_trips_config_errors() {
    let err: CommonError = ConfigError::missing("bulkhead 'db'", "no max_concurrent given").into();
    assert_eq!(err.error_type_name(), "config");
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(
        err.to_string(),
        "Configuration error in field 'bulkhead 'db'': no max_concurrent given"
    );

    let err = CommonError::timeout("db query", Duration::from_secs(3));
    assert_eq!(err.recovery_strategy(), RecoveryStrategy::Retry);
}

#[test]
fn severity_orders_by_urgency() {
    let mut levels = vec![
        ErrorSeverity::Critical,
        ErrorSeverity::Low,
        ErrorSeverity::High,
        ErrorSeverity::Medium,
    ];
    levels.sort();
    assert_eq!(
        levels,
        vec![
            ErrorSeverity::Low,
            ErrorSeverity::Medium,
            ErrorSeverity::High,
            ErrorSeverity::Critical,
        ]
    );
}
