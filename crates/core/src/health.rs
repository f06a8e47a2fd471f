//! Service-level observability snapshots
//!
//! Read-only values built by
//! [`ErrorHandlingService::get_global_metrics`](crate::ErrorHandlingService::get_global_metrics)
//! and [`ErrorHandlingService::health_check`](crate::ErrorHandlingService::health_check).

use std::fmt;

use bulwark_common::resilience::{BulkheadMetrics, CircuitState};
use serde::Serialize;

/// Overall health of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No circuit is open
    Healthy,
    /// At least one circuit is open
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Errors seen by `handle_error` plus registry sizes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalMetricsSnapshot {
    pub total_errors: u64,
    pub seconds_since_last_error: Option<f64>,
    pub circuit_breakers: usize,
    pub open_circuit_breakers: usize,
    pub bulkheads: usize,
}

/// Per-breaker line of a [`HealthReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerHealth {
    pub name: String,
    pub state: CircuitState,
    pub failure_rate: f64,
    pub total_requests: u64,
}

/// Health report for dashboards and health-check endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_errors: u64,
    /// All breakers, sorted by name
    pub circuit_breakers: Vec<BreakerHealth>,
    /// All bulkheads, sorted by name
    pub bulkheads: Vec<BulkheadMetrics>,
}

impl HealthReport {
    /// Build a report; the status is degraded when any breaker is open
    #[must_use]
    pub fn new(
        total_errors: u64,
        mut circuit_breakers: Vec<BreakerHealth>,
        mut bulkheads: Vec<BulkheadMetrics>,
    ) -> Self {
        circuit_breakers.sort_by(|a, b| a.name.cmp(&b.name));
        bulkheads.sort_by(|a, b| a.name.cmp(&b.name));

        let status = if circuit_breakers.iter().any(|b| b.state == CircuitState::Open) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self { status, total_errors, circuit_breakers, bulkheads }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Names of breakers in `state`
    #[must_use]
    pub fn breakers_in(&self, state: CircuitState) -> Vec<&str> {
        self.circuit_breakers
            .iter()
            .filter(|b| b.state == state)
            .map(|b| b.name.as_str())
            .collect()
    }

    /// Names of open breakers
    #[must_use]
    pub fn open_breakers(&self) -> Vec<&str> {
        self.breakers_in(CircuitState::Open)
    }

    /// Names of half-open breakers
    #[must_use]
    pub fn half_open_breakers(&self) -> Vec<&str> {
        self.breakers_in(CircuitState::HalfOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(name: &str, state: CircuitState) -> BreakerHealth {
        BreakerHealth { name: name.to_string(), state, failure_rate: 0.0, total_requests: 0 }
    }

    #[test]
    fn test_open_breaker_degrades() {
        let report = HealthReport::new(
            3,
            vec![
                breaker("search", CircuitState::Closed),
                breaker("billing", CircuitState::Open),
                breaker("avatars", CircuitState::HalfOpen),
            ],
            Vec::new(),
        );

        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.is_healthy());
        assert_eq!(report.open_breakers(), vec!["billing"]);
        assert_eq!(report.half_open_breakers(), vec!["avatars"]);
        assert_eq!(report.circuit_breakers[0].name, "avatars");
    }

    #[test]
    fn test_half_open_alone_is_healthy() {
        let report = HealthReport::new(0, vec![breaker("a", CircuitState::HalfOpen)], Vec::new());
        assert!(report.is_healthy());
    }

    #[test]
    fn test_report_serializes_status_and_states() {
        let report = HealthReport::new(1, vec![breaker("db", CircuitState::Open)], Vec::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["circuit_breakers"][0]["state"], "OPEN");
        assert_eq!(json["total_errors"], 1);
    }
}
