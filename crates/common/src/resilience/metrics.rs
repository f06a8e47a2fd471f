//! Outcome metrics owned by a single circuit breaker
//!
//! [`ErrorMetrics`] is a plain value aggregate. It is mutated only while the
//! owning breaker holds its lock; readers get a [`MetricsSnapshot`] copy.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Number of most recent call durations kept for the response-time average
pub const RESPONSE_TIME_WINDOW: usize = 100;

/// Success/error counters, failure rate and rolling response time
#[derive(Debug, Clone, Default)]
pub struct ErrorMetrics {
    /// Calls that returned an error
    pub error_count: u64,
    /// Calls that returned successfully
    pub success_count: u64,
    /// Percentage of calls that failed, in `[0, 100]`
    pub failure_rate: f64,
    /// Mean of the durations currently in the window
    pub avg_response_time: Duration,
    /// When the last error was recorded
    pub last_error_time: Option<Instant>,
    /// When the owning breaker last recovered to closed
    pub recovery_time: Option<Instant>,
    response_times: VecDeque<Duration>,
}

impl ErrorMetrics {
    /// Create empty metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `error_count + success_count`
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.error_count + self.success_count
    }

    /// Percentage of successful calls; 100 when nothing was recorded yet
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 100.0;
        }
        self.success_count as f64 / total as f64 * 100.0
    }

    /// Record a successful call and its duration
    pub fn record_success(&mut self, duration: Duration) {
        self.success_count += 1;
        self.push_response_time(duration);
        self.recompute();
    }

    /// Record a failed call, its duration and when it failed
    pub fn record_error(&mut self, duration: Duration, at: Instant) {
        self.error_count += 1;
        self.last_error_time = Some(at);
        self.push_response_time(duration);
        self.recompute();
    }

    /// Count an error that has no associated call duration
    pub fn record_error_event(&mut self, at: Instant) {
        self.error_count += 1;
        self.last_error_time = Some(at);
        self.recompute();
    }

    /// Number of durations currently in the window
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.response_times.len()
    }

    /// Return to the zero state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Copy the metrics into a serializable snapshot relative to `now`
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> MetricsSnapshot {
        MetricsSnapshot {
            error_count: self.error_count,
            success_count: self.success_count,
            total_requests: self.total_requests(),
            failure_rate: self.failure_rate,
            success_rate: self.success_rate(),
            avg_response_time_ms: self.avg_response_time.as_secs_f64() * 1000.0,
            seconds_since_last_error: self
                .last_error_time
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
            seconds_since_recovery: self
                .recovery_time
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
        }
    }

    fn push_response_time(&mut self, duration: Duration) {
        if self.response_times.len() == RESPONSE_TIME_WINDOW {
            self.response_times.pop_front();
        }
        self.response_times.push_back(duration);
    }

    #[allow(clippy::cast_precision_loss)]
    fn recompute(&mut self) {
        let total = self.total_requests();
        self.failure_rate =
            if total == 0 { 0.0 } else { self.error_count as f64 / total as f64 * 100.0 };

        self.avg_response_time = if self.response_times.is_empty() {
            Duration::ZERO
        } else {
            let sum: Duration = self.response_times.iter().sum();
            sum / u32::try_from(self.response_times.len()).unwrap_or(u32::MAX)
        };
    }
}

/// Point-in-time copy of [`ErrorMetrics`] for dashboards and errors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub error_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub seconds_since_last_error: Option<f64>,
    pub seconds_since_recovery: Option<f64>,
}
