//! Resilience benchmarks
//!
//! Hot paths of the circuit breaker (closed-state success, open-state
//! rejection) and the retry backoff calculation.
//!
//! Run with: `cargo bench --bench resilience_bench -p bulwark-common
//! --features runtime`

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use bulwark_common::error::{ErrorClassification, ErrorKind};
use bulwark_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, MockClock, RetryConfig, RetryExecutor,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Builder as RuntimeBuilder;

#[derive(Debug, Clone)]
struct BenchError(&'static str);

impl Display for BenchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for BenchError {}

impl ErrorClassification for BenchError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Connection
    }
}

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

// ============================================================================
// Circuit Breaker Benchmarks
// ============================================================================

fn bench_circuit_breaker_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker_paths");
    let runtime = build_runtime();

    let closed = CircuitBreaker::new("bench-closed", CircuitBreakerConfig::default())
        .expect("default config is valid");
    group.bench_function("closed_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = closed.call(|| async { Ok::<_, BenchError>(1_u64) }).await;
            black_box(result.is_ok())
        });
    });

    let open = CircuitBreaker::with_clock(
        "bench-open",
        CircuitBreakerConfig::builder()
            .timeout(Duration::from_secs(3600))
            .build()
            .expect("valid config"),
        MockClock::new(),
    )
    .expect("valid breaker");
    open.force_open();
    group.bench_function("open_rejection", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = open.call(|| async { Ok::<_, BenchError>(1_u64) }).await;
            black_box(result.is_err())
        });
    });

    group.bench_function("state_info_snapshot", |b| {
        b.iter(|| black_box(closed.get_state_info()));
    });

    group.finish();
}

// ============================================================================
// Retry Benchmarks
// ============================================================================

fn bench_retry_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("retry_backoff");
    let config = RetryConfig::builder()
        .base_delay(Duration::from_millis(50))
        .max_delay(Duration::from_secs(30))
        .build()
        .expect("valid retry config");

    for attempt in [1_u32, 5, 20] {
        group.bench_with_input(BenchmarkId::new("jittered_delay", attempt), &attempt, |b, n| {
            b.iter(|| black_box(config.jittered_delay(*n)));
        });
    }

    let runtime = build_runtime();
    let executor = RetryExecutor::new(config.clone()).expect("valid retry config");
    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = executor.execute(|| async { Ok::<_, BenchError>(()) }).await;
            black_box(result.is_ok())
        });
    });

    group.finish();
}

criterion_group!(resilience, bench_circuit_breaker_paths, bench_retry_backoff);
criterion_main!(resilience);
