//! Integration tests for resilience module
//!
//! Exercises the primitives together the way the service layer stacks them:
//! retry around a circuit breaker, breakers on a shared mock clock, and
//! bulkheads under contention.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::error::{ErrorClassification, ErrorKind};
use bulwark_common::resilience::{
    with_retry, Bulkhead, CircuitBreaker, CircuitBreakerConfig, CircuitState, MockClock,
    ResilienceError, RetryConfig, RetryOn,
};

/// Custom error type for testing
#[derive(Debug, Clone)]
struct TestError {
    message: String,
    kind: ErrorKind,
}

impl TestError {
    fn transient(message: &str) -> Self {
        Self { message: message.to_string(), kind: ErrorKind::Connection }
    }

    fn invalid(message: &str) -> Self {
        Self { message: message.to_string(), kind: ErrorKind::Value }
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

impl ErrorClassification for TestError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(10))
        .no_jitter()
        .build()
        .expect("valid retry config")
}

/// Validates retry around a breaker once the breaker opens mid-sequence.
///
/// The breaker opens after two failures, so the third attempt is rejected
/// without running the operation. Flattening surfaces the rejection rather
/// than a generic exhaustion.
///
/// # Test Steps
/// 1. Breaker with `failure_threshold = 2`, retry with 3 attempts
/// 2. Operation always fails with a transient error
/// 3. Verify the operation ran exactly twice
/// 4. Verify the flattened error is `CircuitOpen`
#[tokio::test(start_paused = true)]
async fn test_retry_over_open_breaker_surfaces_rejection() {
    let breaker = CircuitBreaker::new(
        "inventory",
        CircuitBreakerConfig::builder().failure_threshold(2).build().expect("valid config"),
    )
    .expect("valid breaker");
    let calls = AtomicU32::new(0);

    let result = with_retry(quick_retry(3), || {
        breaker.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::transient("connection reset"))
        })
    })
    .await
    .map_err(ResilienceError::flatten);

    assert!(result.expect_err("should fail").is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(breaker.state(), CircuitState::Open);
}

/// Validates that exhausting retries over a closed breaker keeps attempt
/// counts and the operation's own error.
#[tokio::test(start_paused = true)]
async fn test_retry_over_closed_breaker_keeps_attempts() {
    let breaker = CircuitBreaker::new("search", CircuitBreakerConfig::default()).expect("breaker");

    let result = with_retry(quick_retry(3), || {
        breaker.call(|| async { Err::<(), _>(TestError::transient("timeout")) })
    })
    .await
    .map_err(ResilienceError::flatten);

    match result {
        Err(ResilienceError::RetryExhausted { attempts, max_attempts, source }) => {
            assert_eq!((attempts, max_attempts), (3, 3));
            assert_eq!(source.message, "timeout");
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert_eq!(breaker.metrics().error_count, 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_retry_filter_sees_through_breaker_wrapper() {
    let breaker = CircuitBreaker::new("profile", CircuitBreakerConfig::default()).expect("breaker");
    let config = RetryConfig { retry_on: RetryOn::kinds([ErrorKind::Os]), ..quick_retry(5) };
    let calls = AtomicU32::new(0);

    let result = with_retry(config, || {
        breaker.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TestError::invalid("bad id"))
        })
    })
    .await
    .map_err(ResilienceError::flatten);

    assert!(matches!(result, Err(ResilienceError::Operation(ref e)) if e.message == "bad id"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Validates that breakers sharing a mock clock recover independently.
///
/// Assertions:
/// - Only the breaker whose timeout elapsed admits a trial call.
#[tokio::test]
async fn test_breakers_share_clock_but_not_state() {
    let clock = MockClock::new();
    let short = CircuitBreaker::with_clock(
        "short",
        CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .success_threshold(1)
            .timeout(Duration::from_secs(5))
            .build()
            .expect("config"),
        clock.clone(),
    )
    .expect("breaker");
    let long = CircuitBreaker::with_clock(
        "long",
        CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .timeout(Duration::from_secs(60))
            .build()
            .expect("config"),
        clock.clone(),
    )
    .expect("breaker");

    for breaker in [&short, &long] {
        let _ = breaker.call(|| async { Err::<(), _>(TestError::transient("down")) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    clock.advance(Duration::from_secs(10));

    let trial = short.call(|| async { Ok::<_, TestError>("ok") }).await;
    assert_eq!(trial.expect("trial call should run"), "ok");
    assert_eq!(short.state(), CircuitState::Closed);

    let rejected = long.call(|| async { Ok::<_, TestError>("ok") }).await;
    assert!(rejected.expect_err("still open").is_circuit_open());
}

/// Validates a bulkhead shared across spawned tasks with retrying callers.
///
/// Assertions:
/// - All tasks complete and all permits return to the pool.
#[tokio::test]
async fn test_bulkhead_with_retrying_tasks() {
    let bulkhead = Arc::new(Bulkhead::with_capacity("writers", 2).expect("bulkhead"));
    let attempts = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let bulkhead = Arc::clone(&bulkhead);
        let attempts = Arc::clone(&attempts);
        handles.push(tokio::spawn(async move {
            let flaky = AtomicU32::new(0);
            with_retry(quick_retry(2), || {
                bulkhead.execute(|| async {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if flaky.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TestError::transient("first try fails"))
                    } else {
                        Ok(())
                    }
                })
            })
            .await
            .map_err(ResilienceError::flatten)
        }));
    }

    for handle in handles {
        handle.await.expect("task").expect("second attempt succeeds");
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 12);
    assert_eq!(bulkhead.available_permits(), 2);
    assert_eq!(bulkhead.metrics().total_operations, 12);
}
