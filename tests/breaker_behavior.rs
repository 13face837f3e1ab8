//! Circuit breaker behavior with the shipped presets.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use health_guard::audit::{AuditOutcome, DataClassification, MemoryAuditSink, RequestContext};
use health_guard::resilience::{BreakerError, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
use health_guard::time::SystemClock;

fn patient_lookup() -> RequestContext {
    RequestContext::new("patient-service", "/api/patients/123")
        .with_user("dr-house")
        .with_patient("123")
        .with_description("chart lookup")
}

#[tokio::test(start_paused = true)]
async fn test_critical_preset_fails_secure_with_audit_trail() {
    let audit = Arc::new(MemoryAuditSink::new());
    let registry = CircuitBreakerRegistry::with_parts(Arc::new(SystemClock::new()), audit.clone());
    let mut config = CircuitBreakerConfig::healthcare_critical();
    config.max_retries = 0;
    let breaker = registry.get_or_create("patient-service", config);

    for _ in 0..3 {
        let result = breaker
            .execute_with_fallback(
                || async { Err::<String, _>("connection reset") },
                &patient_lookup(),
                |_, _| "cached chart".to_string(),
            )
            .await;
        match result {
            Err(err @ BreakerError::ServiceUnavailable { .. }) => {
                assert!(err.is_fail_secure());
                assert!(!err.is_rejection());
                assert!(err.to_string().contains("connection reset"));
            }
            other => panic!("expected fail-secure denial, got {:?}", other),
        }
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = breaker
        .execute_with_fallback(
            || async { Ok::<_, String>("fresh chart".to_string()) },
            &patient_lookup(),
            |_, _| "cached chart".to_string(),
        )
        .await;
    match rejected {
        Err(err @ BreakerError::ServiceUnavailable { .. }) => {
            assert!(err.is_fail_secure());
            assert!(err.is_rejection());
        }
        other => panic!("expected fail-secure denial, got {:?}", other),
    }

    let metrics = breaker.metrics();
    assert_eq!(metrics.fallback_activations, 0);
    assert_eq!(metrics.rejected_requests, 1);
    assert_eq!(metrics.total_requests, 4);

    let entries = audit.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries
        .iter()
        .all(|e| e.classification == DataClassification::Restricted));
    assert_eq!(entries[3].outcome, AuditOutcome::Rejected);
    assert_eq!(entries[3].circuit_state, CircuitState::Open);
    assert_eq!(entries[0].context.user_id.as_deref(), Some("dr-house"));
}

#[tokio::test(start_paused = true)]
async fn test_standard_preset_serves_fallback_without_audit() {
    let audit = Arc::new(MemoryAuditSink::new());
    let registry = CircuitBreakerRegistry::with_parts(Arc::new(SystemClock::new()), audit.clone());
    let mut config = CircuitBreakerConfig::standard();
    config.max_retries = 0;
    let breaker = registry.get_or_create("appointment-reminders", config);
    let ctx = RequestContext::new("appointment-reminders", "/api/reminders");

    for _ in 0..7 {
        let value = breaker
            .execute_with_fallback(|| async { Err::<u32, _>("503") }, &ctx, |_, _| 0)
            .await;
        assert_eq!(value, Ok(0));
    }

    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Open);
    assert_eq!(metrics.failed_requests, 5);
    assert_eq!(metrics.rejected_requests, 2);
    assert_eq!(metrics.fallback_activations, 7);
    assert!(audit.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_critical_preset_retry_schedule() {
    let registry = CircuitBreakerRegistry::new();
    let breaker = registry.get_or_create("lab-results", CircuitBreakerConfig::healthcare_critical());
    let ctx = RequestContext::new("lab-results", "/api/lab-results");

    let started = Instant::now();
    let result = breaker.execute(|| async { Err::<(), _>("unavailable") }, &ctx).await;
    let elapsed = started.elapsed();

    match result {
        Err(BreakerError::ServiceUnavailable { healthcare_critical, cause: Some(cause), .. }) => {
            assert!(healthcare_critical);
            assert!(cause.contains("after 3 attempt(s)"), "cause {cause}");
            assert!(cause.contains("unavailable"));
        }
        other => panic!("expected fail-secure denial, got {:?}", other),
    }
    // 500ms then 1000ms, each with at most 10% jitter.
    assert!(elapsed >= Duration::from_millis(1_500), "elapsed {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(1_650), "elapsed {:?}", elapsed);
    assert_eq!(breaker.metrics().retry_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_open_once() {
    let registry = CircuitBreakerRegistry::new();
    let mut config = CircuitBreakerConfig::healthcare_critical();
    config.max_retries = 0;
    let breaker = registry.get_or_create("pharmacy-gateway", config);
    let ctx = RequestContext::new("pharmacy-gateway", "/api/prescriptions");

    let calls = (0..10).map(|_| breaker.execute(|| async { Err::<(), _>("refused") }, &ctx));
    let results = join_all(calls).await;

    assert!(results.iter().all(|r| matches!(r, Err(e) if e.is_fail_secure())));
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_rejection()))
        .count();
    let metrics = breaker.metrics();
    assert_eq!(metrics.times_opened, 1);
    assert_eq!(metrics.total_requests, 10);
    assert_eq!(metrics.failed_requests + metrics.rejected_requests, 10);
    assert_eq!(rejected as u64, metrics.rejected_requests);
    assert!(metrics.failed_requests >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_reset_timeout() {
    let registry = CircuitBreakerRegistry::new();
    let mut config = CircuitBreakerConfig::healthcare_critical();
    config.max_retries = 0;
    let breaker = registry.get_or_create("ehr-sync", config);
    let ctx = RequestContext::new("ehr-sync", "/sync");

    for _ in 0..3 {
        let _ = breaker.execute(|| async { Err::<(), _>("down") }, &ctx).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.metrics().circuit_open_time.is_some());

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(matches!(
        breaker.execute(|| async { Ok::<_, String>(()) }, &ctx).await,
        Err(BreakerError::ServiceUnavailable { cause: None, .. })
    ));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(breaker.execute(|| async { Ok::<_, String>(()) }, &ctx).await, Ok(()));
    let metrics = breaker.metrics();
    assert_eq!(metrics.state, CircuitState::Closed);
    assert_eq!(metrics.circuit_open_time, None);
    assert_eq!(metrics.consecutive_failures, 0);
}
