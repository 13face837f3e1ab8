//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: exactly one trial call tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold within monitoring period
//! Open → Half-Open: reset timeout elapsed (checked on the next call)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open, guarded so concurrent callers cannot slip through
//! - A trial whose future is dropped releases its slot

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::audit::{AuditEntry, AuditOutcome, AuditSink, RequestContext, TracingAuditSink};
use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::error::{BreakerError, BreakerResult};
use crate::time::{Clock, SystemClock};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Counters and timings owned by one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    /// Every call, including rejected ones.
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub consecutive_failures: u32,
    /// Mean latency of successful attempts.
    pub average_response_time_ms: f64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    /// Wall-clock time (ms since epoch) the circuit opened. Set only while open.
    pub circuit_open_time: Option<u64>,
    pub times_opened: u64,
    /// Attempts beyond the first, summed over all calls.
    pub retry_attempts: u64,
    pub fallback_activations: u64,
    pub last_failure: Option<String>,
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            rejected_requests: 0,
            consecutive_failures: 0,
            average_response_time_ms: 0.0,
            min_response_time_ms: None,
            max_response_time_ms: None,
            circuit_open_time: None,
            times_opened: 0,
            retry_attempts: 0,
            fallback_activations: 0,
            last_failure: None,
        }
    }
}

struct BreakerState {
    metrics: CircuitBreakerMetrics,
    opened_at: Option<Instant>,
    /// Timestamps of the current failure streak inside the monitoring period.
    failure_window: VecDeque<Instant>,
    trial_in_flight: bool,
}

enum Admission {
    Pass,
    Trial,
    Reject,
}

enum AttemptFailure {
    Error(String),
    Timeout(Duration),
    Panicked,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Error(e) => f.write_str(e),
            AttemptFailure::Timeout(d) => write!(f, "attempt timed out after {}ms", d.as_millis()),
            AttemptFailure::Panicked => f.write_str("operation panicked"),
        }
    }
}

/// Guards one logical operation against a failing dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    state: Mutex<BreakerState>,
    disposed: AtomicBool,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker using the system clock and tracing audit sink.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            clock: Arc::new(SystemClock::new()),
            audit: Arc::new(TracingAuditSink),
            state: Mutex::new(BreakerState {
                metrics: CircuitBreakerMetrics::default(),
                opened_at: None,
                failure_window: VecDeque::new(),
                trial_in_flight: false,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Stored state. An open circuit past its reset timeout still reports
    /// `Open` until the next call moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.lock().metrics.state
    }

    /// Point-in-time copy of the counters.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Run `operation` through the breaker.
    ///
    /// Each attempt is bounded by `request_timeout`, retried up to
    /// `max_retries` times with exponential backoff, and the whole sequence
    /// is bounded by `overall_timeout`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F, context: &RequestContext) -> BreakerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run(operation, context, None::<fn(&BreakerError, &RequestContext) -> T>)
            .await
    }

    /// Like [`execute`](Self::execute), but a rejected or failed call yields
    /// `fallback(error, context)` instead of an error.
    ///
    /// Fail-secure critical breakers never call `fallback`.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(
        &self,
        operation: F,
        context: &RequestContext,
        fallback: FB,
    ) -> BreakerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(&BreakerError, &RequestContext) -> T,
    {
        self.run(operation, context, Some(fallback)).await
    }

    /// Operator escape hatch: close the circuit and clear the failure streak.
    pub fn force_reset(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        let previous = state.metrics.state;
        self.transition(&mut state, CircuitState::Closed, now);
        state.metrics.consecutive_failures = 0;
        state.failure_window.clear();
        tracing::warn!(breaker = %self.name, previous = %previous, "Circuit manually reset");
    }

    /// Mark the breaker as torn down. Later calls are refused and results of
    /// calls still in flight are discarded.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!(breaker = %self.name, "Circuit breaker disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    fn unavailable(&self) -> BreakerError {
        BreakerError::ServiceUnavailable {
            service: self.name.clone(),
            healthcare_critical: self.config.healthcare_critical,
            cause: None,
        }
    }

    async fn run<T, E, F, Fut, FB>(
        &self,
        mut operation: F,
        context: &RequestContext,
        fallback: Option<FB>,
    ) -> BreakerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(&BreakerError, &RequestContext) -> T,
    {
        let started = self.clock.now();

        if self.is_disposed() {
            return Err(self.unavailable());
        }

        let admission = self.admit();
        if let Admission::Reject = admission {
            tracing::debug!(breaker = %self.name, request_id = %context.request_id, "Call rejected: circuit open");
            metrics::record_breaker_call(&self.name, "rejected");
            let err = self.unavailable();
            return self.settle_failure(err, context, fallback, AuditOutcome::Rejected, 0, started);
        }

        let is_trial = matches!(admission, Admission::Trial);
        let mut trial = TrialGuard {
            breaker: self,
            active: is_trial,
        };

        let (result, attempts) = self.attempt_with_retries(&mut operation).await;
        if attempts > 1 {
            metrics::record_breaker_retries(&self.name, u64::from(attempts - 1));
        }

        match result {
            Ok((value, response_time)) => {
                self.record_success(response_time, attempts, is_trial);
                trial.active = false;
                metrics::record_breaker_call(&self.name, "success");
                self.audit(context, AuditOutcome::Success, attempts, started, None);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(&err, attempts, is_trial);
                trial.active = false;
                metrics::record_breaker_call(&self.name, "failure");
                self.settle_failure(err, context, fallback, AuditOutcome::Failed, attempts, started)
            }
        }
    }

    fn admit(&self) -> Admission {
        let now = self.clock.now();
        let mut state = self.lock();
        state.metrics.total_requests += 1;

        if state.metrics.state == CircuitState::Open {
            let eligible = state
                .opened_at
                .map_or(true, |at| now.saturating_duration_since(at) >= self.config.reset_timeout());
            if eligible {
                self.transition(&mut state, CircuitState::HalfOpen, now);
            }
        }

        let current = state.metrics.state;
        match current {
            CircuitState::Closed => Admission::Pass,
            CircuitState::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                Admission::Trial
            }
            _ => {
                state.metrics.rejected_requests += 1;
                Admission::Reject
            }
        }
    }

    async fn attempt_with_retries<T, E, F, Fut>(&self, operation: &mut F) -> (Result<(T, Duration), BreakerError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let request_timeout = self.config.request_timeout();
        let overall_timeout = self.config.overall_timeout();
        let deadline = Instant::now() + overall_timeout;
        let mut attempts = 0u32;
        let mut last_failure: Option<AttemptFailure> = None;

        let sequence = async {
            loop {
                attempts += 1;
                let attempt_started = self.clock.now();
                let outcome = time::timeout(request_timeout, AssertUnwindSafe(operation()).catch_unwind()).await;

                let failure = match outcome {
                    Ok(Ok(Ok(value))) => {
                        let elapsed = self.clock.now().saturating_duration_since(attempt_started);
                        return Some((value, elapsed));
                    }
                    Ok(Ok(Err(e))) => AttemptFailure::Error(e.to_string()),
                    Ok(Err(_)) => AttemptFailure::Panicked,
                    Err(_) => AttemptFailure::Timeout(request_timeout),
                };
                tracing::debug!(breaker = %self.name, attempt = attempts, error = %failure, "Attempt failed");
                last_failure = Some(failure);

                if attempts > self.config.max_retries {
                    return None;
                }

                let delay = calculate_backoff(
                    attempts - 1,
                    self.config.retry_delay(),
                    self.config.retry_backoff_multiplier,
                    overall_timeout,
                );
                if Instant::now() + delay >= deadline {
                    tracing::debug!(breaker = %self.name, attempt = attempts, "Skipping retry: overall deadline would pass");
                    return None;
                }
                tracing::debug!(breaker = %self.name, attempt = attempts, delay_ms = delay.as_millis() as u64, "Retrying");
                time::sleep(delay).await;
            }
        };

        let outcome = time::timeout_at(deadline, sequence).await;
        let result = match outcome {
            Ok(Some(success)) => Ok(success),
            Ok(None) => match last_failure {
                Some(AttemptFailure::Timeout(d)) if attempts == 1 => Err(BreakerError::OperationTimeout(d)),
                other => Err(BreakerError::RetriesExhausted {
                    attempts,
                    last_error: other.map(|f| f.to_string()).unwrap_or_default(),
                }),
            },
            Err(_) => {
                let last = last_failure.map(|f| format!(" (last error: {f})")).unwrap_or_default();
                Err(BreakerError::RetriesExhausted {
                    attempts,
                    last_error: format!("overall timeout of {}ms exceeded{last}", overall_timeout.as_millis()),
                })
            }
        };
        (result, attempts)
    }

    /// Only the half-open trial may close the circuit. Calls admitted before
    /// the circuit opened update counters only.
    fn record_success(&self, response_time: Duration, attempts: u32, trial: bool) {
        if self.is_disposed() {
            return;
        }
        let now = self.clock.now();
        let mut state = self.lock();
        let m = &mut state.metrics;
        m.successful_requests += 1;
        m.consecutive_failures = 0;
        m.retry_attempts += u64::from(attempts.saturating_sub(1));

        let sample_ms = response_time.as_secs_f64() * 1000.0;
        m.average_response_time_ms += (sample_ms - m.average_response_time_ms) / m.successful_requests as f64;
        let whole_ms = response_time.as_millis() as u64;
        m.min_response_time_ms = Some(m.min_response_time_ms.map_or(whole_ms, |v| v.min(whole_ms)));
        m.max_response_time_ms = Some(m.max_response_time_ms.map_or(whole_ms, |v| v.max(whole_ms)));

        state.failure_window.clear();
        if trial && state.metrics.state == CircuitState::HalfOpen {
            self.transition(&mut state, CircuitState::Closed, now);
        }
    }

    fn record_failure(&self, error: &BreakerError, attempts: u32, trial: bool) {
        if self.is_disposed() {
            return;
        }
        let now = self.clock.now();
        let period = self.config.monitoring_period();
        let mut state = self.lock();
        let m = &mut state.metrics;
        m.failed_requests += 1;
        m.consecutive_failures += 1;
        m.retry_attempts += u64::from(attempts.saturating_sub(1));
        m.last_failure = Some(error.to_string());

        state.failure_window.push_back(now);
        while let Some(&oldest) = state.failure_window.front() {
            if now.saturating_duration_since(oldest) > period {
                state.failure_window.pop_front();
            } else {
                break;
            }
        }

        let current = state.metrics.state;
        let streak = state.failure_window.len();
        match current {
            CircuitState::HalfOpen if trial => self.transition(&mut state, CircuitState::Open, now),
            CircuitState::Closed if streak >= self.config.failure_threshold as usize => {
                self.transition(&mut state, CircuitState::Open, now)
            }
            _ => {}
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = state.metrics.state;
        state.trial_in_flight = false;
        if from == to {
            return;
        }
        state.metrics.state = to;

        match to {
            CircuitState::Open => {
                state.opened_at = Some(now);
                state.metrics.circuit_open_time = Some(self.clock.unix_millis());
                state.metrics.times_opened += 1;
                tracing::warn!(
                    breaker = %self.name,
                    from = %from,
                    consecutive_failures = state.metrics.consecutive_failures,
                    reset_timeout_ms = self.config.reset_timeout_ms,
                    "Circuit opened"
                );
            }
            CircuitState::HalfOpen => {
                state.opened_at = None;
                state.metrics.circuit_open_time = None;
                tracing::info!(breaker = %self.name, "Circuit half-open: allowing one trial call");
            }
            CircuitState::Closed => {
                state.opened_at = None;
                state.metrics.circuit_open_time = None;
                state.failure_window.clear();
                tracing::info!(breaker = %self.name, from = %from, "Circuit closed");
            }
        }

        metrics::record_breaker_transition(&self.name, to);
    }

    fn settle_failure<T, FB>(
        &self,
        err: BreakerError,
        context: &RequestContext,
        fallback: Option<FB>,
        outcome: AuditOutcome,
        attempts: u32,
        started: Instant,
    ) -> BreakerResult<T>
    where
        FB: FnOnce(&BreakerError, &RequestContext) -> T,
    {
        if self.config.is_fail_secure() {
            if fallback.is_some() {
                tracing::warn!(breaker = %self.name, error = %err, "Fail-secure: fallback suppressed, denying call");
            }
            self.audit(context, outcome, attempts, started, Some(err.to_string()));
            if err.is_rejection() {
                return Err(err);
            }
            return Err(BreakerError::ServiceUnavailable {
                service: self.name.clone(),
                healthcare_critical: true,
                cause: Some(err.to_string()),
            });
        }

        if let Some(fallback) = fallback {
            self.lock().metrics.fallback_activations += 1;
            tracing::info!(breaker = %self.name, error = %err, "Serving fallback result");
            metrics::record_breaker_call(&self.name, "fallback");
            self.audit(context, AuditOutcome::Fallback, attempts, started, Some(err.to_string()));
            return Ok(fallback(&err, context));
        }

        self.audit(context, outcome, attempts, started, Some(err.to_string()));
        Err(err)
    }

    fn audit(&self, context: &RequestContext, outcome: AuditOutcome, attempts: u32, started: Instant, error: Option<String>) {
        if !self.config.audit_logging {
            return;
        }
        let timestamp_ms = self.clock.unix_millis();
        let mut context = context.clone();
        if context.timestamp_ms == 0 {
            context.timestamp_ms = timestamp_ms;
        }
        let entry = AuditEntry {
            timestamp_ms,
            breaker: self.name.clone(),
            classification: context.data_classification(),
            context,
            circuit_state: self.state(),
            outcome,
            attempts,
            duration_ms: self.clock.now().saturating_duration_since(started).as_millis() as u64,
            error,
        };
        self.audit.record(entry);
    }
}

/// Releases the half-open trial slot if the trial never settled
/// (e.g. the caller dropped the future).
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    active: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let mut state = self.breaker.lock();
        if state.metrics.state == CircuitState::HalfOpen && state.trial_in_flight {
            state.trial_in_flight = false;
            tracing::debug!(breaker = %self.breaker.name, "Abandoned trial call released");
        }
    }
}
