//! Periodic dependency health checker.
//!
//! # Responsibilities
//! - Own the set of monitored dependencies and one breaker per dependency
//! - Probe each dependency on its own timer, through its breaker
//! - Classify probe outcomes and keep per-dependency health and metrics
//! - Record incidents and emit events on status changes
//! - Aggregate system-wide health on demand
//!
//! # Data Flow
//! ```text
//! Timer tick / check_now
//!     → CircuitBreaker::execute(probe)
//!     → classify (latency thresholds, rejection, failure)
//!     → update ServiceHealth + ServiceMetrics
//!     → incidents + events on change
//! ```
//!
//! # Design Decisions
//! - At most one probe per dependency is in flight; a tick that finds the
//!   previous probe still running is skipped
//! - Results that land after a dependency is unregistered are discarded
//! - Threshold changes apply on the next tick; interval and breaker changes
//!   apply to dependencies registered afterwards

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::audit::{AuditSink, RequestContext, TracingAuditSink};
use crate::config::schema::HealthCheckConfig;
use crate::health::events::{EventBus, HealthCheckEvent, HealthEventKind};
use crate::health::incidents::{HealthIncident, IncidentKind, IncidentLog};
use crate::health::probe::{HealthProbe, HttpProbe, TcpProbe};
use crate::health::types::{
    ComprehensiveHealthStatus, DependencyType, HealthStatus, LatencyThresholds, ServiceDependency, ServiceHealth,
};
use crate::observability::metrics;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitBreakerRegistry};
use crate::time::{Clock, Scheduler, SystemClock, TaskHandle};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("service '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("service '{0}' is not registered")]
    NotFound(String),
}

struct ServiceEntry {
    dependency: ServiceDependency,
    breaker: Arc<CircuitBreaker>,
    health: Mutex<ServiceHealth>,
    probe_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<TaskHandle>>,
    retired: AtomicBool,
}

impl ServiceEntry {
    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire) || self.breaker.is_disposed()
    }

    fn health(&self) -> std::sync::MutexGuard<'_, ServiceHealth> {
        self.health.lock().expect("service health mutex poisoned")
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        if let Some(task) = self.task.lock().expect("service task mutex poisoned").take() {
            task.cancel();
        }
    }
}

struct CheckerInner {
    config: ArcSwap<HealthCheckConfig>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    breakers: CircuitBreakerRegistry,
    services: DashMap<String, Arc<ServiceEntry>>,
    http: HttpProbe,
    probes: RwLock<HashMap<DependencyType, Arc<dyn HealthProbe>>>,
    incidents: IncidentLog,
    events: EventBus,
}

/// Builder for [`HealthChecker`].
pub struct HealthCheckerBuilder {
    config: HealthCheckConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    scheduler: Scheduler,
}

impl HealthCheckerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> HealthChecker {
        HealthChecker {
            inner: Arc::new(CheckerInner {
                config: ArcSwap::from_pointee(self.config),
                breakers: CircuitBreakerRegistry::with_parts(self.clock.clone(), self.audit),
                clock: self.clock,
                scheduler: self.scheduler,
                services: DashMap::new(),
                http: HttpProbe::default(),
                probes: RwLock::new(HashMap::new()),
                incidents: IncidentLog::new(),
                events: EventBus::new(),
            }),
        }
    }
}

/// Monitors registered dependencies. Cheap to clone.
#[derive(Clone)]
pub struct HealthChecker {
    inner: Arc<CheckerInner>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: HealthCheckConfig) -> HealthCheckerBuilder {
        HealthCheckerBuilder {
            config,
            clock: Arc::new(SystemClock::new()),
            audit: Arc::new(TracingAuditSink),
            scheduler: Scheduler::new(),
        }
    }

    pub fn config(&self) -> Arc<HealthCheckConfig> {
        self.inner.config.load_full()
    }

    /// Swap in new thresholds. Running timers keep their interval.
    pub fn update_config(&self, config: HealthCheckConfig) {
        tracing::info!(
            warning_ms = config.response_time_warning_ms,
            critical_ms = config.response_time_critical_ms,
            compliance = config.compliance_validation,
            "Health check configuration updated"
        );
        self.inner.config.store(Arc::new(config));
    }

    /// Use `probe` for every dependency of type `kind`.
    pub fn set_probe(&self, kind: DependencyType, probe: Arc<dyn HealthProbe>) {
        self.inner
            .probes
            .write()
            .expect("probe table lock poisoned")
            .insert(kind, probe);
    }

    /// Start monitoring `dependency`.
    ///
    /// Creates its circuit breaker and, when checks are enabled, a timer that
    /// first fires one interval from now.
    pub fn register_service(&self, dependency: ServiceDependency) -> Result<(), HealthError> {
        let config = self.inner.config.load();
        let entry = match self.inner.services.entry(dependency.name.clone()) {
            Entry::Occupied(_) => return Err(HealthError::AlreadyRegistered(dependency.name)),
            Entry::Vacant(vacant) => {
                // A breaker left behind by an earlier registration must not leak its state.
                self.inner.breakers.destroy(&dependency.name);
                let breaker = self
                    .inner
                    .breakers
                    .get_or_create(&dependency.name, config.breaker_config(dependency.healthcare_critical));
                let entry = Arc::new(ServiceEntry {
                    health: Mutex::new(ServiceHealth::unknown(&dependency.name)),
                    dependency,
                    breaker,
                    probe_lock: tokio::sync::Mutex::new(()),
                    task: Mutex::new(None),
                    retired: AtomicBool::new(false),
                });
                vacant.insert(entry.clone());
                entry
            }
        };

        if config.enabled {
            let handle = self.spawn_timer(&entry, config.check_interval());
            *entry.task.lock().expect("service task mutex poisoned") = Some(handle);
        }

        tracing::info!(
            service = %entry.dependency.name,
            kind = %entry.dependency.kind,
            endpoint = %entry.dependency.endpoint,
            critical = entry.dependency.healthcare_critical,
            "Service registered for health monitoring"
        );
        Ok(())
    }

    fn spawn_timer(&self, entry: &Arc<ServiceEntry>, interval: Duration) -> TaskHandle {
        let inner: Weak<CheckerInner> = Arc::downgrade(&self.inner);
        let weak_entry: Weak<ServiceEntry> = Arc::downgrade(entry);
        let name = format!("health-check:{}", entry.dependency.name);

        self.inner.scheduler.spawn_periodic(name, interval, move || {
            let inner = inner.upgrade();
            let entry = weak_entry.upgrade();
            async move {
                let (Some(inner), Some(entry)) = (inner, entry) else {
                    return;
                };
                let Ok(_guard) = entry.probe_lock.try_lock() else {
                    tracing::debug!(service = %entry.dependency.name, "Previous probe still running, skipping tick");
                    return;
                };
                inner.run_check(&entry).await;
            }
        })
    }

    /// Stop monitoring `name` and dispose its breaker.
    pub fn unregister_service(&self, name: &str) -> bool {
        match self.inner.services.remove(name) {
            Some((_, entry)) => {
                entry.retire();
                self.inner.breakers.destroy(name);
                tracing::info!(service = %name, "Service unregistered");
                true
            }
            None => false,
        }
    }

    /// Probe `name` immediately, waiting for any probe already in flight.
    pub async fn check_now(&self, name: &str) -> Result<HealthStatus, HealthError> {
        let entry = self
            .inner
            .services
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| HealthError::NotFound(name.to_string()))?;

        let _guard = entry.probe_lock.lock().await;
        self.inner
            .run_check(&entry)
            .await
            .ok_or_else(|| HealthError::NotFound(name.to_string()))
    }

    pub fn get_service_health(&self, name: &str) -> Option<ServiceHealth> {
        self.inner.services.get(name).map(|r| r.value().health().clone())
    }

    pub fn get_all_service_health(&self) -> BTreeMap<String, ServiceHealth> {
        self.inner
            .services
            .iter()
            .map(|r| (r.key().clone(), r.value().health().clone()))
            .collect()
    }

    /// Registered dependencies, sorted by name.
    pub fn dependencies(&self) -> Vec<ServiceDependency> {
        let mut deps: Vec<ServiceDependency> = self
            .inner
            .services
            .iter()
            .map(|r| r.value().dependency.clone())
            .collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps
    }

    pub fn get_comprehensive_health_status(&self) -> ComprehensiveHealthStatus {
        let services: Vec<(ServiceDependency, ServiceHealth)> = self
            .inner
            .services
            .iter()
            .map(|r| (r.value().dependency.clone(), r.value().health().clone()))
            .collect();
        let incident_count = self.get_incidents(None).len();
        ComprehensiveHealthStatus::aggregate(services, incident_count, self.inner.clock.unix_millis())
    }

    /// Incidents at or after `since_ms`; defaults to the retention window.
    pub fn get_incidents(&self, since_ms: Option<u64>) -> Vec<HealthIncident> {
        let since = since_ms.unwrap_or_else(|| {
            let retention = self.inner.config.load().incident_retention();
            self.inner
                .clock
                .unix_millis()
                .saturating_sub(retention.as_millis() as u64)
        });
        self.inner.incidents.since(since)
    }

    /// Register a callback for every health event.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&HealthCheckEvent) + Send + Sync + 'static,
    {
        self.inner.events.add_listener(Arc::new(listener));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthCheckEvent> {
        self.inner.events.subscribe()
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.inner.breakers.get(name)
    }

    pub fn breaker_snapshot(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        self.inner.breakers.snapshot()
    }

    /// Force the breaker for `name` closed.
    pub fn reset_breaker(&self, name: &str) -> bool {
        match self.inner.breakers.get(name) {
            Some(breaker) => {
                breaker.force_reset();
                true
            }
            None => false,
        }
    }

    /// Stop all timers and dispose all breakers.
    pub fn destroy(&self) {
        let names: Vec<String> = self.inner.services.iter().map(|r| r.key().clone()).collect();
        for name in &names {
            self.unregister_service(name);
        }
        self.inner.breakers.destroy_all();
        tracing::info!(services = names.len(), "Health checker stopped");
    }
}

impl CheckerInner {
    fn probe_for(&self, kind: DependencyType) -> Arc<dyn HealthProbe> {
        if let Some(probe) = self.probes.read().expect("probe table lock poisoned").get(&kind) {
            return probe.clone();
        }
        match kind {
            DependencyType::Database | DependencyType::Cache => Arc::new(TcpProbe),
            _ => Arc::new(self.http.clone()),
        }
    }

    /// One probe through the breaker. Caller holds the entry's probe lock.
    ///
    /// Returns `None` when the dependency was unregistered meanwhile.
    async fn run_check(&self, entry: &ServiceEntry) -> Option<HealthStatus> {
        if entry.is_retired() {
            return None;
        }
        let config = self.config.load_full();
        let dependency = &entry.dependency;
        let probe = self.probe_for(dependency.kind);
        let context = RequestContext::new(&dependency.name, &dependency.endpoint)
            .with_method(probe_method(dependency.kind))
            .with_description("health check")
            .with_metadata("dependency_type", dependency.kind.to_string());

        let started = self.clock.now();
        let outcome = entry.breaker.execute(|| probe.probe(dependency), &context).await;
        let elapsed = self.clock.now().saturating_duration_since(started);

        if entry.is_retired() {
            tracing::debug!(service = %dependency.name, "Discarding probe result for unregistered service");
            return None;
        }

        let thresholds = LatencyThresholds {
            warning: Duration::from_millis(config.response_time_warning_ms),
            critical: Duration::from_millis(config.response_time_critical_ms),
        }
        .for_dependency(dependency.healthcare_critical);

        let now_ms = self.clock.unix_millis();
        let elapsed_ms = elapsed.as_millis() as u64;
        let status = match &outcome {
            Ok(()) => thresholds.classify(elapsed),
            Err(_) => HealthStatus::Unhealthy,
        };

        let previous = {
            let mut health = entry.health();
            let previous = health.status;
            health.status = status;
            health.last_check = Some(now_ms);
            health.circuit_state = entry.breaker.state();
            match &outcome {
                Ok(()) => {
                    health.response_time_ms = Some(elapsed_ms);
                    health.consecutive_failures = 0;
                    health.last_error = None;
                    health.metrics.record_success(elapsed, now_ms);
                }
                Err(e) => {
                    health.consecutive_failures += 1;
                    health.last_error = Some(e.to_string());
                    health.metrics.record_failure(now_ms);
                }
            }
            previous
        };
        metrics::record_health_check(&dependency.name, status, elapsed);

        match &outcome {
            Ok(()) if elapsed > thresholds.critical => {
                let details = format!(
                    "response time {}ms exceeded critical threshold {}ms",
                    elapsed_ms,
                    thresholds.critical.as_millis()
                );
                self.record_incident(dependency, IncidentKind::ResponseTimeViolation, details, now_ms, &config);
            }
            Ok(()) => {}
            Err(e) if e.is_rejection() => {
                tracing::debug!(service = %dependency.name, "Probe rejected by open circuit");
            }
            Err(e) => {
                tracing::warn!(service = %dependency.name, error = %e, "Health check failed");
                self.record_incident(dependency, IncidentKind::HealthCheckFailure, e.to_string(), now_ms, &config);
            }
        }

        if status != previous {
            self.announce(dependency, status, previous, elapsed_ms, now_ms, &config);
        }
        Some(status)
    }

    fn announce(
        &self,
        dependency: &ServiceDependency,
        status: HealthStatus,
        previous: HealthStatus,
        elapsed_ms: u64,
        now_ms: u64,
        config: &HealthCheckConfig,
    ) {
        match status {
            HealthStatus::Healthy => {
                tracing::info!(service = %dependency.name, previous = %previous, "Service healthy")
            }
            _ => tracing::warn!(service = %dependency.name, status = %status, previous = %previous, "Service health changed"),
        }

        let mut details = BTreeMap::new();
        details.insert("response_time_ms".to_string(), elapsed_ms.to_string());
        details.insert("endpoint".to_string(), dependency.endpoint.clone());
        let event = |kind: HealthEventKind| HealthCheckEvent {
            kind,
            service: dependency.name.clone(),
            timestamp_ms: now_ms,
            status,
            previous_status: previous,
            healthcare_critical: dependency.healthcare_critical,
            details: details.clone(),
        };

        if let Some(kind) = HealthEventKind::for_status(status) {
            self.events.emit(event(kind));
        }
        if previous == HealthStatus::Unhealthy && status == HealthStatus::Healthy {
            tracing::info!(service = %dependency.name, "Recovery detected");
            self.events.emit(event(HealthEventKind::RecoveryDetected));
        }
        if status == HealthStatus::Unhealthy && dependency.healthcare_critical && config.compliance_validation {
            tracing::error!(service = %dependency.name, "Healthcare-critical service unavailable");
            self.record_incident(
                dependency,
                IncidentKind::ComplianceViolation,
                format!("healthcare-critical service '{}' is unavailable", dependency.name),
                now_ms,
                config,
            );
            self.events.emit(event(HealthEventKind::ComplianceViolation));
        }
    }

    fn record_incident(
        &self,
        dependency: &ServiceDependency,
        kind: IncidentKind,
        details: String,
        now_ms: u64,
        config: &HealthCheckConfig,
    ) {
        let incident = HealthIncident::new(&dependency.name, kind, dependency.healthcare_critical, details, now_ms);
        tracing::debug!(service = %dependency.name, kind = %kind, severity = %incident.severity, "Incident recorded");
        metrics::record_incident(&dependency.name, kind);
        self.incidents.append(incident, config.incident_retention());
    }
}

fn probe_method(kind: DependencyType) -> &'static str {
    match kind {
        DependencyType::External => "HEAD",
        DependencyType::Database | DependencyType::Cache => "CONNECT",
        _ => "GET",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeError;
    use crate::time::ManualClock;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct FlakyProbe {
        fail: AtomicBool,
        calls: AtomicU32,
    }

    impl HealthProbe for FlakyProbe {
        fn probe(&self, _: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(ProbeError::Connect("refused".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn checker_with(probe: Arc<FlakyProbe>) -> HealthChecker {
        let config = HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        };
        let checker = HealthChecker::builder(config)
            .clock(Arc::new(ManualClock::default()))
            .build();
        checker.set_probe(DependencyType::Api, probe);
        checker
    }

    fn api(name: &str) -> ServiceDependency {
        ServiceDependency::new(name, DependencyType::Api, "http://localhost:1")
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let checker = checker_with(Arc::new(FlakyProbe::default()));
        checker.register_service(api("billing")).unwrap();
        assert_eq!(
            checker.register_service(api("billing")),
            Err(HealthError::AlreadyRegistered("billing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_until_first_check() {
        let checker = checker_with(Arc::new(FlakyProbe::default()));
        checker.register_service(api("billing")).unwrap();
        let health = checker.get_service_health("billing").unwrap();
        assert_eq!(health.status, HealthStatus::Unknown);
        assert_eq!(health.metrics.uptime_percent, 100.0);

        assert_eq!(checker.check_now("billing").await.unwrap(), HealthStatus::Healthy);
        let health = checker.get_service_health("billing").unwrap();
        assert_eq!(health.metrics.total_checks, 1);
        assert!(health.last_check.is_some());
    }

    #[tokio::test]
    async fn test_failure_counts_and_reset() {
        let probe = Arc::new(FlakyProbe::default());
        let checker = checker_with(probe.clone());
        checker.register_service(api("billing")).unwrap();

        probe.fail.store(true, Ordering::SeqCst);
        checker.check_now("billing").await.unwrap();
        checker.check_now("billing").await.unwrap();
        let health = checker.get_service_health("billing").unwrap();
        assert_eq!(health.consecutive_failures, 2);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.last_error.is_some());

        probe.fail.store(false, Ordering::SeqCst);
        assert_eq!(checker.check_now("billing").await.unwrap(), HealthStatus::Healthy);
        let health = checker.get_service_health("billing").unwrap();
        assert_eq!(health.consecutive_failures, 0);
        assert!((health.metrics.uptime_percent - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unregister_disposes_breaker() {
        let checker = checker_with(Arc::new(FlakyProbe::default()));
        checker.register_service(api("billing")).unwrap();
        let breaker = checker.breaker("billing").unwrap();

        assert!(checker.unregister_service("billing"));
        assert!(!checker.unregister_service("billing"));
        assert!(breaker.is_disposed());
        assert!(checker.get_service_health("billing").is_none());
        assert_eq!(
            checker.check_now("billing").await,
            Err(HealthError::NotFound("billing".to_string()))
        );
    }

    #[tokio::test]
    async fn test_reregistration_starts_fresh() {
        let probe = Arc::new(FlakyProbe::default());
        probe.fail.store(true, Ordering::SeqCst);
        let checker = checker_with(probe.clone());
        checker.register_service(api("billing")).unwrap();
        checker.check_now("billing").await.unwrap();
        checker.unregister_service("billing");

        checker.register_service(api("billing")).unwrap();
        let health = checker.get_service_health("billing").unwrap();
        assert_eq!(health.status, HealthStatus::Unknown);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(checker.breaker("billing").unwrap().metrics().total_requests, 0);
    }

    #[tokio::test]
    async fn test_disabled_checks_do_not_schedule() {
        let probe = Arc::new(FlakyProbe::default());
        let checker = checker_with(probe.clone());
        checker.register_service(api("billing")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_breaker() {
        let checker = checker_with(Arc::new(FlakyProbe::default()));
        checker.register_service(api("billing")).unwrap();
        assert!(checker.reset_breaker("billing"));
        assert!(!checker.reset_breaker("missing"));
        assert_eq!(checker.breaker_snapshot().len(), 1);
    }
}
