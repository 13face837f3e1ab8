//! Named circuit breaker registry.
//!
//! # Responsibilities
//! - Own breaker lifetime: one instance per dependency name
//! - Hand out shared handles for lookup and execution
//! - Dispose breakers on removal so late results are discarded

use dashmap::DashMap;
use std::sync::Arc;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::schema::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::time::{Clock, SystemClock};

/// Registry of breakers keyed by dependency name.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(SystemClock::new()), Arc::new(TracingAuditSink))
    }

    /// Registry whose breakers share `clock` and `audit`.
    pub fn with_parts(clock: Arc<dyn Clock>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            breakers: DashMap::new(),
            clock,
            audit,
        }
    }

    /// Return the breaker registered under `name`, creating it with `config`
    /// if absent. `config` is ignored when the breaker already exists.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, threshold = config.failure_threshold, "Creating circuit breaker");
                Arc::new(
                    CircuitBreaker::new(name, config)
                        .with_clock(self.clock.clone())
                        .with_audit_sink(self.audit.clone()),
                )
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Remove and dispose the breaker. Returns false if it did not exist.
    pub fn destroy(&self, name: &str) -> bool {
        match self.breakers.remove(name) {
            Some((_, breaker)) => {
                breaker.dispose();
                true
            }
            None => false,
        }
    }

    /// Dispose every breaker.
    pub fn destroy_all(&self) {
        let names: Vec<String> = self.names();
        for name in names {
            self.destroy(&name);
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Metrics of every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        let mut all: Vec<(String, CircuitBreakerMetrics)> = self
            .breakers
            .iter()
            .map(|r| (r.key().clone(), r.value().metrics()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RequestContext;
    use crate::resilience::{BreakerError, CircuitState};

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("billing", CircuitBreakerConfig::standard());
        let b = registry.get_or_create("billing", CircuitBreakerConfig::healthcare_critical());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().failure_threshold, 5);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let registry = CircuitBreakerRegistry::new();
        let breaker = registry.get_or_create("cache", CircuitBreakerConfig::standard());

        assert!(registry.destroy("cache"));
        assert!(!registry.destroy("cache"));
        assert!(breaker.is_disposed());
        assert!(registry.get("cache").is_none());
    }

    #[tokio::test]
    async fn test_destroyed_breaker_is_replaced_fresh() {
        let registry = CircuitBreakerRegistry::new();
        let mut cfg = CircuitBreakerConfig::standard();
        cfg.failure_threshold = 1;
        cfg.max_retries = 0;
        let old = registry.get_or_create("db", cfg.clone());
        let ctx = RequestContext::new("db", "tcp://db:5432");
        let _ = old.execute(|| async { Err::<(), _>("down") }, &ctx).await;
        assert_eq!(old.state(), CircuitState::Open);

        registry.destroy("db");
        let fresh = registry.get_or_create("db", cfg);
        assert_eq!(fresh.state(), CircuitState::Closed);
        assert!(matches!(
            old.execute(|| async { Ok::<_, String>(()) }, &ctx).await,
            Err(BreakerError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = CircuitBreakerRegistry::new();
        registry.get_or_create("b", CircuitBreakerConfig::standard());
        registry.get_or_create("a", CircuitBreakerConfig::standard());

        let names: Vec<String> = registry.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);

        registry.destroy_all();
        assert!(registry.is_empty());
    }
}
