//! Health data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::audit::DataClassification;
use crate::resilience::CircuitState;

/// Health of one dependency, or of the system as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
            HealthStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Kind of dependency; selects the probe used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Api,
    Database,
    Cache,
    External,
    Internal,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyType::Api => "api",
            DependencyType::Database => "database",
            DependencyType::Cache => "cache",
            DependencyType::External => "external",
            DependencyType::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Static description of a monitored dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDependency {
    /// Unique key.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub endpoint: String,
    #[serde(default)]
    pub healthcare_critical: bool,
    #[serde(default)]
    pub data_sensitivity: DataClassification,
    /// Feature tags that need this dependency.
    #[serde(default)]
    pub required_for: Vec<String>,
}

impl ServiceDependency {
    pub fn new(name: impl Into<String>, kind: DependencyType, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            endpoint: endpoint.into(),
            healthcare_critical: false,
            data_sensitivity: DataClassification::Public,
            required_for: Vec::new(),
        }
    }

    pub fn critical(mut self) -> Self {
        self.healthcare_critical = true;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: DataClassification) -> Self {
        self.data_sensitivity = sensitivity;
        self
    }

    pub fn required_for(mut self, feature: impl Into<String>) -> Self {
        self.required_for.push(feature.into());
        self
    }
}

/// Running probe statistics for one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    /// Mean latency of successful probes.
    pub average_response_time_ms: f64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
    /// Successful checks as a percentage of all checks; 100 before the first check.
    pub uptime_percent: f64,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self {
            total_checks: 0,
            successful_checks: 0,
            failed_checks: 0,
            average_response_time_ms: 0.0,
            min_response_time_ms: None,
            max_response_time_ms: None,
            last_success: None,
            last_failure: None,
            uptime_percent: 100.0,
        }
    }
}

impl ServiceMetrics {
    pub fn record_success(&mut self, response_time: Duration, at_ms: u64) {
        self.total_checks += 1;
        self.successful_checks += 1;
        self.last_success = Some(at_ms);

        let sample = response_time.as_secs_f64() * 1000.0;
        self.average_response_time_ms += (sample - self.average_response_time_ms) / self.successful_checks as f64;
        let whole = response_time.as_millis() as u64;
        self.min_response_time_ms = Some(self.min_response_time_ms.map_or(whole, |v| v.min(whole)));
        self.max_response_time_ms = Some(self.max_response_time_ms.map_or(whole, |v| v.max(whole)));
        self.update_uptime();
    }

    pub fn record_failure(&mut self, at_ms: u64) {
        self.total_checks += 1;
        self.failed_checks += 1;
        self.last_failure = Some(at_ms);
        self.update_uptime();
    }

    fn update_uptime(&mut self) {
        self.uptime_percent = self.successful_checks as f64 / self.total_checks as f64 * 100.0;
    }
}

/// Current health of one registered dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub response_time_ms: Option<u64>,
    pub last_check: Option<u64>,
    pub consecutive_failures: u32,
    pub circuit_state: CircuitState,
    pub last_error: Option<String>,
    pub metrics: ServiceMetrics,
}

impl ServiceHealth {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unknown,
            response_time_ms: None,
            last_check: None,
            consecutive_failures: 0,
            circuit_state: CircuitState::Closed,
            last_error: None,
            metrics: ServiceMetrics::default(),
        }
    }
}

/// Latency thresholds for classifying a successful probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyThresholds {
    pub warning: Duration,
    pub critical: Duration,
}

impl LatencyThresholds {
    /// Non-critical dependencies get 1.5× more headroom.
    pub fn for_dependency(self, healthcare_critical: bool) -> Self {
        if healthcare_critical {
            self
        } else {
            Self {
                warning: self.warning.mul_f64(1.5),
                critical: self.critical.mul_f64(1.5),
            }
        }
    }

    pub fn classify(&self, response_time: Duration) -> HealthStatus {
        if response_time <= self.warning {
            HealthStatus::Healthy
        } else if response_time <= self.critical {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// System-wide health, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveHealthStatus {
    pub overall: HealthStatus,
    pub services: BTreeMap<String, ServiceHealth>,
    pub average_uptime: f64,
    pub incident_count: usize,
    /// No healthcare-critical dependency is UNHEALTHY.
    pub healthcare_compliance: bool,
    /// Every healthcare-critical dependency is HEALTHY.
    pub critical_services_healthy: bool,
    pub timestamp_ms: u64,
}

impl ComprehensiveHealthStatus {
    /// Aggregate per-dependency health.
    ///
    /// Overall is UNHEALTHY when compliance is violated or average uptime is
    /// below 80%, DEGRADED when uptime is below 95% or a critical dependency
    /// is not HEALTHY, otherwise HEALTHY.
    pub fn aggregate(
        services: Vec<(ServiceDependency, ServiceHealth)>,
        incident_count: usize,
        timestamp_ms: u64,
    ) -> Self {
        let average_uptime = if services.is_empty() {
            100.0
        } else {
            services.iter().map(|(_, h)| h.metrics.uptime_percent).sum::<f64>() / services.len() as f64
        };

        let critical: Vec<&ServiceHealth> = services
            .iter()
            .filter(|(d, _)| d.healthcare_critical)
            .map(|(_, h)| h)
            .collect();
        let critical_services_healthy = critical.iter().all(|h| h.status == HealthStatus::Healthy);
        let healthcare_compliance = critical.iter().all(|h| h.status != HealthStatus::Unhealthy);

        let overall = if !healthcare_compliance || average_uptime < 80.0 {
            HealthStatus::Unhealthy
        } else if average_uptime < 95.0 || !critical_services_healthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall,
            services: services.into_iter().map(|(d, h)| (d.name, h)).collect(),
            average_uptime,
            incident_count,
            healthcare_compliance,
            critical_services_healthy,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(name: &str, status: HealthStatus, uptime: f64) -> ServiceHealth {
        let mut h = ServiceHealth::unknown(name);
        h.status = status;
        h.metrics.uptime_percent = uptime;
        h
    }

    fn dep(name: &str, critical: bool) -> ServiceDependency {
        let d = ServiceDependency::new(name, DependencyType::Api, "http://localhost");
        if critical {
            d.critical()
        } else {
            d
        }
    }

    #[test]
    fn test_latency_classification() {
        let t = LatencyThresholds {
            warning: Duration::from_millis(100),
            critical: Duration::from_millis(300),
        };
        assert_eq!(t.classify(Duration::from_millis(100)), HealthStatus::Healthy);
        assert_eq!(t.classify(Duration::from_millis(250)), HealthStatus::Degraded);
        assert_eq!(t.classify(Duration::from_millis(301)), HealthStatus::Unhealthy);

        let widened = t.for_dependency(false);
        assert_eq!(widened.classify(Duration::from_millis(150)), HealthStatus::Healthy);
        assert_eq!(widened.classify(Duration::from_millis(450)), HealthStatus::Degraded);
        assert_eq!(t.for_dependency(true), t);
    }

    #[test]
    fn test_metrics_running_stats() {
        let mut m = ServiceMetrics::default();
        assert_eq!(m.uptime_percent, 100.0);

        m.record_success(Duration::from_millis(10), 1);
        m.record_success(Duration::from_millis(20), 2);
        m.record_failure(3);
        m.record_success(Duration::from_millis(30), 4);

        assert_eq!(m.total_checks, 4);
        assert!((m.average_response_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(m.min_response_time_ms, Some(10));
        assert_eq!(m.max_response_time_ms, Some(30));
        assert_eq!(m.uptime_percent, 75.0);
        assert_eq!(m.last_failure, Some(3));
        assert_eq!(m.last_success, Some(4));
    }

    #[test]
    fn test_one_unhealthy_critical_breaks_compliance() {
        let status = ComprehensiveHealthStatus::aggregate(
            vec![
                (dep("patient-service", true), health("patient-service", HealthStatus::Unhealthy, 100.0)),
                (dep("records", true), health("records", HealthStatus::Healthy, 100.0)),
                (dep("cache", false), health("cache", HealthStatus::Healthy, 100.0)),
            ],
            0,
            0,
        );
        assert_eq!(status.overall, HealthStatus::Unhealthy);
        assert!(!status.healthcare_compliance);
        assert!(!status.critical_services_healthy);
    }

    #[test]
    fn test_degraded_paths() {
        let degraded_critical = ComprehensiveHealthStatus::aggregate(
            vec![(dep("a", true), health("a", HealthStatus::Degraded, 100.0))],
            0,
            0,
        );
        assert_eq!(degraded_critical.overall, HealthStatus::Degraded);
        assert!(degraded_critical.healthcare_compliance);

        let low_uptime = ComprehensiveHealthStatus::aggregate(
            vec![
                (dep("a", false), health("a", HealthStatus::Healthy, 90.0)),
                (dep("b", false), health("b", HealthStatus::Healthy, 92.0)),
            ],
            0,
            0,
        );
        assert_eq!(low_uptime.overall, HealthStatus::Degraded);

        let very_low = ComprehensiveHealthStatus::aggregate(
            vec![(dep("a", false), health("a", HealthStatus::Unhealthy, 50.0))],
            0,
            0,
        );
        assert_eq!(very_low.overall, HealthStatus::Unhealthy);
        assert!(very_low.healthcare_compliance);
    }

    #[test]
    fn test_empty_is_healthy() {
        let status = ComprehensiveHealthStatus::aggregate(Vec::new(), 0, 0);
        assert_eq!(status.overall, HealthStatus::Healthy);
        assert_eq!(status.average_uptime, 100.0);
        assert!(status.healthcare_compliance && status.critical_services_healthy);
    }

    #[test]
    fn test_dependency_from_toml() {
        let dep: ServiceDependency = toml::from_str(
            r#"
            name = "patient-service"
            type = "api"
            endpoint = "http://patients:8080"
            healthcare_critical = true
            data_sensitivity = "restricted"
            required_for = ["prescriptions"]
            "#,
        )
        .unwrap();
        assert_eq!(dep.kind, DependencyType::Api);
        assert!(dep.healthcare_critical);
        assert_eq!(dep.data_sensitivity, DataClassification::Restricted);
        assert_eq!(dep.required_for, vec!["prescriptions"]);
    }
}
