//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::health::ServiceDependency;

/// Root configuration for the health monitor.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Health checker settings (intervals, thresholds, breaker presets).
    pub health_check: HealthCheckConfig,

    /// Dependencies to monitor.
    pub services: Vec<ServiceDependency>,

    /// Audit sink selection.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Circuit breaker policy for one guarded dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (within the monitoring period) that open the circuit.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial call is offered.
    pub reset_timeout_ms: u64,

    /// Sliding window in which consecutive failures are counted.
    pub monitoring_period_ms: u64,

    /// Additional attempts after the first one fails.
    pub max_retries: u32,

    /// Base delay before the first retry.
    pub retry_delay_ms: u64,

    /// Growth factor applied to the delay for each further retry.
    pub retry_backoff_multiplier: f64,

    /// Deadline for a single attempt.
    pub request_timeout_ms: u64,

    /// Deadline for the whole attempt + retry sequence.
    pub overall_timeout_ms: u64,

    /// Dependency is safety/compliance critical.
    pub healthcare_critical: bool,

    /// Deny instead of falling back when a critical dependency fails.
    pub fail_secure_mode: bool,

    /// Emit one audit entry per call.
    pub audit_logging: bool,
}

impl CircuitBreakerConfig {
    /// Preset for safety-critical dependencies: trips early, recovers fast,
    /// never substitutes fallback data, audits every call.
    pub fn healthcare_critical() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
            monitoring_period_ms: 60_000,
            max_retries: 2,
            retry_delay_ms: 500,
            retry_backoff_multiplier: 2.0,
            request_timeout_ms: 5_000,
            overall_timeout_ms: 15_000,
            healthcare_critical: true,
            fail_secure_mode: true,
            audit_logging: true,
        }
    }

    /// Preset for ordinary dependencies.
    pub fn standard() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 120_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            retry_backoff_multiplier: 2.0,
            request_timeout_ms: 10_000,
            overall_timeout_ms: 30_000,
            healthcare_critical: false,
            fail_secure_mode: false,
            audit_logging: false,
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Whether an open circuit must deny outright.
    pub fn is_fail_secure(&self) -> bool {
        self.healthcare_critical && self.fail_secure_mode
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Partial breaker settings layered over a preset.
///
/// Lets a config file tweak one field of the critical preset without the
/// rest silently reverting to the standard preset.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub monitoring_period_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub retry_backoff_multiplier: Option<f64>,
    pub request_timeout_ms: Option<u64>,
    pub overall_timeout_ms: Option<u64>,
    pub fail_secure_mode: Option<bool>,
    pub audit_logging: Option<bool>,
}

impl BreakerOverrides {
    /// Apply the set fields on top of `base`.
    pub fn apply(&self, mut base: CircuitBreakerConfig) -> CircuitBreakerConfig {
        if let Some(v) = self.failure_threshold {
            base.failure_threshold = v;
        }
        if let Some(v) = self.reset_timeout_ms {
            base.reset_timeout_ms = v;
        }
        if let Some(v) = self.monitoring_period_ms {
            base.monitoring_period_ms = v;
        }
        if let Some(v) = self.max_retries {
            base.max_retries = v;
        }
        if let Some(v) = self.retry_delay_ms {
            base.retry_delay_ms = v;
        }
        if let Some(v) = self.retry_backoff_multiplier {
            base.retry_backoff_multiplier = v;
        }
        if let Some(v) = self.request_timeout_ms {
            base.request_timeout_ms = v;
        }
        if let Some(v) = self.overall_timeout_ms {
            base.overall_timeout_ms = v;
        }
        if let Some(v) = self.fail_secure_mode {
            base.fail_secure_mode = v;
        }
        if let Some(v) = self.audit_logging {
            base.audit_logging = v;
        }
        base
    }
}

/// Health checker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run recurring probes. When false, probes only run via `check_now`.
    pub enabled: bool,

    /// Interval between probes of the same dependency.
    pub check_interval_ms: u64,

    /// Deadline for a single probe attempt.
    pub probe_timeout_ms: u64,

    /// Retries per probe tick (the next tick is the usual retry).
    pub probe_retries: u32,

    /// Latency above which a critical dependency is DEGRADED.
    pub response_time_warning_ms: u64,

    /// Latency above which a critical dependency is UNHEALTHY.
    pub response_time_critical_ms: u64,

    /// Record compliance violations for critical dependencies.
    pub compliance_validation: bool,

    /// How long incidents stay visible by default.
    pub incident_retention_secs: u64,

    /// Overrides for breakers guarding critical dependencies.
    pub critical_breaker: BreakerOverrides,

    /// Overrides for breakers guarding standard dependencies.
    pub standard_breaker: BreakerOverrides,
}

impl HealthCheckConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn incident_retention(&self) -> Duration {
        Duration::from_secs(self.incident_retention_secs)
    }

    /// Resolved breaker policy for a dependency.
    ///
    /// Probe ticks use the checker's own timeout and retry count.
    pub fn breaker_config(&self, healthcare_critical: bool) -> CircuitBreakerConfig {
        let mut config = if healthcare_critical {
            let mut base = CircuitBreakerConfig::healthcare_critical();
            base.request_timeout_ms = self.probe_timeout_ms;
            base.max_retries = self.probe_retries;
            self.critical_breaker.apply(base)
        } else {
            let mut base = CircuitBreakerConfig::standard();
            base.request_timeout_ms = self.probe_timeout_ms;
            base.max_retries = self.probe_retries;
            self.standard_breaker.apply(base)
        };
        config.healthcare_critical = healthcare_critical;
        config
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_ms: 30_000,
            probe_timeout_ms: 5_000,
            probe_retries: 0,
            response_time_warning_ms: 1_000,
            response_time_critical_ms: 3_000,
            compliance_validation: true,
            incident_retention_secs: 24 * 60 * 60,
            critical_breaker: BreakerOverrides::default(),
            standard_breaker: BreakerOverrides::default(),
        }
    }
}

/// Where audit entries go.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Structured log events on the `audit` target.
    #[default]
    Tracing,
    /// Append-only JSON lines file.
    JsonLines,
}

/// Audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,

    /// File path for the `json_lines` sink.
    pub path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Tracing,
            path: "audit.jsonl".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON logs.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
