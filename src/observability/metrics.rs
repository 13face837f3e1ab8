//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_requests_total` (counter): calls by breaker, outcome
//! - `breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `breaker_transitions_total` (counter): state changes by breaker, target state
//! - `breaker_retries_total` (counter): attempts beyond the first
//! - `health_check_duration_seconds` (histogram): probe latency per service
//! - `service_health_status` (gauge): 0=healthy, 1=degraded, 2=unhealthy, 3=unknown
//! - `health_incidents_total` (counter): incidents by service, kind

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::health::{HealthStatus, IncidentKind};
use crate::resilience::CircuitState;

/// Install the Prometheus recorder and HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str) {
    metrics::counter!("breaker_requests_total", "breaker" => breaker.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_breaker_retries(breaker: &str, retries: u64) {
    metrics::counter!("breaker_retries_total", "breaker" => breaker.to_string()).increment(retries);
}

pub fn record_breaker_transition(breaker: &str, to: CircuitState) {
    let gauge = match to {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("breaker_state", "breaker" => breaker.to_string()).set(gauge);
    metrics::counter!("breaker_transitions_total", "breaker" => breaker.to_string(), "to" => to.to_string())
        .increment(1);
}

pub fn record_health_check(service: &str, status: HealthStatus, elapsed: Duration) {
    let gauge = match status {
        HealthStatus::Healthy => 0.0,
        HealthStatus::Degraded => 1.0,
        HealthStatus::Unhealthy => 2.0,
        HealthStatus::Unknown => 3.0,
    };
    metrics::gauge!("service_health_status", "service" => service.to_string()).set(gauge);
    metrics::histogram!("health_check_duration_seconds", "service" => service.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_incident(service: &str, kind: IncidentKind) {
    metrics::counter!("health_incidents_total", "service" => service.to_string(), "kind" => kind.to_string())
        .increment(1);
}
