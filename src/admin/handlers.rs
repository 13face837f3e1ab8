use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::health::{ComprehensiveHealthStatus, HealthIncident, HealthStatus, ServiceDependency, ServiceHealth};
use crate::resilience::CircuitBreakerMetrics;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub dependency: ServiceDependency,
    pub health: ServiceHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub name: String,
    pub metrics: CircuitBreakerMetrics,
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    /// Unix milliseconds; defaults to the retention window.
    pub since: Option<u64>,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

/// 503 while the overall status is UNHEALTHY, so load balancers can act on it.
pub async fn get_health(State(state): State<AdminState>) -> (StatusCode, Json<ComprehensiveHealthStatus>) {
    let status = state.checker.get_comprehensive_health_status();
    let code = if status.overall == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    let services = state
        .checker
        .dependencies()
        .into_iter()
        .filter_map(|dependency| {
            let health = state.checker.get_service_health(&dependency.name)?;
            Some(ServiceStatus { dependency, health })
        })
        .collect();
    Json(services)
}

pub async fn get_service(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceStatus>, StatusCode> {
    let dependency = state
        .checker
        .dependencies()
        .into_iter()
        .find(|d| d.name == name)
        .ok_or(StatusCode::NOT_FOUND)?;
    let health = state.checker.get_service_health(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ServiceStatus { dependency, health }))
}

pub async fn get_incidents(
    State(state): State<AdminState>,
    Query(query): Query<IncidentQuery>,
) -> Json<Vec<HealthIncident>> {
    Json(state.checker.get_incidents(query.since))
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerStatus>> {
    let breakers = state
        .checker
        .breaker_snapshot()
        .into_iter()
        .map(|(name, metrics)| BreakerStatus { name, metrics })
        .collect();
    Json(breakers)
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, StatusCode> {
    let breaker = state.checker.breaker(&name).ok_or(StatusCode::NOT_FOUND)?;
    breaker.force_reset();
    tracing::warn!(breaker = %name, "Circuit breaker reset via admin API");
    Ok(Json(BreakerStatus {
        name,
        metrics: breaker.metrics(),
    }))
}
