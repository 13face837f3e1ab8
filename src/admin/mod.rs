//! Admin HTTP API.
//!
//! # Routes
//! ```text
//! GET  /admin/status                 version, liveness
//! GET  /admin/health                 comprehensive status (503 when UNHEALTHY)
//! GET  /admin/services               dependencies with current health
//! GET  /admin/services/{name}        one dependency
//! GET  /admin/incidents?since=<ms>   incidents, default retention window
//! GET  /admin/breakers               breaker metrics
//! POST /admin/breakers/{name}/reset  force a circuit closed
//! ```
//!
//! Every route requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::health::HealthChecker;
use crate::lifecycle::Shutdown;

#[derive(Clone)]
pub struct AdminState {
    pub checker: HealthChecker,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(checker: HealthChecker, api_key: &str) -> Self {
        Self {
            checker,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/services", get(get_services))
        .route("/admin/services/{name}", get(get_service))
        .route("/admin/incidents", get(get_incidents))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve(state: AdminState, listener: TcpListener, shutdown: Shutdown) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
