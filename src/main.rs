//! health-guard daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   health-guard.toml ──▶ config ──────────────┐ (watcher: hot reload)
//!                                              ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ HealthChecker                                                │
//!   │   per-service timer (time::Scheduler)                        │
//!   │     → CircuitBreaker (resilience) → HealthProbe (HTTP / TCP) │──▶ dependencies
//!   │     → ServiceHealth, incidents, events                       │
//!   └──────────────────────────────────────────────────────────────┘
//!        │                    │                       │
//!        ▼                    ▼                       ▼
//!   admin API (axum)     audit sink             tracing + Prometheus
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use health_guard::admin::{self, AdminState};
use health_guard::audit::{AuditSink, JsonLinesAuditSink, TracingAuditSink};
use health_guard::config::{apply_reload, load_config, AuditSinkKind, ConfigWatcher};
use health_guard::health::{HealthChecker, HealthEventKind};
use health_guard::lifecycle::{signals, Shutdown};
use health_guard::observability::{logging, metrics};
use health_guard::time::Scheduler;

#[derive(Parser)]
#[command(name = "health-guard", version, about = "Dependency health monitor with circuit breakers")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "health-guard.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "health-guard starting");

    if args.check {
        tracing::info!(services = config.services.len(), "Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    let audit: Arc<dyn AuditSink> = match config.audit.sink {
        AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
        AuditSinkKind::JsonLines => Arc::new(JsonLinesAuditSink::open(&config.audit.path)?),
    };

    let checker = HealthChecker::builder(config.health_check.clone())
        .audit_sink(audit)
        .scheduler(Scheduler::with_shutdown(shutdown.clone()))
        .build();

    checker.on_event(|event| match event.kind {
        HealthEventKind::ComplianceViolation => {
            tracing::error!(service = %event.service, status = %event.status, "Compliance violation")
        }
        kind => tracing::info!(service = %event.service, event = %kind, status = %event.status, "Health event"),
    });

    for service in &config.services {
        checker.register_service(service.clone())?;
    }
    tracing::info!(
        services = config.services.len(),
        interval_ms = config.health_check.check_interval_ms,
        "Health monitoring started"
    );

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(checker.clone(), &config.admin.api_key);
        Some(tokio::spawn(admin::serve(state, listener, shutdown.clone())))
    } else {
        None
    };

    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload unavailable");
            None
        }
    };

    tokio::spawn(signals::wait_for_termination(shutdown.clone()));

    let mut shutdown_rx = shutdown.subscribe();
    let mut current = config;
    loop {
        tokio::select! {
            Some(next) = updates.recv() => {
                apply_reload(&checker, &current, &next);
                current = next;
                tracing::info!(services = current.services.len(), "Configuration reloaded");
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    tracing::info!("Shutting down");
    checker.destroy();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
