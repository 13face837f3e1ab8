//! Dependency health monitoring.
//!
//! # Data Flow
//! ```text
//! Per-dependency timer (checker.rs)
//!     → Probe through the dependency's circuit breaker (probe.rs)
//!     → Classify latency / failure into HealthStatus (types.rs)
//!     → Record incidents (incidents.rs)
//!     → Emit events on status changes (events.rs)
//!
//! On demand:
//!     get_comprehensive_health_status()
//!     → Aggregate uptime, compliance and critical-service health
//! ```
//!
//! # Design Decisions
//! - Every probe goes through a breaker, so a failing dependency is not
//!   hammered while its circuit is open
//! - Healthcare-critical dependencies get tighter latency thresholds and
//!   fail-secure breakers
//! - Status is UNKNOWN until the first probe completes

pub mod checker;
pub mod events;
pub mod incidents;
pub mod probe;
pub mod types;

pub use checker::{HealthChecker, HealthCheckerBuilder, HealthError};
pub use events::{EventBus, EventListener, HealthCheckEvent, HealthEventKind};
pub use incidents::{HealthIncident, IncidentKind, IncidentLog, IncidentSeverity};
pub use probe::{HealthProbe, HttpProbe, ProbeError, TcpProbe};
pub use types::{
    ComprehensiveHealthStatus, DependencyType, HealthStatus, LatencyThresholds, ServiceDependency, ServiceHealth,
    ServiceMetrics,
};
