//! Health event fan-out.
//!
//! # Responsibilities
//! - Deliver events to registered callbacks, in emission order
//! - Mirror every event onto a broadcast channel for async consumers
//!
//! # Design Decisions
//! - A panicking listener is logged and skipped; remaining listeners and
//!   the checker keep running
//! - Broadcast sends never block; slow subscribers observe `Lagged`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::health::types::HealthStatus;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthEventKind {
    ServiceHealthy,
    ServiceDegraded,
    ServiceUnhealthy,
    /// UNHEALTHY → HEALTHY.
    RecoveryDetected,
    ComplianceViolation,
}

impl HealthEventKind {
    /// Event announcing a flip into `status`.
    pub fn for_status(status: HealthStatus) -> Option<Self> {
        match status {
            HealthStatus::Healthy => Some(HealthEventKind::ServiceHealthy),
            HealthStatus::Degraded => Some(HealthEventKind::ServiceDegraded),
            HealthStatus::Unhealthy => Some(HealthEventKind::ServiceUnhealthy),
            HealthStatus::Unknown => None,
        }
    }
}

impl fmt::Display for HealthEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthEventKind::ServiceHealthy => "SERVICE_HEALTHY",
            HealthEventKind::ServiceDegraded => "SERVICE_DEGRADED",
            HealthEventKind::ServiceUnhealthy => "SERVICE_UNHEALTHY",
            HealthEventKind::RecoveryDetected => "RECOVERY_DETECTED",
            HealthEventKind::ComplianceViolation => "COMPLIANCE_VIOLATION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckEvent {
    pub kind: HealthEventKind,
    pub service: String,
    pub timestamp_ms: u64,
    pub status: HealthStatus,
    pub previous_status: HealthStatus,
    pub healthcare_critical: bool,
    pub details: BTreeMap<String, String>,
}

pub type EventListener = Arc<dyn Fn(&HealthCheckEvent) + Send + Sync>;

pub struct EventBus {
    listeners: RwLock<Vec<EventListener>>,
    tx: broadcast::Sender<HealthCheckEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            tx,
        }
    }

    pub fn add_listener(&self, listener: EventListener) {
        self.listeners
            .write()
            .expect("event listeners lock poisoned")
            .push(listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthCheckEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: HealthCheckEvent) {
        let listeners: Vec<EventListener> = self
            .listeners
            .read()
            .expect("event listeners lock poisoned")
            .clone();

        for listener in listeners {
            let call = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if call.is_err() {
                tracing::error!(event = %event.kind, service = %event.service, "Health event listener panicked");
            }
        }

        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
