//! Incident log.
//!
//! # Responsibilities
//! - Record health incidents in time order
//! - Prune entries older than the retention window on insert
//! - Answer "what happened since T" queries
//!
//! # Design Decisions
//! - Severity is derived from the incident kind and the dependency's
//!   criticality, never supplied by the caller
//! - Retention is passed per call so a reloaded config takes effect on
//!   the next insert

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// A probe failed or timed out.
    HealthCheckFailure,
    /// A healthcare-critical dependency became unavailable.
    ComplianceViolation,
    /// A probe succeeded but took longer than the critical threshold.
    ResponseTimeViolation,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentKind::HealthCheckFailure => "HEALTH_CHECK_FAILURE",
            IncidentKind::ComplianceViolation => "COMPLIANCE_VIOLATION",
            IncidentKind::ResponseTimeViolation => "RESPONSE_TIME_VIOLATION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentSeverity {
    pub fn assess(kind: IncidentKind, healthcare_critical: bool) -> Self {
        match (kind, healthcare_critical) {
            (IncidentKind::ComplianceViolation, _) => IncidentSeverity::Critical,
            (IncidentKind::HealthCheckFailure, true) => IncidentSeverity::High,
            (IncidentKind::HealthCheckFailure, false) => IncidentSeverity::Medium,
            (IncidentKind::ResponseTimeViolation, true) => IncidentSeverity::Medium,
            (IncidentKind::ResponseTimeViolation, false) => IncidentSeverity::Low,
        }
    }
}

impl fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentSeverity::Low => "LOW",
            IncidentSeverity::Medium => "MEDIUM",
            IncidentSeverity::High => "HIGH",
            IncidentSeverity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIncident {
    pub id: Uuid,
    pub timestamp_ms: u64,
    pub service: String,
    pub kind: IncidentKind,
    pub severity: IncidentSeverity,
    pub details: String,
}

impl HealthIncident {
    pub fn new(
        service: impl Into<String>,
        kind: IncidentKind,
        healthcare_critical: bool,
        details: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp_ms,
            service: service.into(),
            kind,
            severity: IncidentSeverity::assess(kind, healthcare_critical),
            details: details.into(),
        }
    }
}

/// Time-ordered incident store.
#[derive(Debug, Default)]
pub struct IncidentLog {
    entries: Mutex<VecDeque<HealthIncident>>,
}

impl IncidentLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `incident`, dropping entries older than `retention` relative
    /// to its timestamp.
    pub fn append(&self, incident: HealthIncident, retention: Duration) {
        let cutoff = incident.timestamp_ms.saturating_sub(retention.as_millis() as u64);
        let mut entries = self.lock();
        while entries.front().is_some_and(|i| i.timestamp_ms < cutoff) {
            entries.pop_front();
        }
        entries.push_back(incident);
    }

    /// Incidents with `timestamp_ms >= since_ms`, oldest first.
    pub fn since(&self, since_ms: u64) -> Vec<HealthIncident> {
        self.lock()
            .iter()
            .filter(|i| i.timestamp_ms >= since_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HealthIncident>> {
        self.entries.lock().expect("incident log mutex poisoned")
    }
}
