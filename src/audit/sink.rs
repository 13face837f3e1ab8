//! Audit entry sinks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::audit::classification::DataClassification;
use crate::audit::context::RequestContext;
use crate::resilience::CircuitState;

/// How a guarded call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// A fallback value was returned instead of the operation's result.
    Fallback,
    /// The circuit refused the call without running it.
    Rejected,
    Failed,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Fallback => "fallback",
            AuditOutcome::Rejected => "rejected",
            AuditOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One audited call through a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp_ms: u64,
    pub breaker: String,
    pub context: RequestContext,
    pub classification: DataClassification,
    /// Circuit state after the call was settled.
    pub circuit_state: CircuitState,
    pub outcome: AuditOutcome,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Writes entries as structured `tracing` events on the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            breaker = %entry.breaker,
            request_id = %entry.context.request_id,
            service = %entry.context.service_name,
            endpoint = %entry.context.endpoint,
            method = %entry.context.method,
            user_id = entry.context.user_id.as_deref().unwrap_or("-"),
            classification = %entry.classification,
            circuit_state = %entry.circuit_state,
            outcome = %entry.outcome,
            attempts = entry.attempts,
            duration_ms = entry.duration_ms,
            error = entry.error.as_deref().unwrap_or("-"),
            "Guarded call audited"
        );
    }
}

/// Appends entries to a file, one JSON object per line.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesAuditSink {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = ?path, "Audit log opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_entry(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().expect("audit writer mutex poisoned");
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.write_entry(&entry) {
            tracing::error!(path = ?self.path, error = %e, "Failed to write audit entry");
        }
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit memory mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("audit memory mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().expect("audit memory mutex poisoned").push(entry);
    }
}
