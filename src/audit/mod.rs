//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! Caller builds RequestContext (context.rs)
//!     → classification.rs tags it public / confidential / restricted
//!     → CircuitBreaker::execute finishes
//!     → AuditEntry { context, classification, state, outcome }
//!     → sink.rs (tracing, JSON lines file, memory)
//! ```
//!
//! # Design Decisions
//! - Classification annotates entries only; it never affects allow/deny
//! - Identifiers in the context are recorded, never inspected
//! - Sinks swallow their own I/O errors (logged) so auditing cannot fail a call

pub mod classification;
pub mod context;
pub mod sink;

pub use classification::{classify, DataClassification};
pub use context::RequestContext;
pub use sink::{AuditEntry, AuditOutcome, AuditSink, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};
