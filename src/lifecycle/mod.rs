//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to scheduler jobs, admin server, watcher loop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop probes, tear down breakers, stop admin server
//! - Every long-running task subscribes to the same coordinator

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
