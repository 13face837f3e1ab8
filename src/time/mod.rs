//! Time and scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! clock.rs:
//!     Clock::now()          → monotonic instant (breaker windows, timeouts)
//!     Clock::unix_millis()  → wall-clock stamp (events, incidents, audit)
//!
//! scheduler.rs:
//!     spawn_periodic(interval, job) → TaskHandle
//!     TaskHandle::cancel()          → abort timer + in-flight run
//! ```
//!
//! # Design Decisions
//! - Every component takes an `Arc<dyn Clock>` so tests can inject time
//! - The system clock reads tokio's clock, so paused test time applies
//! - One tokio task per recurring job; runs of the same job never overlap

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use scheduler::{Scheduler, TaskHandle};
