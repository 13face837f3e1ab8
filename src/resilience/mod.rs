//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! CircuitBreaker::execute(op, ctx):
//!     → admission (Closed: pass, Open: reject until reset timeout,
//!                  HalfOpen: exactly one trial)
//!     → attempt under request timeout
//!     → On failure: backoff.rs delay, retry until max_retries / overall timeout
//!     → record success/failure → state transition
//!     → fallback or fail-secure denial
//!     → audit entry
//!
//! registry.rs: one breaker per dependency name for the process lifetime
//! ```
//!
//! # Design Decisions
//! - Open→HalfOpen is evaluated lazily on the next call; no timer per breaker
//! - Fail-secure critical breakers never substitute fallback data
//! - Only the final outcome of a retry sequence is surfaced to the caller

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod registry;

pub use crate::config::schema::CircuitBreakerConfig;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use error::{BreakerError, BreakerResult};
pub use registry::CircuitBreakerRegistry;
