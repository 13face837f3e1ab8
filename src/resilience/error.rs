//! Errors surfaced by guarded calls.

use std::time::Duration;
use thiserror::Error;

/// Final outcome of a guarded call that produced no value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BreakerError {
    /// The call was denied. With `healthcare_critical` set the caller must
    /// deny, not substitute data.
    ///
    /// `cause` is `None` when the open circuit rejected the call outright, and
    /// holds the last failure when a fail-secure breaker ran out of attempts.
    #[error("service '{service}' unavailable: {}", .cause.as_deref().unwrap_or("circuit open"))]
    ServiceUnavailable {
        service: String,
        healthcare_critical: bool,
        cause: Option<String>,
    },

    /// The only attempt exceeded the per-attempt deadline.
    #[error("operation timed out after {}ms", .0.as_millis())]
    OperationTimeout(Duration),

    /// Every attempt failed, or the overall deadline passed.
    #[error("retries exhausted after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl BreakerError {
    /// True for denials a caller must not paper over with fallback data.
    pub fn is_fail_secure(&self) -> bool {
        matches!(
            self,
            BreakerError::ServiceUnavailable {
                healthcare_critical: true,
                ..
            }
        )
    }

    /// True when the circuit refused the call without running it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::ServiceUnavailable { cause: None, .. })
    }
}

/// Result type for guarded calls.
pub type BreakerResult<T> = Result<T, BreakerError>;
