//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based):
/// `base × multiplier^attempt`, plus up to 10% jitter, capped at `max`.
///
/// The jitter only ever lengthens the delay, so the result is never shorter
/// than the plain exponential value (unless capped).
pub fn calculate_backoff(attempt: u32, base: Duration, multiplier: f64, max: Duration) -> Duration {
    let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = (base.as_millis() as f64 * multiplier.powi(exponent)).min(max.as_millis() as f64);
    let delay_ms = delay_ms as u64;

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter)).min(max)
}
