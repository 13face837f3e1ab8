//! Injectable time sources.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time used for timeouts, windows and elapsed measurements.
    fn now(&self) -> Instant;

    /// Wall-clock time in milliseconds since the Unix epoch.
    fn unix_millis(&self) -> u64;
}

/// Clock backed by tokio's timer.
///
/// Wall time is anchored once at construction and then derived from the
/// monotonic clock, so `tokio::time::pause`/`advance` move both.
#[derive(Debug, Clone)]
pub struct SystemClock {
    anchor: Instant,
    anchor_unix_ms: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        let anchor_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            anchor: Instant::now(),
            anchor_unix_ms,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.anchor);
        self.anchor_unix_ms + elapsed.as_millis() as u64
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_unix_ms: u64,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock whose wall time starts at `unix_ms`.
    pub fn starting_at(unix_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            base_unix_ms: unix_ms,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().expect("manual clock mutex poisoned");
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().expect("manual clock mutex poisoned")
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01T00:00:00Z
        Self::starting_at(1_704_067_200_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn unix_millis(&self) -> u64 {
        self.base_unix_ms + self.offset().as_millis() as u64
    }
}
