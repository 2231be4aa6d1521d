//! Clocks used for slot deadlines and sample timestamps.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Microseconds in one second.
pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Monotonic clock reporting microseconds elapsed since its creation.
///
/// Slot deadlines are expressed on this clock so that window closing is
/// driven by processing time and is immune to wall-clock jumps.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose zero point is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Returns the microseconds elapsed since the clock was created.
    #[allow(clippy::cast_possible_truncation)]
    pub fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current wall-clock time in microseconds since the unix epoch.
///
/// A clock set before the epoch reads as zero.
#[allow(clippy::cast_possible_truncation)]
pub fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
