use chrono::{Local, NaiveDateTime, TimeDelta};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock on the local wall-clock timeline monitors run on.
///
/// Anchored to the local time at construction and advanced by a monotonic
/// [`Instant`], so it never runs backwards across clock adjustments.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
    origin: NaiveDateTime,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            origin: Local::now().naive_local(),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        let elapsed = TimeDelta::from_std(self.start.elapsed()).unwrap_or(TimeDelta::zero());
        self.origin + elapsed
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
