//! Types and traits specific to processing time keeping.
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch as observed by the process
pub type ProcessingTime = i64;

/// Source of processing time.
///
/// Both periodic loops of a pipeline read the same clock, so window assignment
/// and window firing agree on what "now" is.
pub trait Clock: Send + Sync + 'static {
    /// Current processing time
    fn now(&self) -> ProcessingTime;
}

/// Clock reading the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ProcessingTime {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis().try_into().unwrap_or(ProcessingTime::MAX),
            // clock set before 1970, report a negative offset
            Err(e) => {
                let behind: ProcessingTime =
                    e.duration().as_millis().try_into().unwrap_or(ProcessingTime::MAX);
                -behind
            }
        }
    }
}

/// Half open interval `[start, end)` of processing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: ProcessingTime,
    pub end: ProcessingTime,
}

impl TimeWindow {
    pub fn new(start: ProcessingTime, end: ProcessingTime) -> Self {
        debug_assert!(start < end, "window must not be empty");
        Self { start, end }
    }

    /// Whether `t` lies within this window
    pub fn contains(&self, t: ProcessingTime) -> bool {
        self.start <= t && t < self.end
    }

    /// A window is closed once the clock reached its end
    pub fn is_closed_at(&self, now: ProcessingTime) -> bool {
        self.end <= now
    }

    /// End of the window as a UTC date time
    pub fn end_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.end).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
