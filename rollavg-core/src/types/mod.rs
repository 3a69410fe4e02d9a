//! Types and traits used accross rollavg
mod record;
mod time;

pub use record::{AverageResult, InputRecord};
pub use time::{Clock, ProcessingTime, SystemClock, TimeWindow};

/// Identifies the entity records are grouped by
pub type EntityId = String;
