use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// A single parsed line of input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Key the record is aggregated by, never empty
    pub entity_id: EntityId,
    /// Always a finite number
    pub amount: f64,
    /// Timestamp carried by the record itself. It is not used for windowing,
    /// windows are assigned by the time of ingestion.
    pub event_time: NaiveDateTime,
}

impl InputRecord {
    pub fn new(entity_id: impl Into<EntityId>, amount: f64, event_time: NaiveDateTime) -> Self {
        Self {
            entity_id: entity_id.into(),
            amount,
            event_time,
        }
    }
}

/// The average amount of one entity over one fired window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageResult {
    pub entity_id: EntityId,
    pub average_amount: f64,
    pub window_end: DateTime<Utc>,
    /// Number of records folded into the window
    pub record_count: u64,
}
