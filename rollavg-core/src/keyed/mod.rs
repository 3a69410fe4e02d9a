//! Keying records by entity and assigning them to tumbling windows.
pub mod partitioners;

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, ProcessingTime, TimeWindow};

/// Identifies the state of one entity within one window
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub entity_id: EntityId,
    pub window: TimeWindow,
}

impl WindowKey {
    pub fn new(entity_id: impl Into<EntityId>, window: TimeWindow) -> Self {
        Self {
            entity_id: entity_id.into(),
            window,
        }
    }
}

/// Assigns processing times to contiguous, non overlapping windows of a fixed size.
///
/// Windows are aligned to the UNIX epoch, i.e. every window starts at a multiple
/// of the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TumblingWindows {
    size: ProcessingTime,
}

impl TumblingWindows {
    /// **PANIC:** if size is not positive
    pub fn new(size: ProcessingTime) -> Self {
        assert!(size > 0, "Window size must be positive");
        Self { size }
    }

    pub fn size(&self) -> ProcessingTime {
        self.size
    }

    /// The window containing `t`
    pub fn assign(&self, t: ProcessingTime) -> TimeWindow {
        let start = t.div_euclid(self.size) * self.size;
        TimeWindow::new(start, start + self.size)
    }

    /// Key of the window an entity's record arriving at `t` is folded into
    pub fn assign_key(&self, entity_id: &str, t: ProcessingTime) -> WindowKey {
        WindowKey::new(entity_id, self.assign(t))
    }
}
