use std::sync::Arc;

use itertools::Itertools;

use crate::{
    keyed::WindowKey,
    types::{AverageResult, ProcessingTime},
};

use super::{WindowState, WindowStore};

/// Fires closed windows of a [WindowStore].
///
/// A window moves from open to closed once the processing time reaches its end.
/// Firing a closed window removes its state from the store and turns it into
/// exactly one [AverageResult].
pub struct FiringScheduler {
    store: Arc<WindowStore>,
}

impl FiringScheduler {
    pub fn new(store: Arc<WindowStore>) -> Self {
        Self { store }
    }

    /// Fire all windows closed at `now`.
    /// Results are ordered by window end and entity id.
    pub fn fire(&self, now: ProcessingTime) -> Vec<AverageResult> {
        to_results(self.store.take_closed(now))
    }

    /// Fire every window still holding state, regardless of whether it is closed
    pub fn flush_all(&self) -> Vec<AverageResult> {
        to_results(self.store.drain_all())
    }

    /// Drop every window still holding state, returning how many were dropped
    pub fn discard_all(&self) -> usize {
        self.store.drain_all().len()
    }
}

fn to_results(windows: Vec<(WindowKey, WindowState)>) -> Vec<AverageResult> {
    windows
        .into_iter()
        .sorted_by(|(a, _), (b, _)| {
            a.window
                .end
                .cmp(&b.window.end)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        })
        .map(|(key, state)| AverageResult {
            average_amount: state.average(),
            window_end: key.window.end_datetime(),
            record_count: state.count(),
            entity_id: key.entity_id,
        })
        .collect()
}
