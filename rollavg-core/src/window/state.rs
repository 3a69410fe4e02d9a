use serde::{Deserialize, Serialize};

/// Running aggregate of one window.
///
/// A state is only ever created from a first value, so an existing state
/// always has a count of at least one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowState {
    sum: f64,
    count: u64,
}

impl WindowState {
    /// State holding a single value
    pub fn first(amount: f64) -> Self {
        Self {
            sum: amount,
            count: 1,
        }
    }

    /// Add another value to the aggregate
    pub fn fold(&mut self, amount: f64) {
        self.sum += amount;
        self.count += 1;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        // count is never zero, see type docs
        self.sum / self.count as f64
    }
}
