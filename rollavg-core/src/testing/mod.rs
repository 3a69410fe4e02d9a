//! Helpers for testing pipelines deterministically.
use std::{
    ops::RangeBounds,
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    sinks::{ResultSink, SinkError},
    types::{AverageResult, Clock, ProcessingTime},
};

/// A Helper to write results into a shared vector and take them out
/// again.
/// This struct uses an Arc<Mutex<Vec<T>> internally, so it can be freely
/// cloned
#[derive(Clone)]
pub struct VecSink<T = AverageResult> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        VecSink {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Put a value into this sink
    pub fn give(&self, value: T) {
        self.lock().push(value)
    }

    /// Take the given range out of this sink
    pub fn drain_vec<R: RangeBounds<usize>>(&self, range: R) -> Vec<T> {
        self.lock().drain(range).collect()
    }

    /// Returns the len of the contained vec
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> IntoIterator for VecSink<T> {
    type Item = T;

    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.drain_vec(..).into_iter()
    }
}

impl ResultSink for VecSink<AverageResult> {
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        self.give(result.clone());
        Ok(())
    }
}

/// A sink rejecting every result, counting the attempts
#[derive(Clone, Default)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    /// How often `sink` was called
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ResultSink for FailingSink {
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected(result.entity_id.clone()))
    }
}

/// A clock which only moves when told to.
/// Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: ProcessingTime) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, t: ProcessingTime) {
        self.now.store(t, Ordering::SeqCst);
    }

    pub fn advance(&self, by: ProcessingTime) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ProcessingTime {
        self.now.load(Ordering::SeqCst)
    }
}
