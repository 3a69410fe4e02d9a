use tracing::warn;

use crate::types::AverageResult;

use super::{ResultSink, SinkError};

/// Hands every result to several sinks in order.
///
/// All sinks see the result even if an earlier one fails. The first error of
/// a required sink is returned. Sinks added with
/// [FanOutSink::with_best_effort] only log their errors, so a broken console
/// does not mark a result as lost which was written to its durable sinks.
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<Box<dyn ResultSink>>,
    best_effort: Vec<Box<dyn ResultSink>>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add another sink receiving every result
    pub fn with(mut self, sink: impl ResultSink) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Add a sink receiving every result whose failures are only logged
    pub fn with_best_effort(mut self, sink: impl ResultSink) -> Self {
        self.best_effort.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len() + self.best_effort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for FanOutSink {
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.sink(result) {
                first_err.get_or_insert(e);
            }
        }
        for sink in self.best_effort.iter_mut() {
            if let Err(e) = sink.sink(result) {
                warn!(entity_id = %result.entity_id, "Optional sink failed: {e:?}");
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn suspend(&mut self) {
        self.sinks
            .iter_mut()
            .chain(self.best_effort.iter_mut())
            .for_each(|s| s.suspend());
    }
}
