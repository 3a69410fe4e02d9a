use std::sync::Arc;

use tracing::{error, info};

use crate::{
    sinks::ResultSink,
    types::{AverageResult, Clock},
    window::{FiringScheduler, ShutdownPolicy},
};

/// Counters of one or more firing ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireStats {
    /// Windows fired, including flushed ones
    pub fired: u64,
    /// Results the sink accepted
    pub written: u64,
    /// Results the sink failed to write
    pub failed: u64,
    /// Open windows dropped on shutdown
    pub discarded: u64,
}

impl FireStats {
    pub(crate) fn merge(&mut self, other: FireStats) {
        self.fired += other.fired;
        self.written += other.written;
        self.failed += other.failed;
        self.discarded += other.discarded;
    }
}

/// Fires closed windows and hands the results to the sink
pub(crate) struct Firer<S, C> {
    pub(crate) scheduler: FiringScheduler,
    pub(crate) sink: S,
    pub(crate) clock: Arc<C>,
}

impl<S, C> Firer<S, C>
where
    S: ResultSink,
    C: Clock,
{
    pub(crate) fn tick(&mut self) -> FireStats {
        let results = self.scheduler.fire(self.clock.now());
        self.emit(results)
    }

    /// Apply the shutdown policy to all windows still open and release the sink
    pub(crate) fn finish(&mut self, policy: ShutdownPolicy) -> FireStats {
        let stats = match policy {
            ShutdownPolicy::FlushOpen => {
                let results = self.scheduler.flush_all();
                info!(windows = results.len(), "Flushing open windows");
                self.emit(results)
            }
            ShutdownPolicy::DiscardOpen => {
                let discarded = self.scheduler.discard_all() as u64;
                if discarded > 0 {
                    info!(windows = discarded, "Discarding open windows");
                }
                FireStats {
                    discarded,
                    ..Default::default()
                }
            }
        };
        self.sink.suspend();
        stats
    }

    fn emit(&mut self, results: Vec<AverageResult>) -> FireStats {
        let mut stats = FireStats::default();
        for result in results {
            stats.fired += 1;
            match self.sink.sink(&result) {
                Ok(()) => {
                    stats.written += 1;
                    info!(
                        entity_id = %result.entity_id,
                        average = result.average_amount,
                        records = result.record_count,
                        window_end = %result.window_end,
                        "Emitted result"
                    );
                }
                Err(e) => {
                    // no retry, the result is lost
                    stats.failed += 1;
                    error!(
                        entity_id = %result.entity_id,
                        window_end = %result.window_end,
                        "Dropping result, sink failed: {e:?}"
                    );
                }
            }
        }
        stats
    }
}
