//! Drives ingestion and window firing as two periodic tokio tasks.
//!
//! ```no_run
//! use rollavg::{config::PipelineConfig, runtime::Pipeline, testing::VecSink};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::builder()
//!     .input_dir("/data/in")
//!     .output_file("/data/results.csv")
//!     .build();
//! let sink: VecSink = VecSink::new();
//! let handle = Pipeline::from_config(&config, sink)?.spawn();
//! tokio::time::sleep(std::time::Duration::from_secs(600)).await;
//! let report = handle.shutdown().await?;
//! println!("{report:?}");
//! # Ok(())
//! # }
//! ```
mod fire;
mod ingest;

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{debug, info};

use crate::{
    codec::{CsvRecordParser, RecordParser},
    config::{ConfigError, PipelineConfig},
    keyed::TumblingWindows,
    sinks::ResultSink,
    sources::DirectorySource,
    types::{Clock, SystemClock},
    window::{FiringScheduler, ShutdownPolicy, WindowStore},
};

pub use fire::FireStats;
pub use ingest::IngestStats;

use fire::Firer;
use ingest::Ingestor;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("The {task} task failed")]
    Join {
        task: &'static str,
        #[source]
        source: JoinError,
    },
}

/// Totals of a pipeline run, returned on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub ingest: IngestStats,
    pub fire: FireStats,
}

/// A configured, not yet running pipeline.
///
/// [Pipeline::spawn] starts it on the current tokio runtime. For
/// deterministic tests the ticks can also be driven by hand with
/// [Pipeline::ingest_tick] and [Pipeline::fire_tick].
pub struct Pipeline<S, P = CsvRecordParser, C = SystemClock> {
    ingestor: Ingestor<P, C>,
    firer: Firer<S, C>,
    store: Arc<WindowStore>,
    poll_interval: Duration,
    fire_interval: Duration,
    shutdown_policy: ShutdownPolicy,
}

impl<S> Pipeline<S>
where
    S: ResultSink,
{
    /// Validate the config and build a pipeline reading CSV with the system clock
    pub fn from_config(config: &PipelineConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let assigner = TumblingWindows::new(config.window_length_millis()?);
        let store = Arc::new(WindowStore::new(assigner, config.parallelism as usize));
        let clock = Arc::new(SystemClock);
        let source = DirectorySource::builder()
            .dir(config.input_dir.clone())
            .max_read_bytes(config.max_read_bytes)
            .header_tokens(config.header_tokens.clone())
            .build();
        Ok(Self {
            ingestor: Ingestor {
                source,
                parser: CsvRecordParser,
                store: Arc::clone(&store),
                clock: Arc::clone(&clock),
            },
            firer: Firer {
                scheduler: FiringScheduler::new(Arc::clone(&store)),
                sink,
                clock,
            },
            store,
            poll_interval: config.poll_interval,
            fire_interval: config.fire_interval,
            shutdown_policy: config.shutdown_policy,
        })
    }
}

impl<S, P, C> Pipeline<S, P, C> {
    /// Use another clock to decide window membership and firing
    pub fn with_clock<C2>(self, clock: C2) -> Pipeline<S, P, C2> {
        let clock = Arc::new(clock);
        Pipeline {
            ingestor: Ingestor {
                source: self.ingestor.source,
                parser: self.ingestor.parser,
                store: self.ingestor.store,
                clock: Arc::clone(&clock),
            },
            firer: Firer {
                scheduler: self.firer.scheduler,
                sink: self.firer.sink,
                clock,
            },
            store: self.store,
            poll_interval: self.poll_interval,
            fire_interval: self.fire_interval,
            shutdown_policy: self.shutdown_policy,
        }
    }

    /// Use another parser for input lines
    pub fn with_parser<P2>(self, parser: P2) -> Pipeline<S, P2, C> {
        Pipeline {
            ingestor: Ingestor {
                source: self.ingestor.source,
                parser,
                store: self.ingestor.store,
                clock: self.ingestor.clock,
            },
            firer: self.firer,
            store: self.store,
            poll_interval: self.poll_interval,
            fire_interval: self.fire_interval,
            shutdown_policy: self.shutdown_policy,
        }
    }

    /// The window state shared by both loops
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }
}

impl<S, P, C> Pipeline<S, P, C>
where
    S: ResultSink,
    P: RecordParser,
    C: Clock,
{
    /// Run one ingestion tick on the calling thread
    pub fn ingest_tick(&mut self) -> IngestStats {
        self.ingestor.tick()
    }

    /// Run one firing tick on the calling thread
    pub fn fire_tick(&mut self) -> FireStats {
        self.firer.tick()
    }

    /// Apply the shutdown policy without running the loops
    pub fn finish(mut self) -> FireStats {
        self.firer.finish(self.shutdown_policy)
    }

    /// Start both loops on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside of a tokio runtime
    pub fn spawn(self) -> PipelineHandle {
        let (ingest_stop, ingest_rx) = watch::channel(false);
        let (fire_stop, fire_rx) = watch::channel(false);
        info!(
            poll_interval = ?self.poll_interval,
            fire_interval = ?self.fire_interval,
            shards = self.store.shard_count(),
            window_millis = self.store.assigner().size(),
            "Starting pipeline"
        );
        let ingest = tokio::spawn(ingest_loop(self.ingestor, self.poll_interval, ingest_rx));
        let fire = tokio::spawn(fire_loop(
            self.firer,
            self.fire_interval,
            self.shutdown_policy,
            fire_rx,
        ));
        PipelineHandle {
            ingest_stop,
            fire_stop,
            ingest,
            fire,
            store: self.store,
        }
    }
}

/// Handle to a running pipeline
pub struct PipelineHandle {
    ingest_stop: watch::Sender<bool>,
    fire_stop: watch::Sender<bool>,
    ingest: JoinHandle<Result<IngestStats, PipelineError>>,
    fire: JoinHandle<Result<FireStats, PipelineError>>,
    store: Arc<WindowStore>,
}

impl PipelineHandle {
    pub fn store(&self) -> &Arc<WindowStore> {
        &self.store
    }

    /// Stop the pipeline.
    ///
    /// Ingestion stops first, so no record is folded after the shutdown
    /// policy has been applied. A tick in progress is completed.
    pub async fn shutdown(self) -> Result<PipelineReport, PipelineError> {
        info!("Shutting down pipeline");
        // an error means the loop is gone already, joining tells us why
        let _ = self.ingest_stop.send(true);
        let ingest = joined("ingestion", self.ingest.await);
        let _ = self.fire_stop.send(true);
        let fire = joined("firing", self.fire.await);
        let report = PipelineReport {
            ingest: ingest?,
            fire: fire?,
        };
        info!(?report, "Pipeline stopped");
        Ok(report)
    }
}

fn joined<T>(
    task: &'static str,
    result: Result<Result<T, PipelineError>, JoinError>,
) -> Result<T, PipelineError> {
    result.map_err(|source| PipelineError::Join { task, source })?
}

/// Resolves once a stop was requested or the handle is gone
async fn stopped(rx: &mut watch::Receiver<bool>) {
    // Err means the sender was dropped, which also means stop
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn ingest_loop<P, C>(
    ingestor: Ingestor<P, C>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> Result<IngestStats, PipelineError>
where
    P: RecordParser,
    C: Clock,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ingestor = ingestor;
    let mut total = IngestStats::default();
    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            _ = ticker.tick() => {}
        }
        let (returned, stats) = tokio::task::spawn_blocking(move || {
            let stats = ingestor.tick();
            (ingestor, stats)
        })
        .await
        .map_err(|source| PipelineError::Join {
            task: "ingestion tick",
            source,
        })?;
        ingestor = returned;
        if stats != IngestStats::default() {
            debug!(?stats, "Ingestion tick");
        }
        total.merge(stats);
    }
    debug!("Ingestion loop stopped");
    Ok(total)
}

async fn fire_loop<S, C>(
    firer: Firer<S, C>,
    interval: Duration,
    policy: ShutdownPolicy,
    mut stop: watch::Receiver<bool>,
) -> Result<FireStats, PipelineError>
where
    S: ResultSink,
    C: Clock,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut firer = firer;
    let mut total = FireStats::default();
    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            _ = ticker.tick() => {}
        }
        let (returned, stats) = tokio::task::spawn_blocking(move || {
            let stats = firer.tick();
            (firer, stats)
        })
        .await
        .map_err(|source| PipelineError::Join {
            task: "firing tick",
            source,
        })?;
        firer = returned;
        total.merge(stats);
    }
    let stats = tokio::task::spawn_blocking(move || firer.finish(policy))
        .await
        .map_err(|source| PipelineError::Join {
            task: "shutdown",
            source,
        })?;
    total.merge(stats);
    debug!("Firing loop stopped");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::{io::Write as _, path::Path};

    use super::*;
    use crate::{
        testing::{FailingSink, ManualClock, VecSink},
        types::AverageResult,
    };

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    /// Config reading from `dir/in`, created here
    fn config(dir: &Path) -> PipelineConfig {
        let input = dir.join("in");
        std::fs::create_dir_all(&input).unwrap();
        PipelineConfig::builder()
            .input_dir(input)
            .output_file(dir.join("out.csv"))
            .window_length(Duration::from_secs(60))
            .poll_interval(Duration::from_millis(10))
            .fire_interval(Duration::from_millis(10))
            .build()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.parallelism = 0;
        assert!(matches!(
            Pipeline::from_config(&config, VecSink::<AverageResult>::new()),
            Err(ConfigError::ZeroParallelism)
        ));
    }

    #[test]
    fn manual_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let input = config.input_dir.clone();

        let clock = ManualClock::new(0);
        let sink: VecSink = VecSink::new();
        let mut pipeline = Pipeline::from_config(&config, sink.clone())
            .unwrap()
            .with_clock(clock.clone());

        append(&input.join("a.csv"), "A,1,2024-01-01 00:00:00\nbogus\n");
        let stats = pipeline.ingest_tick();
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.folded, 1);
        assert_eq!(stats.malformed, 1);

        assert_eq!(pipeline.fire_tick(), FireStats::default());
        clock.set(60_000);
        let stats = pipeline.fire_tick();
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.written, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn failing_sink_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(0);
        let sink = FailingSink::default();
        let mut pipeline = Pipeline::from_config(&config(dir.path()), sink.clone())
            .unwrap()
            .with_clock(clock.clone());
        append(&dir.path().join("in/a.csv"), "A,1,2024-01-01 00:00:00\n");
        pipeline.ingest_tick();
        clock.set(60_000);
        let stats = pipeline.fire_tick();
        assert_eq!(stats.failed, 1);
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawned_pipeline_shuts_down() {
        let dir = tempfile::tempdir().unwrap();
        let handle = Pipeline::from_config(&config(dir.path()), VecSink::<AverageResult>::new())
            .unwrap()
            .with_clock(ManualClock::new(0))
            .spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = handle.shutdown().await.unwrap();
        assert_eq!(report, PipelineReport::default());
    }
}
