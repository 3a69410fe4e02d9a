use clap::Parser;
use envconfig::Envconfig;
use rollavg::{
    codec::CsvResultFormatter,
    config::ConfigError,
    runtime::{Pipeline, PipelineError},
    sinks::{CsvFileSink, FanOutSink, StdOutSink},
};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod settings;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    main_inner().await.map_err(eyre::Report::new)
}

async fn main_inner() -> Result<(), Error> {
    let args = cli::Cli::parse();
    debug!("Got the following args: {args:?}");
    let env = settings::EnvConfig::init_from_env()?;
    let settings = settings::resolve(args, env)?;
    let config = settings.pipeline;

    let mut sink = FanOutSink::new().with(CsvFileSink::from_config(&config));
    if settings.stdout {
        let formatter = if config.utc_output {
            CsvResultFormatter::utc()
        } else {
            CsvResultFormatter::local()
        };
        sink = sink.with_best_effort(StdOutSink::new(formatter));
    }

    let handle = Pipeline::from_config(&config, sink)?.spawn();
    info!(
        input_dir = %config.input_dir.display(),
        output_file = %config.output_file.display(),
        window = ?config.window_length,
        "Watching for input, stop with ctrl-c"
    );

    tokio::signal::ctrl_c().await.map_err(Error::Signal)?;
    let report = handle.shutdown().await?;
    info!(
        records = report.ingest.folded,
        malformed = report.ingest.malformed,
        results = report.fire.written,
        failed = report.fire.failed,
        "Stopped"
    );
    Ok(())
}

#[derive(Error, Debug)]
enum Error {
    #[error("Invalid environment configuration")]
    Env(#[from] envconfig::Error),
    #[error("Invalid configuration")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Failed to listen for ctrl-c")]
    Signal(#[source] std::io::Error),
}
