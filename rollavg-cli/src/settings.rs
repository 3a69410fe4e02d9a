use std::{path::PathBuf, time::Duration};

use envconfig::Envconfig;
use rollavg::{
    config::{ConfigError, PipelineConfig},
    window::ShutdownPolicy,
};

use crate::cli::Cli;

#[derive(Envconfig, Debug)]
pub(crate) struct EnvConfig {
    /// Directory watched for input files
    #[envconfig(from = "ROLLAVG_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// File results are appended to
    #[envconfig(from = "ROLLAVG_OUTPUT_FILE")]
    pub output_file: Option<PathBuf>,

    #[envconfig(from = "ROLLAVG_WINDOW_SECS", default = "60")]
    pub window_secs: u64,

    #[envconfig(from = "ROLLAVG_POLL_INTERVAL_SECS", default = "5")]
    pub poll_interval_secs: u64,

    #[envconfig(from = "ROLLAVG_FIRE_INTERVAL_MS", default = "1000")]
    pub fire_interval_ms: u64,

    #[envconfig(from = "ROLLAVG_PARALLELISM", default = "1")]
    pub parallelism: u64,

    #[envconfig(from = "ROLLAVG_FLUSH_ON_SHUTDOWN", default = "false")]
    pub flush_on_shutdown: bool,

    /// Also print every result to stdout
    #[envconfig(from = "ROLLAVG_STDOUT", default = "false")]
    pub stdout: bool,

    #[envconfig(from = "ROLLAVG_UTC", default = "false")]
    pub utc: bool,
}

/// Everything the binary needs to start
#[derive(Debug)]
pub(crate) struct Settings {
    pub pipeline: PipelineConfig,
    pub stdout: bool,
}

/// Merge command line arguments over environment values
pub(crate) fn resolve(args: Cli, env: EnvConfig) -> Result<Settings, ConfigError> {
    let input_dir = args
        .input_dir
        .or(env.input_dir)
        .ok_or(ConfigError::MissingInputDir)?;
    let output_file = args
        .output_file
        .or(env.output_file)
        .ok_or(ConfigError::MissingOutputFile)?;
    let shutdown_policy = if args.flush_on_shutdown.unwrap_or(env.flush_on_shutdown) {
        ShutdownPolicy::FlushOpen
    } else {
        ShutdownPolicy::DiscardOpen
    };

    let pipeline = PipelineConfig::builder()
        .input_dir(input_dir)
        .output_file(output_file)
        .window_length(Duration::from_secs(
            args.window_secs.unwrap_or(env.window_secs),
        ))
        .poll_interval(Duration::from_secs(
            args.poll_interval_secs.unwrap_or(env.poll_interval_secs),
        ))
        .fire_interval(Duration::from_millis(
            args.fire_interval_ms.unwrap_or(env.fire_interval_ms),
        ))
        .parallelism(args.parallelism.unwrap_or(env.parallelism))
        .shutdown_policy(shutdown_policy)
        .utc_output(args.utc.unwrap_or(env.utc))
        .build();
    Ok(Settings {
        pipeline,
        stdout: args.stdout.unwrap_or(env.stdout),
    })
}
