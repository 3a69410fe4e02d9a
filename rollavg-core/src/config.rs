//! Configuration of a [Pipeline](crate::runtime::Pipeline).
use std::{path::PathBuf, time::Duration};

use bon::Builder;
use thiserror::Error;

use crate::{types::ProcessingTime, window::ShutdownPolicy};

/// One minute tumbling windows
pub const DEFAULT_WINDOW_LENGTH: Duration = Duration::from_secs(60);
/// The watched directory is scanned every five seconds
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Closed windows are looked for every second
pub const DEFAULT_FIRE_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound of bytes read from one file in one tick
pub const DEFAULT_MAX_READ_BYTES: usize = 8 * 1024 * 1024;

/// First fields identifying a header line of an input file
pub fn default_header_tokens() -> Vec<String> {
    ["profile_id", "entityId", "entity_id"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Everything needed to run a pipeline.
///
/// ```
/// use std::time::Duration;
/// use rollavg::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input_dir("/data/in")
///     .output_file("/data/results.csv")
///     .window_length(Duration::from_secs(30))
///     .build();
/// assert_eq!(config.parallelism, 1);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct PipelineConfig {
    /// Directory watched for input files
    #[builder(into)]
    pub input_dir: PathBuf,
    /// File results are appended to
    #[builder(into)]
    pub output_file: PathBuf,
    #[builder(default = DEFAULT_WINDOW_LENGTH)]
    pub window_length: Duration,
    /// Pause between two scans of the input directory
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub poll_interval: Duration,
    /// Pause between two checks for closed windows
    #[builder(default = DEFAULT_FIRE_INTERVAL)]
    pub fire_interval: Duration,
    /// Number of independently locked shards of the window store
    #[builder(default = 1)]
    pub parallelism: u64,
    #[builder(default)]
    pub shutdown_policy: ShutdownPolicy,
    #[builder(default = DEFAULT_MAX_READ_BYTES)]
    pub max_read_bytes: usize,
    #[builder(default = default_header_tokens())]
    pub header_tokens: Vec<String>,
    /// Write window ends in UTC instead of local time
    #[builder(default)]
    pub utc_output: bool,
}

impl PipelineConfig {
    /// Check the configuration is usable before anything is started
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingInputDir);
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::InputDirNotFound(self.input_dir.clone()));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutputFile);
        }
        if self.output_file.is_dir() {
            return Err(ConfigError::OutputIsDirectory(self.output_file.clone()));
        }
        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::OutputParentNotFound(parent.to_path_buf()));
            }
        }
        let window_millis = self.window_length_millis()?;
        if window_millis <= 0 {
            return Err(ConfigError::InvalidWindowLength(self.window_length));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll"));
        }
        if self.fire_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("fire"));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::ZeroParallelism);
        }
        if self.max_read_bytes == 0 {
            return Err(ConfigError::ZeroReadLimit);
        }
        Ok(())
    }

    /// Window length in milliseconds of processing time
    pub fn window_length_millis(&self) -> Result<ProcessingTime, ConfigError> {
        self.window_length
            .as_millis()
            .try_into()
            .map_err(|_| ConfigError::InvalidWindowLength(self.window_length))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No input directory given")]
    MissingInputDir,
    #[error("Input directory `{}` does not exist or is not a directory", .0.display())]
    InputDirNotFound(PathBuf),
    #[error("No output file given")]
    MissingOutputFile,
    #[error("Output path `{}` is a directory", .0.display())]
    OutputIsDirectory(PathBuf),
    #[error("Parent directory `{}` of the output file does not exist", .0.display())]
    OutputParentNotFound(PathBuf),
    #[error("Window length must be at least one millisecond, got {0:?}")]
    InvalidWindowLength(Duration),
    #[error("The {0} interval must not be zero")]
    ZeroInterval(&'static str),
    #[error("Parallelism must be at least 1")]
    ZeroParallelism,
    #[error("Read limit per tick must not be zero")]
    ZeroReadLimit,
}
