use std::path::PathBuf;

/// Rolling averages per entity over tumbling windows of CSV files dropped
/// into a directory.
///
/// Every option can also be given as a `ROLLAVG_*` environment variable,
/// options given on the command line take precedence.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory watched for input files
    #[arg(short, long)]
    pub input_dir: Option<PathBuf>,

    /// File results are appended to
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Length of a window in seconds [default: 60]
    #[arg(short, long)]
    pub window_secs: Option<u64>,

    /// Seconds between two scans of the input directory [default: 5]
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Milliseconds between two checks for closed windows [default: 1000]
    #[arg(long)]
    pub fire_interval_ms: Option<u64>,

    /// Number of window store shards [default: 1]
    #[arg(short, long)]
    pub parallelism: Option<u64>,

    /// Emit windows still open on shutdown instead of dropping them, `--flush-on-shutdown=false` turns it off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub flush_on_shutdown: Option<bool>,

    /// Also print every result to stdout, `--stdout=false` turns it off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub stdout: Option<bool>,

    /// Write window ends in UTC instead of local time, `--utc=false` turns it off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub utc: Option<bool>,
}
