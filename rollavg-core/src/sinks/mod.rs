//! Sinks fired results are written to.
mod csv_file;
mod fan_out;
mod stdout;

use std::path::PathBuf;

use thiserror::Error;

use crate::types::AverageResult;

pub use csv_file::CsvFileSink;
pub use fan_out::FanOutSink;
pub use stdout::StdOutSink;

/// Destination of fired results.
///
/// A sink receives every result exactly once. When `sink` returns `Ok` the
/// result must be durable, an `Err` means the result is lost.
pub trait ResultSink: Send + 'static {
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError>;

    /// Called once when the pipeline stops.
    /// Use this method to clean up any recources like file handles.
    fn suspend(&mut self) {}
}

impl ResultSink for Box<dyn ResultSink> {
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        (**self).sink(result)
    }

    fn suspend(&mut self) {
        (**self).suspend()
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to open output `{}`", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write to output `{}`", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write to stdout")]
    Stdout(#[source] std::io::Error),
    #[error("Sink rejected result: {0}")]
    Rejected(String),
}
