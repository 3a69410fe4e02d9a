use std::{
    fs::{File, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    codec::{CsvResultFormatter, ResultFormatter},
    config::PipelineConfig,
    sources::FileIdentity,
    types::AverageResult,
};

use super::{ResultSink, SinkError};

/// Appends results as CSV lines to a single file.
///
/// The file is created if it does not exist. If it is empty before the first
/// write, the formatter's header is written first. Every line is flushed and
/// synced to disk before [ResultSink::sink] returns.
///
/// After a failed write the file handle is dropped and the file is opened
/// again for the next result. The same happens if the file at the path was
/// removed or replaced, e.g. by log rotation.
pub struct CsvFileSink<F = CsvResultFormatter> {
    path: PathBuf,
    formatter: F,
    file: Option<File>,
}

impl CsvFileSink {
    /// Sink writing to the configured output file in the configured time zone
    pub fn from_config(config: &PipelineConfig) -> Self {
        let formatter = if config.utc_output {
            CsvResultFormatter::utc()
        } else {
            CsvResultFormatter::local()
        };
        Self::new(config.output_file.clone(), formatter)
    }
}

impl<F> CsvFileSink<F>
where
    F: ResultFormatter,
{
    pub fn new(path: impl Into<PathBuf>, formatter: F) -> Self {
        Self {
            path: path.into(),
            formatter,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the open handle still refers to the file at the path
    fn is_current(&self, file: &File) -> bool {
        let (Ok(on_disk), Ok(open)) = (std::fs::metadata(&self.path), file.metadata()) else {
            return false;
        };
        match (FileIdentity::of(&on_disk), FileIdentity::of(&open)) {
            (Some(on_disk), Some(open)) => on_disk == open,
            _ => false,
        }
    }

    /// Open the file for appending and write the header if the file is empty
    fn open(&self) -> Result<File, SinkError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })?;
        let len = file
            .metadata()
            .map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })?
            .len();
        if len == 0 {
            write_line(&mut file, self.formatter.header()).map_err(|source| SinkError::Write {
                path: self.path.clone(),
                source,
            })?;
            info!(path = %self.path.display(), "Wrote header to output file");
        }
        Ok(file)
    }
}

fn write_line(file: &mut File, line: &str) -> std::io::Result<()> {
    // a single write call keeps the line intact for concurrent appenders
    file.write_all(format!("{line}\n").as_bytes())?;
    file.flush()?;
    file.sync_data()
}

impl<F> ResultSink for CsvFileSink<F>
where
    F: ResultFormatter,
{
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        let mut file = match self.file.take() {
            Some(file) if self.is_current(&file) => file,
            Some(_) => {
                debug!(path = %self.path.display(), "Output file was moved or removed, reopening it");
                self.open()?
            }
            None => self.open()?,
        };
        let line = self.formatter.format(result);
        write_line(&mut file, &line).map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), %line, "Wrote result");
        self.file = Some(file);
        Ok(())
    }

    fn suspend(&mut self) {
        self.file = None;
    }
}
