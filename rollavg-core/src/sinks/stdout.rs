use std::io::Write as _;

use crate::{
    codec::{CsvResultFormatter, ResultFormatter},
    types::AverageResult,
};

use super::{ResultSink, SinkError};

/// Prints every result as a formatted line to stdout
pub struct StdOutSink<F = CsvResultFormatter> {
    formatter: F,
}

impl<F> StdOutSink<F> {
    pub fn new(formatter: F) -> Self {
        Self { formatter }
    }
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self::new(CsvResultFormatter::local())
    }
}

impl<F> ResultSink for StdOutSink<F>
where
    F: ResultFormatter,
{
    fn sink(&mut self, result: &AverageResult) -> Result<(), SinkError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", self.formatter.format(result)).map_err(SinkError::Stdout)?;
        stdout.flush().map_err(SinkError::Stdout)
    }
}
