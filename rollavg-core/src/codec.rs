//! Conversion between CSV lines and typed records.
//!
//! Input lines have the form `entityId,amount,timestamp`, results are written
//! as `entityId,averageAmount,windowEnd`. Both timestamps use [TIMESTAMP_FORMAT].
use chrono::{Local, NaiveDateTime, Utc};
use thiserror::Error;

use crate::types::{AverageResult, InputRecord};

/// Pattern of every timestamp read or written, e.g. `2024-01-01 00:00:05`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header line of the output file
pub const OUTPUT_HEADER: &str = "entityId,average_amount,window_end";

/// Turns one raw line into a record
pub trait RecordParser: Send + 'static {
    fn parse(&self, line: &str) -> Result<InputRecord, ParseError>;
}

/// Turns a fired result into one output line, without line break
pub trait ResultFormatter: Send + 'static {
    fn format(&self, result: &AverageResult) -> String;

    /// Line written once at the top of an empty output
    fn header(&self) -> &str;
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Expected 3 fields but found {0}")]
    FieldCount(usize),
    #[error("Entity id is empty")]
    EmptyEntityId,
    #[error("Invalid amount `{0}`")]
    InvalidAmount(String),
    #[error("Amount `{0}` is not a finite number")]
    NonFiniteAmount(String),
    #[error("Invalid timestamp `{0}`, expected format {TIMESTAMP_FORMAT}")]
    InvalidTimestamp(String),
    #[error("Line is not valid UTF-8")]
    Encoding,
}

/// Decode the raw bytes of one line, which must be valid UTF-8
pub fn decode_line(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)
}

/// Parser for comma separated `entityId,amount,timestamp` lines.
/// Fields are trimmed, quoting is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRecordParser;

impl RecordParser for CsvRecordParser {
    fn parse(&self, line: &str) -> Result<InputRecord, ParseError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [entity_id, amount, timestamp] = fields[..] else {
            return Err(ParseError::FieldCount(fields.len()));
        };
        if entity_id.is_empty() {
            return Err(ParseError::EmptyEntityId);
        }
        let amount_value: f64 = amount
            .parse()
            .map_err(|_| ParseError::InvalidAmount(amount.to_owned()))?;
        if !amount_value.is_finite() {
            return Err(ParseError::NonFiniteAmount(amount.to_owned()));
        }
        let event_time = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| ParseError::InvalidTimestamp(timestamp.to_owned()))?;
        Ok(InputRecord::new(entity_id, amount_value, event_time))
    }
}

/// Formats results as `entityId,averageAmount,windowEnd` with two decimal places.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvResultFormatter {
    utc: bool,
}

impl CsvResultFormatter {
    /// Render window ends in the local time zone of the process
    pub fn local() -> Self {
        Self { utc: false }
    }

    /// Render window ends in UTC
    pub fn utc() -> Self {
        Self { utc: true }
    }
}

impl ResultFormatter for CsvResultFormatter {
    fn format(&self, result: &AverageResult) -> String {
        let window_end = if self.utc {
            result
                .window_end
                .with_timezone(&Utc)
                .format(TIMESTAMP_FORMAT)
                .to_string()
        } else {
            result
                .window_end
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string()
        };
        format!(
            "{},{:.2},{}",
            result.entity_id, result.average_amount, window_end
        )
    }

    fn header(&self) -> &str {
        OUTPUT_HEADER
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn parses_valid_line() {
        let record = CsvRecordParser
            .parse("A,10.00,2024-01-01 00:00:05")
            .unwrap();
        assert_eq!(record, InputRecord::new("A", 10.0, ts(0, 0, 5)));
    }

    #[test]
    fn trims_fields() {
        let record = CsvRecordParser
            .parse("  user-7 , 3.5 ,  2024-01-01 13:14:15 ")
            .unwrap();
        assert_eq!(record, InputRecord::new("user-7", 3.5, ts(13, 14, 15)));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            CsvRecordParser.parse("A,10.00"),
            Err(ParseError::FieldCount(2))
        );
        assert_eq!(
            CsvRecordParser.parse("A,10.00,2024-01-01 00:00:00,x"),
            Err(ParseError::FieldCount(4))
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            CsvRecordParser.parse(",1,2024-01-01 00:00:00"),
            Err(ParseError::EmptyEntityId)
        );
        assert_eq!(
            CsvRecordParser.parse("A,ten,2024-01-01 00:00:00"),
            Err(ParseError::InvalidAmount("ten".into()))
        );
        assert_eq!(
            CsvRecordParser.parse("A,NaN,2024-01-01 00:00:00"),
            Err(ParseError::NonFiniteAmount("NaN".into()))
        );
        assert_eq!(
            CsvRecordParser.parse("A,inf,2024-01-01 00:00:00"),
            Err(ParseError::NonFiniteAmount("inf".into()))
        );
        assert_eq!(
            CsvRecordParser.parse("A,1,2024/01/01 00:00:00"),
            Err(ParseError::InvalidTimestamp("2024/01/01 00:00:00".into()))
        );
    }

    #[test]
    fn decodes_utf8_only() {
        assert_eq!(decode_line("Ä,1,2024-01-01 00:00:00".as_bytes()), Ok("Ä,1,2024-01-01 00:00:00"));
        assert_eq!(decode_line(b"A,\xff\xfe,1"), Err(ParseError::Encoding));
    }

    #[test]
    fn formats_with_two_decimals() {
        let result = AverageResult {
            entity_id: "A".into(),
            average_amount: 15.0,
            window_end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap(),
            record_count: 2,
        };
        assert_eq!(
            CsvResultFormatter::utc().format(&result),
            "A,15.00,2024-01-01 00:01:00"
        );

        let result = AverageResult {
            average_amount: 10.0 / 3.0,
            ..result
        };
        assert_eq!(
            CsvResultFormatter::utc().format(&result),
            "A,3.33,2024-01-01 00:01:00"
        );
    }

    #[test]
    fn local_formatter_renders_local_time() {
        let window_end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let result = AverageResult {
            entity_id: "B".into(),
            average_amount: 1.0,
            window_end,
            record_count: 1,
        };
        let expected = format!(
            "B,1.00,{}",
            window_end.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        );
        assert_eq!(CsvResultFormatter::local().format(&result), expected);
        assert_eq!(CsvResultFormatter::local().header(), OUTPUT_HEADER);
    }
}
