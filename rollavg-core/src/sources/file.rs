use std::{
    collections::VecDeque,
    fs::{File, Metadata},
    io::{Read as _, Seek as _, SeekFrom},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::IngestError;

/// How much of a file has already been handed downstream.
/// A cursor only ever moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    pub path: PathBuf,
    /// Bytes of complete lines handed downstream
    pub bytes_consumed: u64,
    /// Number of complete lines handed downstream
    pub lines_consumed: u64,
}

impl IngestionCursor {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            bytes_consumed: 0,
            lines_consumed: 0,
        }
    }
}

/// A complete line read from a file, without its line break
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawLine {
    /// 1 based line number within the file
    pub line_no: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct BufferedLine {
    bytes: Vec<u8>,
    /// File offset right after the line break of this line
    end_offset: u64,
}

/// Reads the unread suffix of a single file line by line.
///
/// The file is read at most once per tick, see [FileSourcePartition::arm].
/// Only lines terminated by a line break are handed out, a trailing partial
/// line stays in the file until it is completed.
#[derive(Debug)]
pub struct FileSourcePartition {
    cursor: IngestionCursor,
    buffered: VecDeque<BufferedLine>,
    may_read: bool,
    // the tail of an over-long line is dropped up to the next line break
    skip_to_line_end: bool,
    truncation_reported: bool,
    // identity of the file the cursor refers to, unknown until the first read
    identity: Option<FileIdentity>,
}

/// Device and inode of a file, tells a replaced file apart from a grown one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub(crate) fn of(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt as _;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn of(_meta: &Metadata) -> Option<Self> {
        None
    }
}

impl FileSourcePartition {
    pub(crate) fn new(path: PathBuf, state: Option<IngestionCursor>) -> Self {
        Self {
            cursor: state.unwrap_or_else(|| IngestionCursor::new(path)),
            buffered: VecDeque::new(),
            may_read: false,
            skip_to_line_end: false,
            truncation_reported: false,
            identity: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.cursor.path
    }

    /// Allow the partition to read from its file once more
    pub(crate) fn arm(&mut self) {
        self.may_read = true;
    }

    /// Next complete line or `None` if there is nothing more to read this tick.
    /// The cursor advances past the returned line.
    pub(crate) fn poll(&mut self, max_read_bytes: usize) -> Result<Option<RawLine>, IngestError> {
        if self.buffered.is_empty() && self.may_read {
            self.may_read = false;
            self.fill(max_read_bytes)?;
        }
        Ok(self.buffered.pop_front().map(|line| {
            self.cursor.bytes_consumed = line.end_offset;
            self.cursor.lines_consumed += 1;
            RawLine {
                line_no: self.cursor.lines_consumed,
                bytes: line.bytes,
            }
        }))
    }

    /// Snapshot the current state of this partition
    pub fn snapshot(&self) -> IngestionCursor {
        self.cursor.clone()
    }

    /// Forget all progress, the file at the path is a different one now
    fn restart(&mut self) {
        self.cursor.bytes_consumed = 0;
        self.cursor.lines_consumed = 0;
        self.buffered.clear();
        self.skip_to_line_end = false;
        self.truncation_reported = false;
    }

    fn fill(&mut self, max_read_bytes: usize) -> Result<(), IngestError> {
        let path = self.cursor.path.clone();
        let read_err = |source| IngestError::Read {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&self.cursor.path).map_err(read_err)?;
        let meta = file.metadata().map_err(read_err)?;
        let identity = FileIdentity::of(&meta);
        if self.identity.is_some() && identity != self.identity {
            warn!(
                path = %self.cursor.path.display(),
                consumed = self.cursor.bytes_consumed,
                "File was replaced, reading the new file from the start"
            );
            self.restart();
        }
        self.identity = identity;
        let len = meta.len();
        let start = self.cursor.bytes_consumed;

        if len < start {
            if !self.truncation_reported {
                warn!(
                    path = %self.cursor.path.display(),
                    consumed = start,
                    size = len,
                    "File shrank below the consumed offset, ignoring it until it grows past the offset"
                );
                self.truncation_reported = true;
            }
            return Ok(());
        }
        self.truncation_reported = false;
        if len == start {
            return Ok(());
        }

        let to_read = (len - start).min(max_read_bytes as u64);
        file.seek(SeekFrom::Start(start)).map_err(read_err)?;
        let mut chunk = Vec::with_capacity(to_read as usize);
        file.take(to_read)
            .read_to_end(&mut chunk)
            .map_err(read_err)?;

        let mut line_start = 0usize;
        while let Some(pos) = chunk[line_start..].iter().position(|b| *b == b'\n') {
            let line_end = line_start + pos;
            let end_offset = start + line_end as u64 + 1;
            if self.skip_to_line_end {
                // remainder of an over-long line, consume without emitting
                self.skip_to_line_end = false;
                self.cursor.bytes_consumed = end_offset;
                self.cursor.lines_consumed += 1;
            } else {
                let mut bytes = chunk[line_start..line_end].to_vec();
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                self.buffered.push_back(BufferedLine { bytes, end_offset });
            }
            line_start = line_end + 1;
        }

        let partial = chunk.len() - line_start;
        if line_start == 0 && partial as u64 == to_read && to_read == max_read_bytes as u64 {
            // a full read without a single line break, the line can never complete
            if !self.skip_to_line_end {
                warn!(
                    path = %self.cursor.path.display(),
                    line_no = self.cursor.lines_consumed + 1,
                    offset = start,
                    limit = max_read_bytes,
                    "Line exceeds the read limit, skipping it"
                );
            }
            self.cursor.bytes_consumed = start + to_read;
            self.skip_to_line_end = true;
        }
        Ok(())
    }
}
