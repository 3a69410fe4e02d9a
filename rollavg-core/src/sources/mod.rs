//! Ingestion of lines appended to files in a watched directory.
mod file;

use std::path::{Path, PathBuf};

use bon::bon;
use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    codec::decode_line,
    config::{default_header_tokens, DEFAULT_MAX_READ_BYTES},
};

pub use file::{FileSourcePartition, IngestionCursor};
pub(crate) use file::FileIdentity;

/// A complete, non blank, non header line of an input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub path: PathBuf,
    /// 1 based line number within the file
    pub line_no: u64,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to list directory `{}`", path.display())]
    ListDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read file `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Watches a directory and reads lines appended to any regular file in it.
///
/// Every file is one partition with its own [IngestionCursor]. Per tick call
/// [DirectorySource::scan] once to pick up new files and allow every file to be
/// read again, then call [DirectorySource::poll] until it returns `None`.
/// Within one file lines come in file order, files are visited by name.
///
/// Files whose name starts with `.` or `_` are ignored, as they are usually
/// still being written by another process.
///
/// ```no_run
/// use rollavg::sources::DirectorySource;
///
/// let mut source = DirectorySource::builder().dir("/data/in").build();
/// if let Err(e) = source.scan() {
///     eprintln!("{e}");
/// }
/// while let Some(line) = source.poll() {
///     println!("{}:{} {}", line.path.display(), line.line_no, line.content);
/// }
/// ```
pub struct DirectorySource {
    dir: PathBuf,
    max_read_bytes: usize,
    header_tokens: Vec<String>,
    parts: IndexMap<PathBuf, FileSourcePartition>,
    resume: IndexMap<PathBuf, IngestionCursor>,
    // index of the partition currently polled
    current: usize,
}

#[bon]
impl DirectorySource {
    #[builder]
    pub fn new(
        #[builder(into)] dir: PathBuf,
        #[builder(default = DEFAULT_MAX_READ_BYTES)] max_read_bytes: usize,
        /// Lines whose first field matches any of these (ignoring case) are headers
        #[builder(default = default_header_tokens())]
        header_tokens: Vec<String>,
        /// Cursors of a previous snapshot to resume from
        #[builder(default)]
        cursors: IndexMap<PathBuf, IngestionCursor>,
    ) -> Self {
        Self {
            dir,
            max_read_bytes,
            header_tokens,
            parts: IndexMap::new(),
            resume: cursors,
            current: 0,
        }
    }
}

impl DirectorySource {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List all partitions, i.e. the readable files in the directory, by name
    pub fn list_parts(&self) -> Result<Vec<PathBuf>, IngestError> {
        let list_err = |source| IngestError::ListDirectory {
            path: self.dir.clone(),
            source,
        };
        let mut parts = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name.starts_with('_') {
                continue;
            }
            let path = entry.path();
            // follows symlinks
            if path.is_file() {
                parts.push(path);
            }
        }
        Ok(parts.into_iter().sorted().collect())
    }

    fn build_part(&mut self, part: &Path) -> FileSourcePartition {
        let state = self.resume.shift_remove(part);
        FileSourcePartition::new(part.to_path_buf(), state)
    }

    /// Start a new tick: pick up new files, forget removed ones and allow
    /// every known file to be read once more.
    ///
    /// Known files are armed even if listing the directory fails, so their new
    /// content is still read. Returns the number of newly discovered files.
    pub fn scan(&mut self) -> Result<usize, IngestError> {
        self.current = 0;
        for part in self.parts.values_mut() {
            part.arm();
        }
        let listed = self.list_parts()?;
        self.parts.retain(|path, part| {
            let present = listed.binary_search(path).is_ok();
            if !present {
                info!(
                    path = %path.display(),
                    lines_consumed = part.snapshot().lines_consumed,
                    "Input file disappeared, forgetting it"
                );
            }
            present
        });
        let mut discovered = 0;
        for path in listed {
            if self.parts.contains_key(&path) {
                continue;
            }
            info!(path = %path.display(), "Discovered new input file");
            let mut part = self.build_part(&path);
            part.arm();
            self.parts.insert(path, part);
            discovered += 1;
        }
        Ok(discovered)
    }

    /// Next line of this tick or `None` once every file is exhausted.
    ///
    /// Blank lines and header lines are dropped here. A file which can not be
    /// read is logged and skipped until the next tick.
    pub fn poll(&mut self) -> Option<SourceLine> {
        while let Some((path, part)) = self.parts.get_index_mut(self.current) {
            let raw = match part.poll(self.max_read_bytes) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.current += 1;
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), "Skipping file for this tick: {e:?}");
                    self.current += 1;
                    continue;
                }
            };
            let content = match decode_line(&raw.bytes) {
                Ok(content) => content.to_owned(),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line_no = raw.line_no,
                        content = %String::from_utf8_lossy(&raw.bytes),
                        "Skipping malformed line: {e}"
                    );
                    continue;
                }
            };
            if content.trim().is_empty() {
                debug!(path = %path.display(), line_no = raw.line_no, "Skipping blank line");
                continue;
            }
            if is_header(&content, &self.header_tokens) {
                debug!(path = %path.display(), line_no = raw.line_no, "Skipping header line");
                continue;
            }
            return Some(SourceLine {
                path: path.clone(),
                line_no: raw.line_no,
                content,
            });
        }
        None
    }

    /// Cursors of every known file
    pub fn snapshot(&self) -> IndexMap<PathBuf, IngestionCursor> {
        self.parts
            .iter()
            .map(|(path, part)| (path.clone(), part.snapshot()))
            .collect()
    }
}

/// A line is a header if its first field is one of the header tokens
pub fn is_header(line: &str, header_tokens: &[String]) -> bool {
    let first = line.split(',').next().unwrap_or_default().trim();
    header_tokens
        .iter()
        .any(|token| token.eq_ignore_ascii_case(first))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn append(path: &Path, content: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content).unwrap();
    }

    fn tick(source: &mut DirectorySource) -> Vec<String> {
        source.scan().unwrap();
        std::iter::from_fn(|| source.poll())
            .map(|l| l.content)
            .collect()
    }

    #[test]
    fn header_detection() {
        let tokens = default_header_tokens();
        assert!(is_header("profile_id,amount,timestamp", &tokens));
        assert!(is_header("entityId,amount,timestamp", &tokens));
        assert!(is_header(" ENTITY_ID , amount", &tokens));
        assert!(!is_header("A,10.00,2024-01-01 00:00:00", &tokens));
        assert!(!is_header("profile,1,2", &tokens));
    }

    #[test]
    fn lists_visible_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv", ".hidden.csv", "_inprogress.csv"] {
            append(&dir.path().join(name), b"");
        }
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let source = DirectorySource::builder().dir(dir.path()).build();
        let parts = source.list_parts().unwrap();
        assert_eq!(
            parts,
            vec![dir.path().join("a.csv"), dir.path().join("b.csv")]
        );
    }

    #[test]
    fn skips_blank_and_header_lines() {
        let dir = tempfile::tempdir().unwrap();
        append(
            &dir.path().join("in.csv"),
            b"profile_id,amount,timestamp\nA,1,2024-01-01 00:00:00\n\n   \nB,2,2024-01-01 00:00:00\n",
        );
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(
            tick(&mut source),
            vec!["A,1,2024-01-01 00:00:00", "B,2,2024-01-01 00:00:00"]
        );
    }

    #[test]
    fn picks_up_new_files_and_growth() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        append(&a, b"a1\n");
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(tick(&mut source), vec!["a1"]);
        assert!(tick(&mut source).is_empty());

        append(&a, b"a2\n");
        append(&dir.path().join("b.csv"), b"b1\nb2");
        assert_eq!(tick(&mut source), vec!["a2", "b1"]);
        append(&dir.path().join("b.csv"), b"\n");
        assert_eq!(tick(&mut source), vec!["b2"]);

        let snapshot = source.snapshot();
        assert_eq!(snapshot[&a].lines_consumed, 2);
        assert_eq!(snapshot[&dir.path().join("b.csv")].bytes_consumed, 6);
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        append(&dir.path().join("a.csv"), b"ok1\n\xff\xfe\nok2\n");
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(tick(&mut source), vec!["ok1", "ok2"]);
    }

    #[test]
    fn resumes_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        append(&a, b"one\ntwo\n");
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(tick(&mut source).len(), 2);
        let snapshot = source.snapshot();

        append(&a, b"three\n");
        let mut resumed = DirectorySource::builder()
            .dir(dir.path())
            .cursors(snapshot)
            .build();
        assert_eq!(tick(&mut resumed), vec!["three"]);
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = DirectorySource::builder()
            .dir(dir.path().join("absent"))
            .build();
        assert!(matches!(
            source.scan(),
            Err(IngestError::ListDirectory { .. })
        ));
        assert!(source.poll().is_none());
    }

    #[test]
    fn vanished_file_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        append(&a, b"a1\n");
        append(&b, b"b1\n");
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(tick(&mut source), vec!["a1", "b1"]);

        std::fs::remove_file(&a).unwrap();
        append(&b, b"b2\n");
        assert_eq!(tick(&mut source), vec!["b2"]);
        assert_eq!(source.snapshot().len(), 1);
    }

    #[test]
    fn recreated_file_is_read_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        append(&a, b"A,10.00,2024-01-01 00:00:00\nA,20.00,2024-01-01 00:00:05\n");
        let mut source = DirectorySource::builder().dir(dir.path()).build();
        assert_eq!(tick(&mut source).len(), 2);

        std::fs::remove_file(&a).unwrap();
        for _ in 0..3 {
            assert!(tick(&mut source).is_empty());
        }
        assert!(source.snapshot().is_empty());

        append(
            &a,
            b"B,9.00,2024-01-02 00:00:00\nB,10.00,2024-01-02 00:00:00\nB,11.00,2024-01-02 00:00:00\n",
        );
        assert_eq!(
            tick(&mut source),
            vec![
                "B,9.00,2024-01-02 00:00:00",
                "B,10.00,2024-01-02 00:00:00",
                "B,11.00,2024-01-02 00:00:00"
            ]
        );
    }
}
