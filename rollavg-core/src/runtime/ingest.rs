use std::sync::Arc;

use tracing::warn;

use crate::{codec::RecordParser, sources::DirectorySource, types::Clock, window::WindowStore};

/// Counters of one or more ingestion ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines handed out by the source
    pub lines: u64,
    /// Records folded into a window
    pub folded: u64,
    /// Records moved to a later window because theirs had fired
    pub late: u64,
    /// Lines which failed to parse
    pub malformed: u64,
}

impl IngestStats {
    pub(crate) fn merge(&mut self, other: IngestStats) {
        self.lines += other.lines;
        self.folded += other.folded;
        self.late += other.late;
        self.malformed += other.malformed;
    }
}

/// Reads new lines from the source and folds them into the window store
pub(crate) struct Ingestor<P, C> {
    pub(crate) source: DirectorySource,
    pub(crate) parser: P,
    pub(crate) store: Arc<WindowStore>,
    pub(crate) clock: Arc<C>,
}

impl<P, C> Ingestor<P, C>
where
    P: RecordParser,
    C: Clock,
{
    pub(crate) fn tick(&mut self) -> IngestStats {
        let mut stats = IngestStats::default();
        if let Err(e) = self.source.scan() {
            warn!(dir = %self.source.dir().display(), "Scanning input directory failed, retrying next tick: {e:?}");
        }
        while let Some(line) = self.source.poll() {
            stats.lines += 1;
            match self.parser.parse(&line.content) {
                Ok(record) => {
                    // processing time of arrival decides the window
                    let fold = self.store.fold(&record, self.clock.now());
                    stats.folded += 1;
                    if fold.late {
                        stats.late += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        path = %line.path.display(),
                        line_no = line.line_no,
                        content = %line.content,
                        "Skipping malformed line: {e}"
                    );
                    stats.malformed += 1;
                }
            }
        }
        stats
    }
}
