//! Segment Module
//!
//! The two kinds of record files a database is made of.
//!
//! ## Responsibilities
//! - `CommitLog`: the single live, appendable file of a database
//! - `DataHolder`: an immutable sealed segment with a persisted index and
//!   bloom filter
//! - Replay: rebuild a `Summary` by scanning a record file from offset 0
//!
//! ## Lifecycle
//! ```text
//!   insert ──► CommitLog (commitlog/commitlog.blob)
//!                 │  size limit reached
//!                 ▼  rename file, rename dir
//!              DataHolder ({nanos}/data.blob + index.blob + bloom.blob)
//!                 │  compaction rewrites survivors into the CommitLog
//!                 ▼
//!              directory deleted
//! ```

mod commit_log;
mod data_holder;

pub use commit_log::CommitLog;
pub use data_holder::DataHolder;

use crate::error::Result;
use crate::index::{IndexEntry, Summary};
use crate::record::Record;
use crate::storage::LogFile;

/// Directory name of the live commit log inside a database directory
pub const COMMIT_LOG_DIR: &str = "commitlog";

/// Outcome of replaying a record file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayResult {
    /// Records indexed
    pub records_recovered: u64,

    /// Complete frames that could not be decoded
    pub records_skipped: u64,

    /// Whether a torn trailing frame was cut off
    pub was_truncated: bool,

    /// Length covered by complete frames
    pub valid_len: u64,
}

/// Scan every frame of `file`, indexing the records that decode
///
/// The file is never modified here; callers decide what to do with a torn
/// tail (`valid_len < file.size()`).
pub(crate) fn replay(file: &LogFile) -> Result<(Summary, ReplayResult)> {
    let mut summary = Summary::new();
    let mut result = ReplayResult::default();

    let mut frames = file.frames();
    for frame in &mut frames {
        let (offset, bytes) = frame?;
        match Record::decode_meta(&bytes) {
            Ok(meta) => {
                summary.add(IndexEntry::for_record(&meta, offset));
                result.records_recovered += 1;
            }
            Err(e) => {
                tracing::warn!(
                    path = %file.path().display(),
                    offset,
                    error = %e,
                    "skipping undecodable record"
                );
                result.records_skipped += 1;
            }
        }
    }

    result.was_truncated = frames.is_torn();
    result.valid_len = frames.valid_len();
    Ok((summary, result))
}
