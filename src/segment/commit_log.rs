//! Commit Log
//!
//! The live, appendable record file of a database together with its
//! in-memory Summary. Every insert lands here first; once the file reaches
//! the segment size limit it is sealed into a `DataHolder`.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::SyncStrategy;
use crate::error::{BlobError, Result};
use crate::hash::key_hash;
use crate::index::{IndexEntry, Summary};
use crate::record::Status;
use crate::storage::{FileKind, FileStore, LogFile, FRAME_HEADER_SIZE};

use super::{replay, ReplayResult};

pub struct CommitLog {
    store: FileStore,
    file: LogFile,
    summary: RwLock<Summary>,
    /// Serializes appends; also tracks durability
    append: Mutex<AppendState>,
    sync_strategy: SyncStrategy,
}

#[derive(Debug, Default)]
struct AppendState {
    /// Writes since the last fsync
    unsynced: usize,
    /// Segment directory the file was handed over to
    sealed: Option<PathBuf>,
}

impl CommitLog {
    /// Open (or create) the commit log in `dir` and replay it
    ///
    /// A torn trailing frame left by a crash is truncated away.
    pub fn open(dir: &Path, sync_strategy: SyncStrategy) -> Result<(Self, ReplayResult)> {
        let store = FileStore::open(dir)?;
        let file = store.open_log(FileKind::CommitLog)?;

        let (summary, result) = replay(&file)?;
        if result.was_truncated {
            tracing::warn!(
                path = %file.path().display(),
                valid_len = result.valid_len,
                file_len = file.size(),
                "truncating torn commit log tail"
            );
            file.truncate(result.valid_len)?;
        }

        tracing::debug!(
            path = %file.path().display(),
            records = result.records_recovered,
            skipped = result.records_skipped,
            "commit log replayed"
        );

        Ok((
            Self {
                store,
                file,
                summary: RwLock::new(summary),
                append: Mutex::new(AppendState::default()),
                sync_strategy,
            },
            result,
        ))
    }

    /// Append an encoded record and index it
    pub fn add(
        &self,
        key: &str,
        status: Status,
        revision: u32,
        version_chain: Vec<u32>,
        record: &[u8],
    ) -> Result<IndexEntry> {
        let entry = IndexEntry {
            key_hash: key_hash(key),
            offset: 0,
            status,
            revision,
            version_chain,
        };
        self.add_entry(entry, record)
    }

    /// Append an encoded record described by `entry`; its offset is replaced
    /// with the record's new location
    pub fn add_entry(&self, mut entry: IndexEntry, record: &[u8]) -> Result<IndexEntry> {
        let mut state = self.append.lock();
        if state.sealed.is_some() {
            return Err(BlobError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "commit log has been sealed",
            )));
        }

        let offset = self.file.append(record)?;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => state.unsynced + 1 >= count,
        };
        if due {
            if let Err(e) = self.file.sync() {
                if let Err(truncate_err) = self.file.truncate(offset) {
                    tracing::error!(
                        path = %self.file.path().display(),
                        offset,
                        error = %truncate_err,
                        "failed to roll back unsynced record"
                    );
                }
                return Err(e);
            }
            state.unsynced = 0;
        } else {
            state.unsynced += 1;
        }

        entry.offset = offset as i64;
        self.summary.write().add(entry.clone());
        Ok(entry)
    }

    /// Encoded record for `key`, tombstones included
    pub fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.get_by_hash(key_hash(key))
    }

    pub fn get_by_hash(&self, key_hash: u32) -> Result<Option<Bytes>> {
        let offset = match self.summary.read().lookup(key_hash) {
            Some(entry) => entry.file_offset(),
            None => return Ok(None),
        };
        self.file.read_at(offset).map(Some)
    }

    pub fn lookup(&self, key_hash: u32) -> Option<IndexEntry> {
        self.summary.read().lookup(key_hash).cloned()
    }

    pub fn contains(&self, key_hash: u32) -> bool {
        self.summary.read().contains(key_hash)
    }

    /// Copy of the current Summary
    pub fn summary(&self) -> Summary {
        self.summary.read().clone()
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    /// On-disk size of a record once framed
    pub fn frame_len(record: &[u8]) -> u64 {
        FRAME_HEADER_SIZE + record.len() as u64
    }

    pub fn sync(&self) -> Result<()> {
        let mut state = self.append.lock();
        self.file.sync()?;
        state.unsynced = 0;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Segment directory the file now lives in, once sealed
    pub fn sealed_into(&self) -> Option<PathBuf> {
        self.append.lock().sealed.clone()
    }

    /// Hand the file over to a sealed segment at `dir`
    ///
    /// The commit log file is renamed to the data kind, then its directory is
    /// renamed to `dir`. No appends are accepted afterwards; reads keep
    /// working through the open handle. If the directory cannot be moved the
    /// file gets its name back and the log stays writable.
    pub fn seal_into(&self, dir: &Path) -> Result<FileStore> {
        let mut state = self.append.lock();
        if let Some(sealed) = &state.sealed {
            return FileStore::open(sealed);
        }
        self.file.sync()?;
        state.unsynced = 0;

        self.store.rename(FileKind::CommitLog, FileKind::Data)?;
        if let Err(e) = fs::rename(self.store.dir(), dir) {
            if let Err(restore_err) = self.store.rename(FileKind::Data, FileKind::CommitLog) {
                // Appends still reach the open handle; startup recovery moves
                // the data file into a segment.
                tracing::error!(
                    path = %self.store.dir().display(),
                    error = %restore_err,
                    "failed to restore commit log after aborted seal"
                );
            }
            return Err(e.into());
        }
        state.sealed = Some(dir.to_path_buf());

        FileStore::open(dir)
    }
}
