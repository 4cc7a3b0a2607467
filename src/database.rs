//! Database
//!
//! Orchestrates one logical database: the live commit log, the sealed
//! segments and the cache.
//!
//! ## Write Path
//! 1. Take the write lock (inserts, rotations and compaction rewrites are serialized)
//! 2. Look up the stored record and apply the revision policy (`InsertMode`)
//! 3. Rotate if the framed record would push the commit log past its limit
//! 4. Append to the commit log, then store the encoded record in the cache
//!
//! ## Read Path
//! 1. Check the cache
//! 2. Check the commit log (filling the cache on a hit)
//! 3. Check sealed segments newest → oldest, bloom filter before index
//!
//! Readers never take the write lock: they clone an `Arc` of the current
//! (commit log, segments) state and work on that.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::cache::Cache;
use crate::compaction::{self, CompactionReport};
use crate::config::DatabaseConfig;
use crate::error::{BlobError, Result};
use crate::hash::key_hash;
use crate::index::IndexEntry;
use crate::record::{Record, RecordMeta, Status};
use crate::segment::{CommitLog, DataHolder, COMMIT_LOG_DIR};
use crate::storage::FileKind;

/// How an insert treats a key that already holds an active record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Fail with `KeyExists` if the key is active
    Create,
    /// Overwrite, assigning the stored revision + 1
    Upsert,
    /// Write exactly this revision; it must be newer than the stored one
    Revision(u32),
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub segment_count: usize,
    pub commit_log_size: u64,
    pub cache_capacity: u64,
    pub cache_used: u64,
    pub cache_items: usize,
}

/// Files a reader works against
pub(crate) struct DbState {
    pub(crate) commit_log: Arc<CommitLog>,
    /// Oldest first
    pub(crate) segments: Vec<Arc<DataHolder>>,
}

/// One logical database
pub struct Database {
    config: DatabaseConfig,
    state: RwLock<Arc<DbState>>,
    cache: Cache,
    write_lock: Mutex<()>,
    /// Bumped by every write before it touches the commit log; readers only
    /// fill the cache if no write started since they took their snapshot
    generation: AtomicU64,
}

impl Database {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a database, creating its directory if needed
    ///
    /// Finishes a rotation interrupted by a crash, opens every sealed segment
    /// in name order and replays the commit log.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.path)?;

        recover_rotation(&config.path)?;

        let mut segments = Vec::new();
        for dir in segment_dirs(&config.path)? {
            segments.push(Arc::new(DataHolder::open(&dir, config.bloom_filter_fp)?));
        }

        let (commit_log, replay) =
            CommitLog::open(&config.path.join(COMMIT_LOG_DIR), config.sync_strategy)?;

        tracing::info!(
            db = %config.name,
            path = %config.path.display(),
            segments = segments.len(),
            commit_log_records = replay.records_recovered,
            skipped = replay.records_skipped,
            truncated = replay.was_truncated,
            "database opened"
        );

        Ok(Self {
            cache: Cache::new(config.max_cache_size),
            state: RwLock::new(Arc::new(DbState {
                commit_log: Arc::new(commit_log),
                segments,
            })),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            config,
        })
    }

    /// Flush the commit log to disk
    pub fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.state().commit_log.sync()?;
        tracing::info!(db = %self.config.name, "database closed");
        Ok(())
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Insert a record, returning the revision it was stored with
    ///
    /// The stored record's revision and version chain are assigned here;
    /// whatever the caller set on `record` is ignored.
    pub fn insert(&self, mut record: Record, mode: InsertMode) -> Result<u32> {
        let _guard = self.write_lock.lock();
        let state = self.state();
        let existing = self.find_meta(&state, &record.key)?;

        let revision = match (&existing, mode) {
            (None, InsertMode::Revision(r)) => r,
            (None, _) => 0,
            (Some(stored), InsertMode::Revision(r)) if stored.status == Status::Removed => {
                r.max(next_revision(stored)?)
            }
            (Some(stored), _) if stored.status == Status::Removed => next_revision(stored)?,
            (Some(_), InsertMode::Create) => return Err(BlobError::KeyExists(record.key)),
            (Some(stored), InsertMode::Upsert) => next_revision(stored)?,
            (Some(stored), InsertMode::Revision(r)) => {
                if r <= stored.revision {
                    return Err(BlobError::WrongRevision {
                        key: record.key,
                        revision: r,
                        current: stored.revision,
                    });
                }
                r
            }
        };

        record.revision = revision;
        record.version_chain = match existing {
            Some(stored) => {
                let mut chain = stored.version_chain;
                chain.push(revision);
                chain
            }
            None => Vec::new(),
        };
        record.size = record.payload.len() as u32;
        record.status = Status::Active;

        self.write_locked(&record)?;
        tracing::debug!(db = %self.config.name, key = %record.key, revision, "inserted");
        Ok(revision)
    }

    /// Get the current record for `key`; deleted keys read as `None`
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        let generation = self.generation.load(Ordering::Acquire);
        let state = self.state();

        let bytes = match self.find(&state, key, Some(generation))? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        match Record::decode(&bytes) {
            Ok(record) if record.is_removed() => Ok(None),
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::error!(db = %self.config.name, key, error = %e, "corrupt record");
                Ok(None)
            }
        }
    }

    /// Delete `key` by writing a tombstone, returning the tombstone's revision
    pub fn delete(&self, key: &str) -> Result<u32> {
        let _guard = self.write_lock.lock();
        let state = self.state();

        let stored = match self.find_meta(&state, key)? {
            Some(meta) if meta.status == Status::Active => meta,
            _ => return Err(BlobError::KeyNotFound),
        };

        let revision = next_revision(&stored)?;
        let tombstone = stored.into_tombstone(revision);

        self.write_locked(&tombstone)?;
        tracing::debug!(db = %self.config.name, key, revision, "deleted");
        Ok(revision)
    }

    /// Every key whose newest record is active, sorted
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let state = self.state();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for entry in state.commit_log.summary().iter() {
            seen.insert(entry.key_hash);
            if entry.is_removed() {
                continue;
            }
            if let Some(bytes) = state.commit_log.get_by_hash(entry.key_hash)? {
                self.push_key(&bytes, &mut keys);
            }
        }

        for segment in state.segments.iter().rev() {
            for entry in segment.summary().iter() {
                if !seen.insert(entry.key_hash) || entry.is_removed() {
                    continue;
                }
                if let Some(bytes) = segment.get(entry.file_offset()) {
                    self.push_key(&bytes, &mut keys);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub fn info(&self) -> DatabaseInfo {
        let state = self.state();
        let usage = self.cache.usage();
        DatabaseInfo {
            segment_count: state.segments.len(),
            commit_log_size: state.commit_log.size(),
            cache_capacity: usage.capacity,
            cache_used: usage.used,
            cache_items: usage.items,
        }
    }

    /// Seal the commit log into a segment now; no-op when it is empty
    pub fn rotate(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.rotate_locked()
    }

    /// Purge tombstoned keys from sealed segments
    pub fn compact(&self) -> Result<CompactionReport> {
        compaction::compact(self)
    }

    /// Capture the database's files under its snapshot directory
    ///
    /// Sealed segment files are hard-linked, the commit log is copied. The
    /// snapshot is assembled in `{nanos}_temp` and renamed to `{nanos}` once
    /// complete.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let _guard = self.write_lock.lock();
        if self.state().commit_log.sealed_into().is_some() {
            self.rotate_locked()?;
        }
        let state = self.state();
        state.commit_log.sync()?;

        let root = self.config.snapshot_dir();
        fs::create_dir_all(&root)?;
        let name = format!("{:019}", unix_nanos());
        let temp = root.join(format!("{}_temp", name));
        let target = root.join(&name);
        fs::create_dir_all(&temp)?;

        for segment in &state.segments {
            let dst = temp.join(segment.id());
            fs::create_dir_all(&dst)?;
            for kind in [FileKind::Data, FileKind::Index, FileKind::Bloom] {
                let src = segment.path().join(kind.file_name());
                if src.is_file() {
                    fs::hard_link(&src, dst.join(kind.file_name()))?;
                }
            }
        }

        let commit_log_dst = temp.join(COMMIT_LOG_DIR);
        fs::create_dir_all(&commit_log_dst)?;
        fs::copy(
            state.commit_log.dir().join(FileKind::CommitLog.file_name()),
            commit_log_dst.join(FileKind::CommitLog.file_name()),
        )?;

        fs::rename(&temp, &target)?;
        tracing::info!(db = %self.config.name, path = %target.display(), "snapshot created");
        Ok(target)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn segment_count(&self) -> usize {
        self.state().segments.len()
    }

    pub fn commit_log_size(&self) -> u64 {
        self.state().commit_log.size()
    }

    // =========================================================================
    // Internals shared with compaction
    // =========================================================================

    pub(crate) fn state(&self) -> Arc<DbState> {
        self.state.read().clone()
    }

    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    pub(crate) fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Re-append a record from a segment being rewritten. Write lock held.
    pub(crate) fn reappend_locked(&self, entry: &IndexEntry, bytes: &Bytes) -> Result<()> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.append_locked(bytes, |commit_log| {
            commit_log.add_entry(entry.clone(), bytes)
        })?;
        Ok(())
    }

    /// Drop a segment from the state, then delete its directory. Write lock held.
    pub(crate) fn retire_segment_locked(&self, id: &str) -> Result<()> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let retired = {
            let mut state = self.state.write();
            let position = state.segments.iter().position(|s| s.id() == id);
            let retired = position.map(|p| state.segments[p].clone());
            if let Some(p) = position {
                let mut segments = state.segments.clone();
                segments.remove(p);
                *state = Arc::new(DbState {
                    commit_log: state.commit_log.clone(),
                    segments,
                });
            }
            retired
        };

        if let Some(segment) = retired {
            segment.remove()?;
        }
        Ok(())
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    /// Encoded newest record for `key`, tombstones included
    ///
    /// With `fill_cache`, a commit log hit is stored in the cache unless a
    /// write started after that generation was observed.
    fn find(&self, state: &DbState, key: &str, fill_cache: Option<u64>) -> Result<Option<Bytes>> {
        let hash = key_hash(key);

        if let Some(bytes) = self.cache.get(hash) {
            return Ok(self.matching(key, bytes));
        }

        if let Some(bytes) = state.commit_log.get_by_hash(hash)? {
            let bytes = match self.matching(key, bytes) {
                Some(bytes) => bytes,
                None => return Ok(None),
            };
            if let Some(generation) = fill_cache {
                self.cache.put_if(hash, bytes.clone(), || {
                    self.generation.load(Ordering::Acquire) == generation
                });
            }
            return Ok(Some(bytes));
        }

        for segment in state.segments.iter().rev() {
            if !segment.might_contain(hash) {
                continue;
            }
            let offset = match segment.lookup(hash) {
                Some(entry) => entry.file_offset(),
                None => continue,
            };
            return Ok(segment.get(offset).and_then(|bytes| self.matching(key, bytes)));
        }

        Ok(None)
    }

    /// Decoded metadata of the newest record for `key`
    fn find_meta(&self, state: &DbState, key: &str) -> Result<Option<RecordMeta>> {
        let bytes = match self.find(state, key, None)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match Record::decode_meta(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                tracing::error!(db = %self.config.name, key, error = %e, "corrupt record");
                Ok(None)
            }
        }
    }

    /// `bytes` if they hold `key`; another key under the same hash is a miss
    fn matching(&self, key: &str, bytes: Bytes) -> Option<Bytes> {
        match Record::decode_meta(&bytes) {
            Ok(meta) if meta.key == key => Some(bytes),
            Ok(meta) => {
                tracing::debug!(db = %self.config.name, key, other = %meta.key, "key hash collision");
                None
            }
            Err(e) => {
                tracing::error!(db = %self.config.name, key, error = %e, "corrupt record");
                None
            }
        }
    }

    fn push_key(&self, bytes: &[u8], keys: &mut Vec<String>) {
        match Record::decode_meta(bytes) {
            Ok(meta) => keys.push(meta.key),
            Err(e) => {
                tracing::warn!(db = %self.config.name, error = %e, "skipping corrupt record in key listing");
            }
        }
    }

    /// Append a record and cache it. Write lock held.
    fn write_locked(&self, record: &Record) -> Result<()> {
        let bytes = record.encode();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.append_locked(&bytes, |commit_log| {
            commit_log.add(
                &record.key,
                record.status,
                record.revision,
                record.version_chain.clone(),
                &bytes,
            )
        })?;
        self.cache.put(record.key_hash(), bytes);
        Ok(())
    }

    /// Rotate if `bytes` would not fit, then append through `write`
    fn append_locked(
        &self,
        bytes: &[u8],
        write: impl FnOnce(&CommitLog) -> Result<IndexEntry>,
    ) -> Result<IndexEntry> {
        let mut state = self.state();
        let commit_log_size = state.commit_log.size();
        let full = commit_log_size > 0
            && commit_log_size + CommitLog::frame_len(bytes) > self.config.max_segment_size;
        if full || state.commit_log.sealed_into().is_some() {
            self.rotate_locked()?;
            state = self.state();
        }
        write(&state.commit_log)
    }

    /// Seal the commit log and install a fresh one
    ///
    /// A failure after the file has moved leaves the sealed log in place for
    /// reads; the next call picks up the moved directory and finishes.
    fn rotate_locked(&self) -> Result<()> {
        let state = self.state();
        let holder = match state.commit_log.sealed_into() {
            Some(dir) => {
                tracing::warn!(
                    db = %self.config.name,
                    segment = %dir.display(),
                    "finishing interrupted rotation"
                );
                DataHolder::open(&dir, self.config.bloom_filter_fp)?
            }
            None if state.commit_log.is_empty() => return Ok(()),
            None => {
                let dir = self.next_segment_dir(&state);
                DataHolder::seal(&state.commit_log, &dir, self.config.bloom_filter_fp)?
            }
        };
        let dir = holder.path().to_path_buf();
        let (commit_log, _) = CommitLog::open(
            &self.config.path.join(COMMIT_LOG_DIR),
            self.config.sync_strategy,
        )?;

        let mut segments = state.segments.clone();
        segments.push(Arc::new(holder));
        let segment_count = segments.len();
        *self.state.write() = Arc::new(DbState {
            commit_log: Arc::new(commit_log),
            segments,
        });

        tracing::info!(
            db = %self.config.name,
            segment = %dir.display(),
            segments = segment_count,
            "rotated commit log"
        );
        Ok(())
    }

    /// A fresh segment directory that sorts after every existing one
    fn next_segment_dir(&self, state: &DbState) -> PathBuf {
        let mut nanos = unix_nanos();
        if let Some(last) = state
            .segments
            .last()
            .and_then(|s| s.id().parse::<u128>().ok())
        {
            nanos = nanos.max(last + 1);
        }
        loop {
            let dir = self.config.path.join(format!("{:019}", nanos));
            if !dir.exists() {
                return dir;
            }
            nanos += 1;
        }
    }
}

fn next_revision(stored: &RecordMeta) -> Result<u32> {
    stored.revision.checked_add(1).ok_or_else(|| BlobError::WrongRevision {
        key: stored.key.clone(),
        revision: stored.revision,
        current: stored.revision,
    })
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn is_segment_name(name: &str) -> bool {
    name.len() == 19 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Sealed segment directories of a database, oldest first
fn segment_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if is_segment_name(&entry.file_name().to_string_lossy()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// A crash between renaming the commit log file and renaming its directory
/// leaves a data file in the commit log directory; finish the move.
fn recover_rotation(path: &Path) -> Result<()> {
    let commit_log_dir = path.join(COMMIT_LOG_DIR);
    if !commit_log_dir.join(FileKind::Data.file_name()).is_file() {
        return Ok(());
    }

    let latest = segment_dirs(path)?
        .last()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().into_owned()))
        .and_then(|n| n.parse::<u128>().ok());
    let mut nanos = unix_nanos().max(latest.map_or(0, |n| n + 1));
    let mut target = path.join(format!("{:019}", nanos));
    while target.exists() {
        nanos += 1;
        target = path.join(format!("{:019}", nanos));
    }

    tracing::warn!(
        path = %path.display(),
        segment = %target.display(),
        "finishing interrupted rotation"
    );
    fs::rename(&commit_log_dir, &target)?;
    Ok(())
}
