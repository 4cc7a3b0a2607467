//! Data Holder
//!
//! An immutable sealed segment: the former commit log file plus its
//! persisted index and bloom filter.

use std::path::Path;

use bytes::Bytes;

use crate::error::{BlobError, Result};
use crate::index::{BloomFilter, IndexEntry, Summary};
use crate::storage::{FileKind, FileStore, LogFile};

use super::{replay, CommitLog};

pub struct DataHolder {
    /// Directory name, the unix-nanosecond timestamp of the rotation
    id: String,
    store: FileStore,
    data: LogFile,
    summary: Summary,
    bloom: BloomFilter,
}

impl DataHolder {
    /// Seal `commit_log` into a new segment at `dir`
    ///
    /// Moves the file and directory, then writes the index and bloom files
    /// alongside the data file. Failing to write either is logged only;
    /// `open` rebuilds them.
    pub fn seal(commit_log: &CommitLog, dir: &Path, bloom_fp: f64) -> Result<Self> {
        let summary = commit_log.summary();
        let store = commit_log.seal_into(dir)?;
        let data = store.open_log(FileKind::Data)?;
        let id = dir_name(dir);

        let bloom = BloomFilter::from_summary(&summary, bloom_fp);
        if let Err(e) = write_index(&store, &summary) {
            tracing::warn!(segment = %id, error = %e, "failed to write segment index");
        }
        if let Err(e) = write_bloom(&store, &bloom) {
            tracing::warn!(segment = %id, error = %e, "failed to write segment bloom filter");
        }

        let holder = Self {
            id,
            store,
            data,
            summary,
            bloom,
        };
        tracing::info!(
            segment = %holder.id,
            records = holder.summary.len(),
            bytes = holder.data.size(),
            "sealed segment"
        );
        Ok(holder)
    }

    /// Open an existing segment directory
    ///
    /// A missing or unreadable index is rebuilt by replaying the data file;
    /// a missing or unreadable bloom filter is rebuilt from the Summary.
    pub fn open(dir: &Path, bloom_fp: f64) -> Result<Self> {
        let store = FileStore::open(dir)?;
        if !store.exists(FileKind::Data) {
            return Err(BlobError::CorruptRecord(format!(
                "segment {} has no data file",
                dir.display()
            )));
        }
        let data = store.open_log(FileKind::Data)?;
        let id = dir_name(dir);

        let summary = match read_index(&store) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(segment = %id, error = %e, "rebuilding segment index");
                let (summary, result) = replay(&data)?;
                if result.was_truncated {
                    tracing::warn!(
                        segment = %id,
                        valid_len = result.valid_len,
                        "segment data file ends with an incomplete frame"
                    );
                }
                if let Err(e) = write_index(&store, &summary) {
                    tracing::warn!(segment = %id, error = %e, "failed to persist rebuilt index");
                }
                summary
            }
        };

        let bloom = match read_bloom(&store) {
            Ok(bloom) => bloom,
            Err(e) => {
                tracing::warn!(segment = %id, error = %e, "rebuilding segment bloom filter");
                let bloom = BloomFilter::from_summary(&summary, bloom_fp);
                if let Err(e) = write_bloom(&store, &bloom) {
                    tracing::warn!(segment = %id, error = %e, "failed to persist rebuilt bloom filter");
                }
                bloom
            }
        };

        Ok(Self {
            id,
            store,
            data,
            summary,
            bloom,
        })
    }

    /// Encoded record at `offset`; read or decode failures count as a miss
    pub fn get(&self, offset: u64) -> Option<Bytes> {
        match self.data.read_at(offset) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!(
                    segment = %self.id,
                    offset,
                    error = %e,
                    "failed to read segment record"
                );
                None
            }
        }
    }

    /// `false` means the key is definitely not in this segment
    pub fn might_contain(&self, key_hash: u32) -> bool {
        self.bloom.contains_hash(key_hash)
    }

    pub fn lookup(&self, key_hash: u32) -> Option<&IndexEntry> {
        self.summary.lookup(key_hash)
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        self.store.dir()
    }

    pub fn data_size(&self) -> u64 {
        self.data.size()
    }

    /// Delete the segment directory; open handles keep working
    pub fn remove(&self) -> Result<()> {
        self.store.remove_all()
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_index(store: &FileStore, summary: &Summary) -> Result<()> {
    let frames: Vec<Bytes> = summary
        .entries_by_offset()
        .into_iter()
        .map(IndexEntry::encode)
        .collect();
    store.write_frames(FileKind::Index, &frames)
}

fn read_index(store: &FileStore) -> Result<Summary> {
    if !store.exists(FileKind::Index) {
        return Err(BlobError::CorruptRecord("index file missing".to_string()));
    }
    let mut summary = Summary::new();
    for frame in store.read_frames(FileKind::Index)? {
        summary.add(IndexEntry::decode(&frame)?);
    }
    Ok(summary)
}

fn write_bloom(store: &FileStore, bloom: &BloomFilter) -> Result<()> {
    store.write_frames(FileKind::Bloom, &[bloom.encode()])
}

fn read_bloom(store: &FileStore) -> Result<BloomFilter> {
    if !store.exists(FileKind::Bloom) {
        return Err(BlobError::CorruptRecord("bloom file missing".to_string()));
    }
    let frames = store.read_frames(FileKind::Bloom)?;
    match frames.as_slice() {
        [frame] => BloomFilter::decode(frame),
        _ => Err(BlobError::CorruptRecord(format!(
            "bloom file holds {} frames",
            frames.len()
        ))),
    }
}
