//! File Store
//!
//! A directory whose files are addressed by logical kind rather than by name.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{BlobError, Result};

use super::LogFile;

/// Logical file kinds inside a segment or commit log directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Records of a sealed segment
    Data,
    /// Persisted index entries of a sealed segment
    Index,
    /// Persisted bloom filter of a sealed segment
    Bloom,
    /// Records of the live commit log
    CommitLog,
}

impl FileKind {
    pub fn file_name(self) -> &'static str {
        match self {
            FileKind::Data => "data.blob",
            FileKind::Index => "index.blob",
            FileKind::Bloom => "bloom.blob",
            FileKind::CommitLog => "commitlog.blob",
        }
    }
}

/// Files of one directory, addressed by `FileKind`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store, creating its directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: FileKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn exists(&self, kind: FileKind) -> bool {
        self.path(kind).is_file()
    }

    /// Size of a file in bytes, 0 when it does not exist
    pub fn size(&self, kind: FileKind) -> Result<u64> {
        match fs::metadata(self.path(kind)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Open (or create) a file for appending and random reads
    pub fn open_log(&self, kind: FileKind) -> Result<LogFile> {
        LogFile::open(&self.path(kind))
    }

    pub fn rename(&self, from: FileKind, to: FileKind) -> Result<()> {
        fs::rename(self.path(from), self.path(to))?;
        Ok(())
    }

    /// Delete a file; a missing file is not an error
    pub fn delete(&self, kind: FileKind) -> Result<()> {
        match fs::remove_file(self.path(kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a file with the given frames
    ///
    /// Frames are written to a temporary file, synced, then renamed over the
    /// target so readers never observe a half-written file.
    pub fn write_frames(&self, kind: FileKind, frames: &[Bytes]) -> Result<()> {
        let target = self.path(kind);
        let temp = self.dir.join(format!("{}.tmp", kind.file_name()));

        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            let mut buf = Vec::new();
            for frame in frames {
                buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
                buf.extend_from_slice(frame);
            }
            file.write_all(&buf)?;
            file.sync_all()?;
        }

        fs::rename(&temp, &target)?;
        Ok(())
    }

    /// Read every complete frame of a file
    pub fn read_frames(&self, kind: FileKind) -> Result<Vec<Bytes>> {
        let log = self.open_log(kind)?;
        let mut iter = log.frames();
        let mut frames = Vec::new();
        for frame in &mut iter {
            let (_, bytes) = frame?;
            frames.push(bytes);
        }
        if iter.is_torn() {
            return Err(BlobError::CorruptRecord(format!(
                "{} ends with an incomplete frame",
                self.path(kind).display()
            )));
        }
        Ok(frames)
    }

    /// Remove the whole directory
    pub fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
