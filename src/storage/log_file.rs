//! Log file handle
//!
//! An open file that is only ever appended to with length-prefixed frames and
//! read back at frame offsets.
//!
//! The handle stays usable after its file is renamed or its directory is
//! removed, so readers racing a rotation or compaction keep working.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{BlobError, Result};

use super::FRAME_HEADER_SIZE;

/// Append-only, randomly readable file of length-prefixed frames
pub struct LogFile {
    /// Path at open time (informational once the file has been renamed)
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    /// Logical length: everything before it is fully written
    len: u64,
    #[cfg(test)]
    faults: Faults,
}

/// Failures armed by unit tests
#[cfg(test)]
#[derive(Default)]
struct Faults {
    /// Fail the next append after writing this many bytes of its frame
    write_after: Option<usize>,
    /// Fail the next sync
    sync: bool,
}

impl LogFile {
    /// Open or create a log file
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                len,
                #[cfg(test)]
                faults: Faults::default(),
            }),
        })
    }

    /// Append one frame, returning the offset of its length prefix
    ///
    /// If the write fails part way, the file is truncated back to its previous
    /// length before the error is returned.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.len;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);

        if let Err(e) = inner.write_frame(offset, &frame) {
            if let Err(truncate_err) = inner.file.set_len(offset) {
                tracing::error!(
                    path = %self.path.display(),
                    offset,
                    error = %truncate_err,
                    "failed to truncate after partial append"
                );
            }
            return Err(BlobError::Io(e));
        }

        inner.len = offset + frame.len() as u64;
        Ok(offset)
    }

    /// Read the frame whose length prefix starts at `offset`
    pub fn read_at(&self, offset: u64) -> Result<Bytes> {
        let mut inner = self.inner.lock();
        let end = inner.len;
        match inner.read_frame(offset, end)? {
            Some(bytes) => Ok(bytes),
            None => Err(BlobError::CorruptRecord(format!(
                "frame at offset {} of {} runs past end of file ({} bytes)",
                offset,
                self.path.display(),
                end
            ))),
        }
    }

    /// Current logical size in bytes
    pub fn size(&self) -> u64 {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Cut the file back to `offset` bytes
    pub fn truncate(&self, offset: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(offset)?;
        inner.len = offset;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        #[allow(unused_mut)]
        let mut inner = self.inner.lock();
        #[cfg(test)]
        if std::mem::take(&mut inner.faults.sync) {
            return Err(BlobError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "sync failed",
            )));
        }
        inner.file.sync_data()?;
        Ok(())
    }

    /// Iterate every frame from the start of the file
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            file: self,
            offset: 0,
            end: self.size(),
            torn: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Inner {
    fn write_frame(&mut self, offset: u64, frame: &[u8]) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        #[cfg(test)]
        if let Some(written) = self.faults.write_after.take() {
            self.file.write_all(&frame[..written.min(frame.len())])?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write failed",
            ));
        }
        self.file.write_all(frame)
    }

    /// Read a frame, `None` if it does not fit before `end`
    fn read_frame(&mut self, offset: u64, end: u64) -> Result<Option<Bytes>> {
        match offset.checked_add(FRAME_HEADER_SIZE) {
            Some(header_end) if header_end <= end => {}
            _ => return Ok(None),
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; FRAME_HEADER_SIZE as usize];
        self.file.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header) as u64;

        match offset.checked_add(FRAME_HEADER_SIZE + len) {
            Some(frame_end) if frame_end <= end => {}
            _ => return Ok(None),
        }

        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload)?;
        Ok(Some(Bytes::from(payload)))
    }
}

/// Sequential iterator over `(offset, payload)` frames
///
/// Stops at the first frame that does not fit in the file; `is_torn` then
/// reports whether trailing bytes were left over and `valid_len` where the
/// last complete frame ends.
pub struct Frames<'a> {
    file: &'a LogFile,
    offset: u64,
    end: u64,
    torn: bool,
}

impl Frames<'_> {
    /// Byte length covered by complete frames so far
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    pub fn is_torn(&self) -> bool {
        self.torn
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.torn || self.offset >= self.end {
            return None;
        }

        let mut inner = self.file.inner.lock();
        match inner.read_frame(self.offset, self.end) {
            Ok(Some(bytes)) => {
                let offset = self.offset;
                self.offset += FRAME_HEADER_SIZE + bytes.len() as u64;
                Some(Ok((offset, bytes)))
            }
            Ok(None) => {
                self.torn = true;
                None
            }
            Err(e) => {
                self.torn = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
impl LogFile {
    pub(crate) fn fail_next_write_after(&self, written: usize) {
        self.inner.lock().faults.write_after = Some(written);
    }

    pub(crate) fn fail_next_sync(&self) {
        self.inner.lock().faults.sync = true;
    }
}
