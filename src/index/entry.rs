//! Index entry
//!
//! Locates one record inside the file that owns it.

use bytes::Bytes;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{BlobError, Result};
use crate::record::{RecordMeta, Status};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key_hash: u32,
    /// Offset of the record's length prefix in the owning file
    pub offset: i64,
    pub status: Status,
    pub revision: u32,
    pub version_chain: Vec<u32>,
}

impl IndexEntry {
    /// Entry for a record stored at `offset`
    pub fn for_record(meta: &RecordMeta, offset: u64) -> Self {
        Self {
            key_hash: meta.key_hash(),
            offset: offset as i64,
            status: meta.status,
            revision: meta.revision,
            version_chain: meta.version_chain.clone(),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.status == Status::Removed
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = ByteWriter::with_capacity(22 + 4 * self.version_chain.len());
        writer.put_u32(self.key_hash);
        writer.put_u64(self.offset as u64);
        writer.put_u16(self.status.as_u16());
        writer.put_u32(self.revision);
        writer.put_u32(self.version_chain.len() as u32);
        for version in &self.version_chain {
            writer.put_u32(*version);
        }
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let key_hash = reader.get_u32()?;
        let offset = reader.get_u64()? as i64;
        let status = Status::from_u16(reader.get_u16()?)?;
        let revision = reader.get_u32()?;

        let count = reader.get_u32()? as usize;
        if count > reader.remaining() / 4 {
            return Err(BlobError::CorruptRecord(format!(
                "index entry version chain of {} entries exceeds entry length",
                count
            )));
        }
        let mut version_chain = Vec::with_capacity(count);
        for _ in 0..count {
            version_chain.push(reader.get_u32()?);
        }

        Ok(Self {
            key_hash,
            offset,
            status,
            revision,
            version_chain,
        })
    }

    pub fn file_offset(&self) -> u64 {
        self.offset as u64
    }
}
