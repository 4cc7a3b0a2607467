//! Record definitions
//!
//! A record is one stored object (image) together with its revision metadata.
//!
//! ## On-disk Layout
//! ```text
//! ┌──────────┬────────────┬───────────┬──────────┬─────────────┐
//! │ key: str │ token: str │ size: u32 │ ext: str │ status: u16 │
//! ├──────────┴────────┬───┴───────────┴──────────┴─────────────┤
//! │ revision: u32     │ version_count: u32 │ version_count x u32│
//! ├───────────────────┴────────────────────┴────────────────────┤
//! │ payload: bytes (LZ4, uncompressed size prepended)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//! The file store wraps the encoded record as `[len: u32][record]`.

use bytes::Bytes;

use crate::codec::{compression, ByteReader, ByteWriter};
use crate::error::{BlobError, Result};
use crate::hash::key_hash;

/// Liveness of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Active = 1,
    /// Tombstone: the key is logically deleted
    Removed = 2,
}

impl Status {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Status::Active),
            2 => Ok(Status::Removed),
            other => Err(BlobError::CorruptRecord(format!(
                "unknown record status {}",
                other
            ))),
        }
    }
}

/// A stored object and its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    /// Time-ordered token, doubles as the insertion timestamp
    pub token: String,
    pub ext: String,
    /// Uncompressed payload length
    pub size: u32,
    pub status: Status,
    pub revision: u32,
    /// Revisions previously written for this key, oldest first
    pub version_chain: Vec<u32>,
    pub payload: Vec<u8>,
}

/// Everything in a record except its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub key: String,
    pub token: String,
    pub ext: String,
    pub size: u32,
    pub status: Status,
    pub revision: u32,
    pub version_chain: Vec<u32>,
}

impl Record {
    /// Create an active record with a fresh token
    pub fn new(key: impl Into<String>, ext: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            token: new_token(),
            ext: ext.into(),
            size: payload.len() as u32,
            status: Status::Active,
            revision: 0,
            version_chain: Vec::new(),
            payload,
        }
    }

    pub fn key_hash(&self) -> u32 {
        key_hash(&self.key)
    }

    pub fn is_removed(&self) -> bool {
        self.status == Status::Removed
    }

    /// Encode to the on-disk layout (payload compressed)
    pub fn encode(&self) -> Bytes {
        let compressed = compression::compress(&self.payload);
        let mut writer = ByteWriter::with_capacity(
            32 + self.key.len()
                + self.token.len()
                + self.ext.len()
                + 4 * self.version_chain.len()
                + compressed.len(),
        );
        writer.put_string(&self.key);
        writer.put_string(&self.token);
        writer.put_u32(self.size);
        writer.put_string(&self.ext);
        writer.put_u16(self.status.as_u16());
        writer.put_u32(self.revision);
        writer.put_u32(self.version_chain.len() as u32);
        for version in &self.version_chain {
            writer.put_u32(*version);
        }
        writer.put_bytes(&compressed);
        writer.finish()
    }

    /// Decode a full record, decompressing its payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let meta = RecordMeta::read(&mut reader)?;
        let compressed = reader.get_bytes()?;
        let payload = compression::decompress(compressed)?;

        if payload.len() != meta.size as usize {
            return Err(BlobError::CorruptRecord(format!(
                "payload of {} is {} bytes, header says {}",
                meta.key,
                payload.len(),
                meta.size
            )));
        }

        Ok(Self {
            key: meta.key,
            token: meta.token,
            ext: meta.ext,
            size: meta.size,
            status: meta.status,
            revision: meta.revision,
            version_chain: meta.version_chain,
            payload,
        })
    }

    /// Decode the metadata only, skipping payload decompression
    pub fn decode_meta(bytes: &[u8]) -> Result<RecordMeta> {
        let mut reader = ByteReader::new(bytes);
        RecordMeta::read(&mut reader)
    }
}

impl RecordMeta {
    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let key = reader.get_string()?;
        let token = reader.get_string()?;
        let size = reader.get_u32()?;
        let ext = reader.get_string()?;
        let status = Status::from_u16(reader.get_u16()?)?;
        let revision = reader.get_u32()?;

        let version_count = reader.get_u32()? as usize;
        if version_count > reader.remaining() / 4 {
            return Err(BlobError::CorruptRecord(format!(
                "version chain of {} entries exceeds record length",
                version_count
            )));
        }
        let mut version_chain = Vec::with_capacity(version_count);
        for _ in 0..version_count {
            version_chain.push(reader.get_u32()?);
        }

        Ok(Self {
            key,
            token,
            ext,
            size,
            status,
            revision,
            version_chain,
        })
    }

    pub fn key_hash(&self) -> u32 {
        key_hash(&self.key)
    }

    /// Tombstone superseding this record: same key and extension, removed,
    /// empty payload, `revision` appended to the version chain
    pub fn into_tombstone(self, revision: u32) -> Record {
        let mut version_chain = self.version_chain;
        version_chain.push(revision);
        Record {
            key: self.key,
            token: new_token(),
            ext: self.ext,
            size: 0,
            status: Status::Removed,
            revision,
            version_chain,
            payload: Vec::new(),
        }
    }
}

/// Generate a time-ordered record token
pub fn new_token() -> String {
    uuid::Uuid::now_v7().to_string()
}
