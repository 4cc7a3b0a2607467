//! Byte stream reader and writer
//!
//! Cursor-based encoding of length-prefixed primitive fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BlobError, Result};

/// Appends encoded fields to a growable buffer
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Length-prefixed UTF-8 string
    pub fn put_string(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    /// Length-prefixed raw bytes
    pub fn put_bytes(&mut self, value: &[u8]) {
        self.buf.put_u32_le(value.len() as u32);
        self.buf.put_slice(value);
    }

    /// Bytes without a length prefix; the reader must know the length
    pub fn put_raw(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, returning the encoded bytes
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads encoded fields from a byte slice, advancing a cursor
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.buf.has_remaining()
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.ensure(2, "u16")?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.ensure(4, "u32")?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.ensure(8, "u64")?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_string(&mut self) -> Result<String> {
        let raw = self.get_bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|e| {
            BlobError::CorruptRecord(format!("invalid UTF-8 string field: {}", e))
        })
    }

    /// Borrow a length-prefixed byte field without copying
    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.get_raw(len)
    }

    /// Borrow exactly `len` bytes that carry no length prefix
    pub fn get_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len, "raw field")?;
        let buf: &'a [u8] = self.buf;
        let (field, rest) = buf.split_at(len);
        self.buf = rest;
        Ok(field)
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(BlobError::CorruptRecord(format!(
                "{} at position {} needs {} bytes, {} remaining",
                what,
                self.position(),
                needed,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
