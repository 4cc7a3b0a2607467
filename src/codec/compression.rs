//! Payload compression
//!
//! Record payloads are stored as LZ4 blocks with the uncompressed size
//! prepended.

use crate::error::{BlobError, Result};

pub fn compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| BlobError::CorruptRecord(format!("payload decompression failed: {}", e)))
}
