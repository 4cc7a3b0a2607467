//! Bloom filter
//!
//! Built once per sealed segment from its Summary. Members are the decimal
//! string form of each key hash; probes use double hashing over murmur3.
//!
//! ## File Format
//! ```text
//! [size: u32][hash_count: u32][bits: ceil(size / 8) bytes, LSB first]
//! ```

use bytes::Bytes;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{BlobError, Result};
use crate::hash::murmur3_32;

use super::Summary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Number of bits (m)
    size: u32,
    /// Number of probes per key (k)
    hash_count: u32,
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Filter sized for `expected` members at false-positive rate `fp_rate`
    pub fn new(expected: usize, fp_rate: f64) -> Self {
        let n = expected.max(1) as f64;
        let p = fp_rate.clamp(f64::MIN_POSITIVE, 0.999_999);
        let ln2 = std::f64::consts::LN_2;

        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(1.0);
        let k = ((m / n) * ln2).round().max(1.0);

        let size = m.min(u32::MAX as f64) as u32;
        Self {
            size,
            hash_count: k as u32,
            bits: vec![0u8; bit_bytes(size)],
        }
    }

    /// Build a filter holding every key hash of a summary
    pub fn from_summary(summary: &Summary, fp_rate: f64) -> Self {
        let mut filter = Self::new(summary.len(), fp_rate);
        for entry in summary.iter() {
            filter.add_hash(entry.key_hash);
        }
        filter
    }

    pub fn add(&mut self, key: &str) {
        for bit in self.probes(key) {
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// `false` means definitely absent
    pub fn contains(&self, key: &str) -> bool {
        self.probes(key)
            .all(|bit| self.bits[bit / 8] & (1 << (bit % 8)) != 0)
    }

    pub fn add_hash(&mut self, key_hash: u32) {
        self.add(&key_hash.to_string());
    }

    pub fn contains_hash(&self, key_hash: u32) -> bool {
        self.contains(&key_hash.to_string())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    fn probes(&self, key: &str) -> impl Iterator<Item = usize> {
        let h1 = murmur3_32(key.as_bytes(), 0);
        let h2 = murmur3_32(key.as_bytes(), h1);
        let m = self.size as u64;
        (0..self.hash_count as u64)
            .map(move |i| ((h1 as u64 + i * h2 as u64) % m) as usize)
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = ByteWriter::with_capacity(8 + self.bits.len());
        writer.put_u32(self.size);
        writer.put_u32(self.hash_count);
        writer.put_raw(&self.bits);
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let size = reader.get_u32()?;
        let hash_count = reader.get_u32()?;
        if size == 0 || hash_count == 0 {
            return Err(BlobError::CorruptRecord(format!(
                "bloom filter with size {} and hash count {}",
                size, hash_count
            )));
        }

        let bits = reader.get_raw(bit_bytes(size))?.to_vec();
        Ok(Self {
            size,
            hash_count,
            bits,
        })
    }
}

fn bit_bytes(size: u32) -> usize {
    (size as usize + 7) / 8
}
