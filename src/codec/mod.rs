//! Binary Codec Module
//!
//! The serialization substrate shared by records, index entries and bloom
//! filters.
//!
//! ## Field Encoding
//! ```text
//! u16 / u32 / u64   little-endian, fixed width
//! string            [len: u32][utf-8 bytes]
//! bytes             [len: u32][raw bytes]
//! ```
//!
//! Readers advance a cursor and report `CorruptRecord` when a field runs past
//! the end of the buffer.

mod byte_stream;
pub mod compression;

pub use byte_stream::{ByteReader, ByteWriter};
