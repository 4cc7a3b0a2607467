//! Index Module
//!
//! Per-segment lookup structures.
//!
//! ## Responsibilities
//! - `IndexEntry`: where a record lives in its file, plus its status/revision
//! - `Summary`: key hash → entry for one segment or the commit log
//! - `BloomFilter`: probabilistic membership test, built once per sealed segment
//!
//! ## Index File Format
//! ```text
//! [len: u32][key_hash: u32][offset: u64][status: u16][revision: u32]
//!           [version_count: u32][version_count x u32]
//! ... one frame per entry
//! ```

mod bloom;
mod entry;
mod summary;

pub use bloom::BloomFilter;
pub use entry::IndexEntry;
pub use summary::Summary;
