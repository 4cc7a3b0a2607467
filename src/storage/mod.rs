//! Storage Module
//!
//! File primitives every segment is built on.
//!
//! ## Responsibilities
//! - Address files inside a directory by logical kind (`FileKind`)
//! - Length-prefixed appends that never leave a dangling prefix
//! - Self-describing random reads (`read_at`)
//! - Sequential frame iteration with torn-tail detection
//!
//! ## Frame Format
//! ```text
//! ┌─────────────┬──────────────────────────┐
//! │ Len (4, LE) │ Payload (Len bytes)      │
//! └─────────────┴──────────────────────────┘
//! ... repeated until EOF
//! ```

mod file_store;
mod log_file;

pub use file_store::{FileKind, FileStore};
pub use log_file::{Frames, LogFile};

/// Size of the length prefix in front of every frame
pub const FRAME_HEADER_SIZE: u64 = 4;
