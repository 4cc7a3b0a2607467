//! # blobkv
//!
//! A log-structured binary object store with:
//! - Append-only commit log with torn-tail recovery
//! - Immutable sealed segments, each with an index and a bloom filter
//! - Per-key revisions and tombstone deletes
//! - LRU cache of recently written and read records
//! - Scheduled compaction that purges deleted keys
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DbManager                             │
//! │       (registry, statements, compaction scheduler)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Database                              │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!       ┌───────────────┼────────────────┐
//!       │               │                │
//!       ▼               ▼                ▼
//! ┌───────────┐  ┌─────────────┐  ┌──────────────┐
//! │   Cache   │  │ Commit Log  │  │ Data Holders │
//! │   (LRU)   │  │  (Append)   │  │  (Sealed)    │
//! └───────────┘  └──────┬──────┘  └──────┬───────┘
//!                       │ rotation       │
//!                       └───────►────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod hash;
pub mod record;
pub mod storage;
pub mod index;
pub mod segment;
pub mod cache;
pub mod compaction;
pub mod database;
pub mod manager;
pub mod statement;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlobError, Result};
pub use config::{Config, DatabaseConfig, DatabaseDescriptor, SyncStrategy};
pub use database::{Database, DatabaseInfo, InsertMode};
pub use manager::DbManager;
pub use record::{Record, Status};
pub use statement::{QueryResult, Statement};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blobkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
