//! Error types for blobkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BlobError
pub type Result<T> = std::result::Result<T, BlobError>;

/// Unified error type for blobkv operations
#[derive(Debug, Error)]
pub enum BlobError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Decoding Errors
    // -------------------------------------------------------------------------
    /// A record, index entry or filter could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Write Conflicts
    // -------------------------------------------------------------------------
    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Wrong revision {revision} for key {key} (stored revision is {current})")]
    WrongRevision {
        key: String,
        revision: u32,
        current: u32,
    },

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Database Management Errors
    // -------------------------------------------------------------------------
    #[error("Database already exists: {0}")]
    DatabaseExists(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Invalid database descriptor: {0}")]
    InvalidDescriptor(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BlobError {
    fn from(e: bincode::Error) -> Self {
        BlobError::Serialization(e.to_string())
    }
}
