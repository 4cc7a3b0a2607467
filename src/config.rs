//! Configuration for blobkv
//!
//! Centralized configuration with sensible defaults.
//!
//! - `Config`: manager-wide settings and the defaults every database inherits
//! - `DatabaseDescriptor`: what a user asks for when creating a database
//!   (persisted in the registry, every setting optional)
//! - `DatabaseConfig`: fully resolved settings a `Database` is opened with

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BlobError, Result};

/// Main configuration for a blobkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── databases.bin          (database registry)
    ///     └── {name}/                (one directory per database)
    ///           ├── commitlog/       (live commit log)
    ///           └── {unix nanos}/    (sealed segments)
    pub data_dir: PathBuf,

    /// How often the commit log is fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Database Defaults
    // -------------------------------------------------------------------------
    /// Commit log size that triggers rotation into a sealed segment (bytes)
    pub max_segment_size: u64,

    /// Cache capacity per database (bytes)
    pub max_cache_size: u64,

    /// Target false-positive rate of each segment's bloom filter
    pub bloom_filter_fp: f64,

    /// Compaction schedule expression, see `compaction::Schedule`
    pub compaction: String,
}

/// Commit log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced writes
    EveryNWrites { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blobkv_data"),
            sync_strategy: SyncStrategy::EveryNWrites { count: 100 },
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            max_cache_size: 32 * 1024 * 1024,   // 32 MB
            bloom_filter_fp: 0.01,
            compaction: "@daily".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Path of the persisted database registry
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("databases.bin")
    }

    /// Resolve a descriptor against these defaults
    pub fn resolve(&self, descriptor: &DatabaseDescriptor) -> Result<DatabaseConfig> {
        descriptor.validate()?;

        let path = descriptor
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(&descriptor.name));

        let config = DatabaseConfig {
            name: descriptor.name.clone(),
            path,
            snapshot_path: descriptor.snapshot_path.clone(),
            max_segment_size: descriptor.max_segment_size.unwrap_or(self.max_segment_size),
            max_cache_size: descriptor.max_cache_size.unwrap_or(self.max_cache_size),
            bloom_filter_fp: descriptor.bloom_filter_fp.unwrap_or(self.bloom_filter_fp),
            compaction: descriptor
                .compaction
                .clone()
                .unwrap_or_else(|| self.compaction.clone()),
            sync_strategy: self.sync_strategy,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the default segment size limit (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the default cache capacity (in bytes)
    pub fn max_cache_size(mut self, size: u64) -> Self {
        self.config.max_cache_size = size;
        self
    }

    pub fn bloom_filter_fp(mut self, rate: f64) -> Self {
        self.config.bloom_filter_fp = rate;
        self
    }

    pub fn compaction(mut self, schedule: impl Into<String>) -> Self {
        self.config.compaction = schedule.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Per-database settings
// =============================================================================

/// A database as requested by a user and stored in the registry
///
/// Unset fields fall back to the manager's `Config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub path: Option<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub max_segment_size: Option<u64>,
    pub max_cache_size: Option<u64>,
    pub bloom_filter_fp: Option<f64>,
    pub compaction: Option<String>,
}

impl DatabaseDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            snapshot_path: None,
            max_segment_size: None,
            max_cache_size: None,
            bloom_filter_fp: None,
            compaction: None,
        }
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = Some(size);
        self
    }

    pub fn max_cache_size(mut self, size: u64) -> Self {
        self.max_cache_size = Some(size);
        self
    }

    pub fn bloom_filter_fp(mut self, rate: f64) -> Self {
        self.bloom_filter_fp = Some(rate);
        self
    }

    pub fn compaction(mut self, schedule: impl Into<String>) -> Self {
        self.compaction = Some(schedule.into());
        self
    }

    /// Names are 3 to 50 ASCII alphanumeric characters
    pub fn validate(&self) -> Result<()> {
        let len = self.name.chars().count();
        if !(3..=50).contains(&len) {
            return Err(BlobError::InvalidDescriptor(format!(
                "name '{}' must be 3 to 50 characters long",
                self.name
            )));
        }
        if !self.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BlobError::InvalidDescriptor(format!(
                "name '{}' must be alphanumeric",
                self.name
            )));
        }
        Ok(())
    }
}

/// Resolved settings of one database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    /// Directory holding the commit log and every sealed segment
    pub path: PathBuf,
    /// Where snapshots are created, `{path}/snapshots` when unset
    pub snapshot_path: Option<PathBuf>,
    pub max_segment_size: u64,
    pub max_cache_size: u64,
    pub bloom_filter_fp: f64,
    pub compaction: String,
    pub sync_strategy: SyncStrategy,
}

impl DatabaseConfig {
    /// Builder starting from `Config::default()` values
    pub fn builder(name: impl Into<String>, path: impl Into<PathBuf>) -> DatabaseConfigBuilder {
        let defaults = Config::default();
        DatabaseConfigBuilder {
            config: DatabaseConfig {
                name: name.into(),
                path: path.into(),
                snapshot_path: None,
                max_segment_size: defaults.max_segment_size,
                max_cache_size: defaults.max_cache_size,
                bloom_filter_fp: defaults.bloom_filter_fp,
                compaction: defaults.compaction,
                sync_strategy: defaults.sync_strategy,
            },
        }
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| self.path.join("snapshots"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(BlobError::Config(format!(
                "{}: max_segment_size must be positive",
                self.name
            )));
        }
        if !(self.bloom_filter_fp > 0.0 && self.bloom_filter_fp < 1.0) {
            return Err(BlobError::Config(format!(
                "{}: bloom_filter_fp must be in (0, 1), got {}",
                self.name, self.bloom_filter_fp
            )));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(BlobError::Config(format!(
                "{}: sync every 0 writes",
                self.name
            )));
        }
        Ok(())
    }
}

/// Builder for DatabaseConfig
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    pub fn max_cache_size(mut self, size: u64) -> Self {
        self.config.max_cache_size = size;
        self
    }

    pub fn bloom_filter_fp(mut self, rate: f64) -> Self {
        self.config.bloom_filter_fp = rate;
        self
    }

    pub fn compaction(mut self, schedule: impl Into<String>) -> Self {
        self.config.compaction = schedule.into();
        self
    }

    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}
