//! Database Manager
//!
//! Owns every open database of an instance.
//!
//! ## Responsibilities
//! - Persist the database registry (`{data_dir}/databases.bin`)
//! - Create, open and drop databases
//! - Route record operations to the named database
//! - Run scheduled compaction and publish its reports
//! - Execute `Statement`s

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use parking_lot::RwLock;

use crate::compaction::{CompactionReport, CompactionScheduler, Schedule};
use crate::config::{Config, DatabaseDescriptor};
use crate::database::{Database, DatabaseInfo, InsertMode};
use crate::error::{BlobError, Result};
use crate::record::Record;
use crate::statement::{QueryResult, Statement};

/// Registered databases
#[derive(Default)]
struct Catalog {
    databases: HashMap<String, Arc<Database>>,
    /// Persisted form, defaults filled in
    descriptors: BTreeMap<String, DatabaseDescriptor>,
}

/// Entry point for every database of an instance
pub struct DbManager {
    config: Config,
    catalog: RwLock<Catalog>,
    scheduler: CompactionScheduler,
}

impl DbManager {
    /// Open the instance rooted at `config.data_dir`, opening every
    /// registered database
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let manager = Self {
            catalog: RwLock::new(Catalog::default()),
            scheduler: CompactionScheduler::new(),
            config,
        };

        let descriptors = load_registry(&manager.config.registry_path())?;
        {
            let mut catalog = manager.catalog.write();
            for descriptor in descriptors {
                let db = Arc::new(Database::open(manager.config.resolve(&descriptor)?)?);
                manager.scheduler.register(db.clone())?;
                catalog.databases.insert(descriptor.name.clone(), db);
                catalog.descriptors.insert(descriptor.name.clone(), descriptor);
            }
            tracing::info!(
                data_dir = %manager.config.data_dir.display(),
                databases = catalog.databases.len(),
                "databases loaded"
            );
        }

        Ok(manager)
    }

    // =========================================================================
    // Database Lifecycle
    // =========================================================================

    /// Create a database; unset descriptor fields take the instance defaults
    pub fn create_database(&self, descriptor: DatabaseDescriptor) -> Result<Arc<Database>> {
        descriptor.validate()?;
        let mut catalog = self.catalog.write();
        if catalog.databases.contains_key(&descriptor.name) {
            return Err(BlobError::DatabaseExists(descriptor.name));
        }

        let descriptor = self.fill_defaults(descriptor);
        let db_config = self.config.resolve(&descriptor)?;
        Schedule::parse(&db_config.compaction)?;

        let db = Arc::new(Database::open(db_config)?);
        catalog
            .descriptors
            .insert(descriptor.name.clone(), descriptor.clone());
        if let Err(e) = save_registry(&self.config.registry_path(), &catalog.descriptors) {
            catalog.descriptors.remove(&descriptor.name);
            return Err(e);
        }
        catalog.databases.insert(descriptor.name.clone(), db.clone());
        self.scheduler.register(db.clone())?;

        tracing::info!(db = %descriptor.name, path = %db.path().display(), "database created");
        Ok(db)
    }

    /// Drop a database and delete its directory
    pub fn drop_database(&self, name: &str) -> Result<()> {
        let db = {
            let mut catalog = self.catalog.write();
            let db = catalog
                .databases
                .remove(name)
                .ok_or_else(|| BlobError::DatabaseNotFound(name.to_string()))?;
            catalog.descriptors.remove(name);
            save_registry(&self.config.registry_path(), &catalog.descriptors)?;
            db
        };

        self.scheduler.remove(name);
        match fs::remove_dir_all(db.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(db = %name, "database dropped");
        Ok(())
    }

    /// An open database by name
    pub fn database(&self, name: &str) -> Result<Arc<Database>> {
        self.catalog
            .read()
            .databases
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::DatabaseNotFound(name.to_string()))
    }

    /// Names of every database, sorted
    pub fn database_names(&self) -> Vec<String> {
        self.catalog.read().descriptors.keys().cloned().collect()
    }

    pub fn descriptor(&self, name: &str) -> Result<DatabaseDescriptor> {
        self.catalog
            .read()
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::DatabaseNotFound(name.to_string()))
    }

    /// Stop background compaction and sync every database
    pub fn close(&self) -> Result<()> {
        self.scheduler.shutdown();
        let databases: Vec<_> = self.catalog.read().databases.values().cloned().collect();
        for db in databases {
            db.close()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    pub fn insert(&self, db: &str, record: Record, mode: InsertMode) -> Result<u32> {
        self.database(db)?.insert(record, mode)
    }

    pub fn get(&self, db: &str, key: &str) -> Result<Option<Record>> {
        self.database(db)?.get(key)
    }

    pub fn delete(&self, db: &str, key: &str) -> Result<u32> {
        self.database(db)?.delete(key)
    }

    pub fn list_keys(&self, db: &str) -> Result<Vec<String>> {
        self.database(db)?.list_keys()
    }

    pub fn info(&self, db: &str) -> Result<DatabaseInfo> {
        Ok(self.database(db)?.info())
    }

    pub fn create_snapshot(&self, db: &str) -> Result<std::path::PathBuf> {
        self.database(db)?.snapshot()
    }

    /// Compact now and publish the report alongside scheduled runs
    pub fn compact(&self, db: &str) -> Result<CompactionReport> {
        let report = self.database(db)?.compact()?;
        self.scheduler.publish(report.clone());
        Ok(report)
    }

    /// Reports of every compaction of `db`
    pub fn compaction_events(&self, db: &str) -> Result<Receiver<CompactionReport>> {
        self.scheduler
            .events(db)
            .ok_or_else(|| BlobError::DatabaseNotFound(db.to_string()))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Execute a statement
    ///
    /// Routes statements to the matching operation
    pub fn execute(&self, statement: Statement) -> Result<QueryResult> {
        tracing::debug!(kind = ?statement.kind(), "executing statement");
        match statement {
            Statement::CreateDatabase { descriptor } => {
                self.create_database(descriptor)?;
                Ok(QueryResult::Done)
            }
            Statement::DropDatabase { name } => {
                self.drop_database(&name)?;
                Ok(QueryResult::Done)
            }
            Statement::ShowDatabases => Ok(QueryResult::Databases(self.database_names())),
            Statement::InfoDatabase { name } => Ok(QueryResult::Info(self.info(&name)?)),
            Statement::Insert {
                database,
                record,
                mode,
            } => Ok(QueryResult::Revision(self.insert(&database, record, mode)?)),
            Statement::Select { database, key } => {
                Ok(QueryResult::Record(self.get(&database, &key)?))
            }
            Statement::Delete { database, key } => {
                Ok(QueryResult::Revision(self.delete(&database, &key)?))
            }
            Statement::ListKeys { database } => Ok(QueryResult::Keys(self.list_keys(&database)?)),
            Statement::CreateSnapshot { database } => {
                Ok(QueryResult::Snapshot(self.create_snapshot(&database)?))
            }
            Statement::Compact { database } => {
                Ok(QueryResult::Compaction(self.compact(&database)?))
            }
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Persisted descriptors carry every setting, so later changes to the
    /// instance defaults do not move or reconfigure existing databases
    fn fill_defaults(&self, mut descriptor: DatabaseDescriptor) -> DatabaseDescriptor {
        let config = &self.config;
        if descriptor.path.is_none() {
            descriptor.path = Some(config.data_dir.join(&descriptor.name));
        }
        descriptor.max_segment_size.get_or_insert(config.max_segment_size);
        descriptor.max_cache_size.get_or_insert(config.max_cache_size);
        descriptor.bloom_filter_fp.get_or_insert(config.bloom_filter_fp);
        if descriptor
            .compaction
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
        {
            descriptor.compaction = Some(config.compaction.clone());
        }
        descriptor
    }
}

impl Drop for DbManager {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

fn load_registry(path: &Path) -> Result<Vec<DatabaseDescriptor>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Write the registry to a temporary file and rename it into place
fn save_registry(path: &Path, descriptors: &BTreeMap<String, DatabaseDescriptor>) -> Result<()> {
    let list: Vec<&DatabaseDescriptor> = descriptors.values().collect();
    let bytes = bincode::serialize(&list)?;

    let temp = path.with_extension("bin.tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}
