//! Statement definitions
//!
//! Typed requests against a `DbManager`, one variant per operation, and the
//! results they produce. Executed by `DbManager::execute`.

use std::path::PathBuf;

use crate::compaction::CompactionReport;
use crate::config::DatabaseDescriptor;
use crate::database::{DatabaseInfo, InsertMode};
use crate::record::Record;

/// Statement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateDatabase,
    DropDatabase,
    ShowDatabases,
    InfoDatabase,
    Insert,
    Select,
    Delete,
    ListKeys,
    CreateSnapshot,
    Compact,
}

/// A parsed statement
#[derive(Debug, Clone)]
pub enum Statement {
    CreateDatabase { descriptor: DatabaseDescriptor },

    DropDatabase { name: String },

    ShowDatabases,

    InfoDatabase { name: String },

    Insert {
        database: String,
        record: Record,
        mode: InsertMode,
    },

    /// Read one key
    Select { database: String, key: String },

    Delete { database: String, key: String },

    ListKeys { database: String },

    CreateSnapshot { database: String },

    Compact { database: String },
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateDatabase { .. } => StatementKind::CreateDatabase,
            Statement::DropDatabase { .. } => StatementKind::DropDatabase,
            Statement::ShowDatabases => StatementKind::ShowDatabases,
            Statement::InfoDatabase { .. } => StatementKind::InfoDatabase,
            Statement::Insert { .. } => StatementKind::Insert,
            Statement::Select { .. } => StatementKind::Select,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::ListKeys { .. } => StatementKind::ListKeys,
            Statement::CreateSnapshot { .. } => StatementKind::CreateSnapshot,
            Statement::Compact { .. } => StatementKind::Compact,
        }
    }

    /// Whether the statement changes stored state
    pub fn is_write(&self) -> bool {
        !matches!(
            self.kind(),
            StatementKind::ShowDatabases
                | StatementKind::InfoDatabase
                | StatementKind::Select
                | StatementKind::ListKeys
        )
    }
}

/// Result of an executed statement
#[derive(Debug, Clone)]
pub enum QueryResult {
    /// Statement succeeded with nothing to return
    Done,

    Databases(Vec<String>),

    Info(DatabaseInfo),

    /// Revision assigned by an insert or delete
    Revision(u32),

    /// Outcome of a select; `None` when the key does not exist
    Record(Option<Record>),

    Keys(Vec<String>),

    Snapshot(PathBuf),

    Compaction(CompactionReport),
}
