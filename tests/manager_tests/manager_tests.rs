//! Tests for DbManager
//!
//! These tests verify:
//! - Creating, listing and dropping databases
//! - The registry survives a restart
//! - Descriptor validation and default filling
//! - Record operations routed by database name
//! - Statement execution

use std::time::Duration;

use blobkv::config::{Config, DatabaseDescriptor, SyncStrategy};
use blobkv::database::InsertMode;
use blobkv::manager::DbManager;
use blobkv::record::Record;
use blobkv::statement::{QueryResult, Statement, StatementKind};
use blobkv::BlobError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(temp: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp.path())
        .sync_strategy(SyncStrategy::EveryWrite)
        .compaction("@never")
        .build()
}

fn setup_manager() -> (TempDir, DbManager) {
    let temp_dir = TempDir::new().unwrap();
    let manager = DbManager::open(config(&temp_dir)).unwrap();
    (temp_dir, manager)
}

// =============================================================================
// Database Lifecycle Tests
// =============================================================================

#[test]
fn test_create_and_list() {
    let (temp, manager) = setup_manager();

    manager.create_database(DatabaseDescriptor::new("photos")).unwrap();
    manager.create_database(DatabaseDescriptor::new("avatars")).unwrap();

    assert_eq!(manager.database_names(), vec!["avatars", "photos"]);
    assert!(temp.path().join("photos").is_dir());
    assert!(temp.path().join("databases.bin").is_file());
}

#[test]
fn test_create_duplicate_fails() {
    let (_temp, manager) = setup_manager();
    manager.create_database(DatabaseDescriptor::new("photos")).unwrap();

    let result = manager.create_database(DatabaseDescriptor::new("photos"));
    assert!(matches!(result, Err(BlobError::DatabaseExists(name)) if name == "photos"));
}

#[test]
fn test_invalid_descriptors() {
    let (_temp, manager) = setup_manager();

    let too_long = "x".repeat(51);
    for name in ["ab", "has space", "dash-name", too_long.as_str()] {
        assert!(matches!(
            manager.create_database(DatabaseDescriptor::new(name)),
            Err(BlobError::InvalidDescriptor(_))
        ));
    }
    assert!(matches!(
        manager.create_database(DatabaseDescriptor::new("valid").compaction("@every 5w")),
        Err(BlobError::Config(_))
    ));
    assert!(matches!(
        manager.create_database(
            DatabaseDescriptor::new("valid").compaction("@every 9999999999999999999d")
        ),
        Err(BlobError::Config(_))
    ));
    assert!(manager.database_names().is_empty());
}

#[test]
fn test_defaults_are_filled_in() {
    let (temp, manager) = setup_manager();
    manager
        .create_database(DatabaseDescriptor::new("photos").max_cache_size(1234))
        .unwrap();

    let descriptor = manager.descriptor("photos").unwrap();
    assert_eq!(descriptor.path, Some(temp.path().join("photos")));
    assert_eq!(descriptor.max_cache_size, Some(1234));
    assert_eq!(descriptor.max_segment_size, Some(64 * 1024 * 1024));
    assert_eq!(descriptor.bloom_filter_fp, Some(0.01));
    assert_eq!(descriptor.compaction.as_deref(), Some("@never"));
}

#[test]
fn test_custom_path() {
    let (temp, manager) = setup_manager();
    let custom = temp.path().join("elsewhere").join("store");

    let db = manager
        .create_database(DatabaseDescriptor::new("custom").path(&custom))
        .unwrap();

    assert_eq!(db.path(), custom.as_path());
    assert!(custom.join("commitlog").is_dir());
}

#[test]
fn test_drop_database() {
    let (temp, manager) = setup_manager();
    manager.create_database(DatabaseDescriptor::new("photos")).unwrap();

    manager.drop_database("photos").unwrap();

    assert!(manager.database_names().is_empty());
    assert!(!temp.path().join("photos").exists());
    assert!(matches!(
        manager.database("photos"),
        Err(BlobError::DatabaseNotFound(_))
    ));
    assert!(matches!(
        manager.drop_database("photos"),
        Err(BlobError::DatabaseNotFound(_))
    ));
}

#[test]
fn test_registry_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        let manager = DbManager::open(config(&temp_dir)).unwrap();
        manager.create_database(DatabaseDescriptor::new("photos")).unwrap();
        manager.create_database(DatabaseDescriptor::new("gone")).unwrap();
        manager
            .insert("photos", Record::new("cat.png", "png", b"meow".to_vec()), InsertMode::Create)
            .unwrap();
        manager.drop_database("gone").unwrap();
        manager.close().unwrap();
    }

    let manager = DbManager::open(config(&temp_dir)).unwrap();
    assert_eq!(manager.database_names(), vec!["photos"]);
    assert_eq!(
        manager.get("photos", "cat.png").unwrap().unwrap().payload,
        b"meow"
    );
}

// =============================================================================
// Record Operation Tests
// =============================================================================

#[test]
fn test_record_operations() {
    let (_temp, manager) = setup_manager();
    manager.create_database(DatabaseDescriptor::new("photos")).unwrap();

    let revision = manager
        .insert("photos", Record::new("a.png", "png", vec![1; 10]), InsertMode::Create)
        .unwrap();
    assert_eq!(revision, 0);
    assert_eq!(manager.list_keys("photos").unwrap(), vec!["a.png"]);

    let info = manager.info("photos").unwrap();
    assert_eq!(info.cache_items, 1);

    assert_eq!(manager.delete("photos", "a.png").unwrap(), 1);
    assert!(manager.get("photos", "a.png").unwrap().is_none());

    assert!(matches!(
        manager.get("nope", "a.png"),
        Err(BlobError::DatabaseNotFound(_))
    ));
}

#[test]
fn test_snapshot_uses_descriptor_path() {
    let (temp, manager) = setup_manager();
    let snapshots = temp.path().join("backups");
    manager
        .create_database(DatabaseDescriptor::new("photos").snapshot_path(&snapshots))
        .unwrap();
    manager
        .insert("photos", Record::new("a", "", vec![1]), InsertMode::Create)
        .unwrap();

    let snapshot = manager.create_snapshot("photos").unwrap();
    assert!(snapshot.starts_with(&snapshots));
    assert!(snapshot.join("commitlog").is_dir());
}

#[test]
fn test_manual_compaction_is_published() {
    let (_temp, manager) = setup_manager();
    manager.create_database(DatabaseDescriptor::new("photos")).unwrap();
    let events = manager.compaction_events("photos").unwrap();

    manager
        .insert("photos", Record::new("a", "", vec![1]), InsertMode::Create)
        .unwrap();
    manager.delete("photos", "a").unwrap();
    manager.database("photos").unwrap().rotate().unwrap();

    let report = manager.compact("photos").unwrap();
    assert_eq!(report.keys_purged, 1);
    assert_eq!(
        events.recv_timeout(Duration::from_secs(1)).unwrap(),
        report
    );
}

// =============================================================================
// Statement Tests
// =============================================================================

#[test]
fn test_execute_statements() {
    let (_temp, manager) = setup_manager();

    let created = manager
        .execute(Statement::CreateDatabase {
            descriptor: DatabaseDescriptor::new("photos"),
        })
        .unwrap();
    assert!(matches!(created, QueryResult::Done));

    let inserted = manager
        .execute(Statement::Insert {
            database: "photos".to_string(),
            record: Record::new("a.png", "png", b"data".to_vec()),
            mode: InsertMode::Upsert,
        })
        .unwrap();
    assert!(matches!(inserted, QueryResult::Revision(0)));

    match manager
        .execute(Statement::Select {
            database: "photos".to_string(),
            key: "a.png".to_string(),
        })
        .unwrap()
    {
        QueryResult::Record(Some(record)) => assert_eq!(record.payload, b"data"),
        other => panic!("unexpected result {:?}", other),
    }

    match manager.execute(Statement::ShowDatabases).unwrap() {
        QueryResult::Databases(names) => assert_eq!(names, vec!["photos"]),
        other => panic!("unexpected result {:?}", other),
    }

    match manager
        .execute(Statement::ListKeys {
            database: "photos".to_string(),
        })
        .unwrap()
    {
        QueryResult::Keys(keys) => assert_eq!(keys, vec!["a.png"]),
        other => panic!("unexpected result {:?}", other),
    }

    match manager
        .execute(Statement::InfoDatabase {
            name: "photos".to_string(),
        })
        .unwrap()
    {
        QueryResult::Info(info) => assert_eq!(info.segment_count, 0),
        other => panic!("unexpected result {:?}", other),
    }

    assert!(matches!(
        manager
            .execute(Statement::Delete {
                database: "photos".to_string(),
                key: "a.png".to_string(),
            })
            .unwrap(),
        QueryResult::Revision(1)
    ));

    assert!(matches!(
        manager
            .execute(Statement::Compact {
                database: "photos".to_string(),
            })
            .unwrap(),
        QueryResult::Compaction(_)
    ));

    assert!(matches!(
        manager
            .execute(Statement::CreateSnapshot {
                database: "photos".to_string(),
            })
            .unwrap(),
        QueryResult::Snapshot(_)
    ));

    assert!(matches!(
        manager
            .execute(Statement::DropDatabase {
                name: "photos".to_string(),
            })
            .unwrap(),
        QueryResult::Done
    ));
}

#[test]
fn test_statement_kinds() {
    let select = Statement::Select {
        database: "photos".to_string(),
        key: "k".to_string(),
    };
    assert_eq!(select.kind(), StatementKind::Select);
    assert!(!select.is_write());

    let compact = Statement::Compact {
        database: "photos".to_string(),
    };
    assert!(compact.is_write());
    assert!(!Statement::ShowDatabases.is_write());
}
