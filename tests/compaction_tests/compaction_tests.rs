//! Tests for compaction
//!
//! These tests verify:
//! - Tombstoned keys are purged and live keys survive
//! - Segments holding purged keys are deleted from disk
//! - Segments without tombstones are left untouched
//! - Tombstones shadowed by a newer write do not purge that write
//! - Superseded revisions are not resurrected
//! - Compaction running alongside inserts and deletes loses no write
//! - Scheduling and report publication

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use blobkv::compaction::{CompactionScheduler, Schedule};
use blobkv::config::{DatabaseConfig, SyncStrategy};
use blobkv::database::{Database, InsertMode};
use blobkv::record::Record;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig::builder("compactdb", temp_dir.path().join("db"))
        .max_segment_size(1024 * 1024)
        .sync_strategy(SyncStrategy::EveryWrite)
        .compaction("@never")
        .build();
    let db = Database::open(config).unwrap();
    (temp_dir, db)
}

fn put(db: &Database, key: &str, payload: &[u8]) {
    db.insert(Record::new(key, "bin", payload.to_vec()), InsertMode::Upsert)
        .unwrap();
}

fn segment_dirs(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.len() == 19)
        .collect();
    names.sort();
    names
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_purges_tombstoned_key_and_keeps_live_key() {
    let (temp, db) = setup_temp_db();
    put(&db, "T", b"doomed");
    put(&db, "L", b"survivor");
    db.delete("T").unwrap();
    db.rotate().unwrap();

    let before = segment_dirs(&temp.path().join("db"));
    assert_eq!(before.len(), 1);

    let report = db.compact().unwrap();

    assert_eq!(report.segments_rewritten, 1);
    assert_eq!(report.keys_purged, 1);
    assert_eq!(report.records_kept, 1);
    assert!(db.get("T").unwrap().is_none());
    assert_eq!(db.get("L").unwrap().unwrap().payload, b"survivor");
    assert!(!temp.path().join("db").join(&before[0]).exists());
    assert_eq!(db.segment_count(), 0);
    assert_eq!(db.list_keys().unwrap(), vec!["L"]);
}

#[test]
fn test_purges_across_segments() {
    let (temp, db) = setup_temp_db();
    put(&db, "T", b"old data");
    put(&db, "A", b"a");
    db.rotate().unwrap();
    put(&db, "B", b"b");
    db.rotate().unwrap();
    put(&db, "C", b"c");
    db.delete("T").unwrap();
    db.rotate().unwrap();
    assert_eq!(db.segment_count(), 3);

    let report = db.compact().unwrap();

    // The segment with T's data and the one with its tombstone are rewritten
    assert_eq!(report.segments_rewritten, 2);
    assert_eq!(db.segment_count(), 1);
    assert_eq!(segment_dirs(&temp.path().join("db")).len(), 1);
    assert!(db.get("T").unwrap().is_none());
    for (key, payload) in [("A", b"a"), ("B", b"b"), ("C", b"c")] {
        assert_eq!(db.get(key).unwrap().unwrap().payload, payload);
    }
}

#[test]
fn test_leaves_clean_segments_alone() {
    let (temp, db) = setup_temp_db();
    put(&db, "A", b"a");
    db.rotate().unwrap();
    let clean = segment_dirs(&temp.path().join("db"));

    put(&db, "T", b"t");
    db.delete("T").unwrap();
    db.rotate().unwrap();

    db.compact().unwrap();

    assert_eq!(segment_dirs(&temp.path().join("db")), clean);
    assert_eq!(db.get("A").unwrap().unwrap().payload, b"a");
}

#[test]
fn test_commit_log_tombstone_purges_segment_data() {
    let (_temp, db) = setup_temp_db();
    put(&db, "T", b"t");
    put(&db, "L", b"l");
    db.rotate().unwrap();
    db.delete("T").unwrap();

    let report = db.compact().unwrap();

    assert_eq!(report.segments_rewritten, 1);
    assert_eq!(db.segment_count(), 0);
    assert!(db.get("T").unwrap().is_none());
    assert_eq!(db.get("L").unwrap().unwrap().payload, b"l");
}

#[test]
fn test_stale_tombstone_does_not_purge_newer_write() {
    let (_temp, db) = setup_temp_db();
    put(&db, "K", b"first");
    db.delete("K").unwrap();
    db.rotate().unwrap();
    put(&db, "K", b"reborn");

    let report = db.compact().unwrap();

    assert_eq!(report.keys_purged, 0);
    assert_eq!(db.get("K").unwrap().unwrap().payload, b"reborn");
}

#[test]
fn test_superseded_revisions_are_not_resurrected() {
    let (_temp, db) = setup_temp_db();
    put(&db, "K", b"old");
    put(&db, "T", b"t");
    db.rotate().unwrap();
    put(&db, "K", b"new");
    db.rotate().unwrap();
    db.delete("T").unwrap();

    db.compact().unwrap();

    let stored = db.get("K").unwrap().unwrap();
    assert_eq!(stored.payload, b"new");
    assert_eq!(stored.revision, 1);
}

#[test]
fn test_nothing_to_compact() {
    let (_temp, db) = setup_temp_db();
    put(&db, "A", b"a");
    db.rotate().unwrap();

    let report = db.compact().unwrap();
    assert_eq!(report.tombstones_found, 0);
    assert_eq!(report.segments_rewritten, 0);
    assert_eq!(db.segment_count(), 1);
}

#[test]
fn test_compaction_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig::builder("compactdb", temp_dir.path().join("db"))
        .sync_strategy(SyncStrategy::EveryWrite)
        .build();
    {
        let db = Database::open(config.clone()).unwrap();
        put(&db, "T", b"t");
        put(&db, "L", b"l");
        db.delete("T").unwrap();
        db.rotate().unwrap();
        db.compact().unwrap();
        db.close().unwrap();
    }

    let db = Database::open(config).unwrap();
    assert!(db.get("T").unwrap().is_none());
    assert_eq!(db.get("L").unwrap().unwrap().payload, b"l");
    assert_eq!(db.segment_count(), 0);
}

#[test]
fn test_compaction_alongside_writers() {
    let temp_dir = TempDir::new().unwrap();
    let config = DatabaseConfig::builder("compactdb", temp_dir.path().join("db"))
        .max_segment_size(2048)
        .sync_strategy(SyncStrategy::EveryNWrites { count: 16 })
        .compaction("@never")
        .build();
    let db = Database::open(config).unwrap();

    let expected: Vec<HashMap<String, Option<Vec<u8>>>> = crossbeam::scope(|scope| {
        let writers: Vec<_> = (0..3)
            .map(|writer| {
                let db = &db;
                scope.spawn(move |_| {
                    let mut state: HashMap<String, Option<Vec<u8>>> = HashMap::new();
                    for round in 0..30 {
                        for slot in 0..8 {
                            let key = format!("w{}-k{}", writer, slot);
                            let live = matches!(state.get(&key), Some(Some(_)));
                            if live && (round + slot) % 3 == 2 {
                                db.delete(&key).unwrap();
                                state.insert(key, None);
                            } else {
                                let payload = format!("{}-r{}", key, round).into_bytes();
                                put(db, &key, &payload);
                                state.insert(key, Some(payload));
                            }
                        }
                    }
                    state
                })
            })
            .collect();

        let compactor = scope.spawn(|_| {
            for _ in 0..20 {
                db.compact().unwrap();
                std::thread::sleep(Duration::from_millis(2));
            }
        });

        compactor.join().unwrap();
        writers.into_iter().map(|w| w.join().unwrap()).collect()
    })
    .unwrap();

    db.compact().unwrap();

    let mut live_keys = Vec::new();
    for state in &expected {
        for (key, payload) in state {
            let stored = db.get(key).unwrap().map(|r| r.payload);
            assert_eq!(&stored, payload, "key {}", key);
            if payload.is_some() {
                live_keys.push(key.clone());
            }
        }
    }
    live_keys.sort();
    assert_eq!(db.list_keys().unwrap(), live_keys);
}

// =============================================================================
// Scheduler Tests
// =============================================================================

#[test]
fn test_scheduler_runs_and_publishes() {
    let (_temp, db) = setup_temp_db();
    let db = Arc::new(db);
    put(&db, "T", b"t");
    put(&db, "L", b"l");
    db.delete("T").unwrap();
    db.rotate().unwrap();

    let scheduler = CompactionScheduler::new();
    scheduler
        .register_with(db.clone(), Schedule::Every(Duration::from_millis(20)))
        .unwrap();
    let events = scheduler.events("compactdb").unwrap();

    let report = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(report.database, "compactdb");

    scheduler.shutdown();
    assert!(scheduler.events("compactdb").is_none());
    assert!(db.get("T").unwrap().is_none());
    assert_eq!(db.get("L").unwrap().unwrap().payload, b"l");
}

#[test]
fn test_unscheduled_database_still_gets_reports() {
    let (_temp, db) = setup_temp_db();
    let db = Arc::new(db);

    let scheduler = CompactionScheduler::new();
    scheduler.register(db.clone()).unwrap();
    let events = scheduler.events("compactdb").unwrap();

    scheduler.publish(db.compact().unwrap());
    assert!(events.try_recv().is_ok());

    scheduler.remove("compactdb");
    assert!(scheduler.events("compactdb").is_none());
}
