//! Tests for the file store and log files
//!
//! These tests verify:
//! - Appends return the offset of each frame's length prefix
//! - read_at returns exactly the appended payload
//! - Frame iteration and torn-tail detection
//! - Handles keep working after rename and directory removal
//! - Atomic whole-file writes

use std::fs::OpenOptions;
use std::io::Write;

use blobkv::storage::{FileKind, FileStore, FRAME_HEADER_SIZE};
use blobkv::BlobError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(&temp_dir.path().join("store")).unwrap();
    (temp_dir, store)
}

// =============================================================================
// LogFile Tests
// =============================================================================

#[test]
fn test_append_offsets_and_read_at() {
    let (_temp, store) = setup_store();
    let log = store.open_log(FileKind::CommitLog).unwrap();

    let first = log.append(b"hello").unwrap();
    let second = log.append(b"world!").unwrap();

    assert_eq!(first, 0);
    assert_eq!(second, FRAME_HEADER_SIZE + 5);
    assert_eq!(log.size(), 2 * FRAME_HEADER_SIZE + 11);
    assert_eq!(&log.read_at(first).unwrap()[..], b"hello");
    assert_eq!(&log.read_at(second).unwrap()[..], b"world!");
}

#[test]
fn test_empty_frame() {
    let (_temp, store) = setup_store();
    let log = store.open_log(FileKind::Data).unwrap();

    let offset = log.append(b"").unwrap();
    assert!(log.read_at(offset).unwrap().is_empty());
    assert_eq!(log.size(), FRAME_HEADER_SIZE);
}

#[test]
fn test_read_past_end_is_corrupt() {
    let (_temp, store) = setup_store();
    let log = store.open_log(FileKind::Data).unwrap();
    log.append(b"abc").unwrap();

    assert!(matches!(log.read_at(100), Err(BlobError::CorruptRecord(_))));
}

#[test]
fn test_reopen_keeps_frames() {
    let (_temp, store) = setup_store();
    {
        let log = store.open_log(FileKind::CommitLog).unwrap();
        log.append(b"one").unwrap();
        log.append(b"two").unwrap();
        log.sync().unwrap();
    }

    let log = store.open_log(FileKind::CommitLog).unwrap();
    let frames: Vec<_> = log.frames().map(|f| f.unwrap()).collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].0, FRAME_HEADER_SIZE + 3);
    assert_eq!(&frames[1].1[..], b"two");

    // Appends continue after the existing frames
    assert_eq!(log.append(b"three").unwrap(), 2 * (FRAME_HEADER_SIZE + 3));
}

#[test]
fn test_frames_detect_torn_tail() {
    let (_temp, store) = setup_store();
    {
        let log = store.open_log(FileKind::CommitLog).unwrap();
        log.append(b"complete").unwrap();
    }

    // Length prefix promising 50 bytes, only 3 written
    let mut file = OpenOptions::new()
        .append(true)
        .open(store.path(FileKind::CommitLog))
        .unwrap();
    file.write_all(&50u32.to_le_bytes()).unwrap();
    file.write_all(b"abc").unwrap();
    drop(file);

    let log = store.open_log(FileKind::CommitLog).unwrap();
    let mut frames = log.frames();
    let collected: Vec<_> = (&mut frames).map(|f| f.unwrap()).collect();

    assert_eq!(collected.len(), 1);
    assert!(frames.is_torn());
    assert_eq!(frames.valid_len(), FRAME_HEADER_SIZE + 8);

    log.truncate(frames.valid_len()).unwrap();
    assert_eq!(log.size(), FRAME_HEADER_SIZE + 8);
}

#[test]
fn test_handle_survives_rename_and_removal() {
    let (temp, store) = setup_store();
    let log = store.open_log(FileKind::CommitLog).unwrap();
    let offset = log.append(b"payload").unwrap();

    store.rename(FileKind::CommitLog, FileKind::Data).unwrap();
    assert!(store.exists(FileKind::Data));
    assert!(!store.exists(FileKind::CommitLog));
    assert_eq!(&log.read_at(offset).unwrap()[..], b"payload");

    let moved = temp.path().join("moved");
    std::fs::rename(store.dir(), &moved).unwrap();
    assert_eq!(&log.read_at(offset).unwrap()[..], b"payload");

    let moved_store = FileStore::open(&moved).unwrap();
    moved_store.remove_all().unwrap();
    assert!(!moved.exists());
    assert_eq!(&log.read_at(offset).unwrap()[..], b"payload");
}

// =============================================================================
// FileStore Tests
// =============================================================================

#[test]
fn test_write_and_read_frames() {
    let (_temp, store) = setup_store();
    let frames = vec![
        bytes::Bytes::from_static(b"a"),
        bytes::Bytes::from_static(b""),
        bytes::Bytes::from_static(b"ccc"),
    ];

    store.write_frames(FileKind::Index, &frames).unwrap();
    assert_eq!(store.read_frames(FileKind::Index).unwrap(), frames);
    assert_eq!(store.size(FileKind::Index).unwrap(), 3 * FRAME_HEADER_SIZE + 4);

    // Overwrite replaces the content entirely
    store.write_frames(FileKind::Index, &frames[..1]).unwrap();
    assert_eq!(store.read_frames(FileKind::Index).unwrap().len(), 1);
}

#[test]
fn test_read_frames_rejects_torn_file() {
    let (_temp, store) = setup_store();
    std::fs::write(store.path(FileKind::Bloom), [9u8, 0, 0, 0, 1]).unwrap();

    assert!(matches!(
        store.read_frames(FileKind::Bloom),
        Err(BlobError::CorruptRecord(_))
    ));
}

#[test]
fn test_missing_files() {
    let (_temp, store) = setup_store();
    assert!(!store.exists(FileKind::Index));
    assert_eq!(store.size(FileKind::Index).unwrap(), 0);
    store.delete(FileKind::Index).unwrap();
}
