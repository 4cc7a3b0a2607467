//! Compaction Module
//!
//! Reclaims space held by deleted keys.
//!
//! ## Algorithm
//! 1. Scan every sealed segment's Summary for tombstones, one scoped thread
//!    per segment, results gathered over a channel; scan the commit log too
//! 2. Keep only authoritative tombstones: no newer segment and not the
//!    commit log holds the key hash
//! 3. For each segment (oldest first) holding a purged key, under the write
//!    lock: re-append every record that is neither purged nor superseded by
//!    a newer location, drop the segment from the state, delete its directory
//! 4. Segments without purged keys are left alone
//!
//! A crash mid-rewrite leaves records both in the commit log and in the
//! segment; the commit log copy is newer and wins, and the next run deletes
//! the segment.

mod scheduler;

pub use scheduler::{CompactionScheduler, Schedule};

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crossbeam::channel;

use crate::database::Database;
use crate::error::{BlobError, Result};

/// Outcome of one compaction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub database: String,
    pub segments_scanned: usize,
    /// Tombstones seen across segments and the commit log
    pub tombstones_found: usize,
    /// Key hashes whose records were purged
    pub keys_purged: usize,
    pub segments_rewritten: usize,
    /// Records copied into the commit log
    pub records_kept: usize,
    /// Records dropped as purged or superseded
    pub records_dropped: usize,
    pub duration: Duration,
}

/// Tombstones of one location, `None` for the commit log
struct ScanResult {
    segment: Option<usize>,
    tombstones: Vec<u32>,
}

pub(crate) fn compact(db: &Database) -> Result<CompactionReport> {
    let start = Instant::now();
    let state = db.state();
    let mut report = CompactionReport {
        database: db.name().to_string(),
        segments_scanned: state.segments.len(),
        ..Default::default()
    };

    // -------------------------------------------------------------------------
    // Scan (no locks: sealed segments are immutable)
    // -------------------------------------------------------------------------
    let (tx, rx) = channel::unbounded();
    crossbeam::scope(|scope| {
        for (idx, segment) in state.segments.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let tombstones = segment.summary().tombstones().map(|e| e.key_hash).collect();
                let _ = tx.send(ScanResult {
                    segment: Some(idx),
                    tombstones,
                });
            });
        }
    })
    .map_err(|_| {
        BlobError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "tombstone scan thread panicked",
        ))
    })?;

    let commit_log_summary = state.commit_log.summary();
    let _ = tx.send(ScanResult {
        segment: None,
        tombstones: commit_log_summary.tombstones().map(|e| e.key_hash).collect(),
    });
    drop(tx);

    // -------------------------------------------------------------------------
    // Authoritative tombstones
    // -------------------------------------------------------------------------
    let mut purged = HashSet::new();
    for result in rx.iter() {
        report.tombstones_found += result.tombstones.len();
        for hash in result.tombstones {
            let authoritative = match result.segment {
                None => true,
                Some(idx) => {
                    !commit_log_summary.contains(hash)
                        && !state.segments[idx + 1..]
                            .iter()
                            .any(|s| s.summary().contains(hash))
                }
            };
            if authoritative {
                purged.insert(hash);
            }
        }
    }
    report.keys_purged = purged.len();

    if purged.is_empty() {
        report.duration = start.elapsed();
        tracing::debug!(db = %report.database, "nothing to compact");
        return Ok(report);
    }

    // -------------------------------------------------------------------------
    // Rewrite (serialized with inserts)
    // -------------------------------------------------------------------------
    let targets: Vec<_> = state
        .segments
        .iter()
        .filter(|s| s.summary().iter().any(|e| purged.contains(&e.key_hash)))
        .cloned()
        .collect();
    drop(state);

    for segment in targets {
        let _guard = db.lock_writes();

        for entry in segment.summary().entries_by_offset() {
            let hash = entry.key_hash;
            if purged.contains(&hash) || is_superseded(db, segment.id(), hash) {
                report.records_dropped += 1;
                continue;
            }
            match segment.get(entry.file_offset()) {
                Some(bytes) => {
                    db.reappend_locked(entry, &bytes)?;
                    report.records_kept += 1;
                }
                None => report.records_dropped += 1,
            }
        }

        for hash in &purged {
            db.cache().remove(*hash);
        }
        db.retire_segment_locked(segment.id())?;
        report.segments_rewritten += 1;

        tracing::info!(
            db = %report.database,
            segment = %segment.id(),
            "compacted segment"
        );
    }

    report.duration = start.elapsed();
    tracing::info!(
        db = %report.database,
        segments_rewritten = report.segments_rewritten,
        keys_purged = report.keys_purged,
        records_kept = report.records_kept,
        records_dropped = report.records_dropped,
        duration_ms = report.duration.as_millis() as u64,
        "compaction finished"
    );
    Ok(report)
}

/// Whether a location newer than segment `id` holds `hash` in the current state
fn is_superseded(db: &Database, id: &str, hash: u32) -> bool {
    let state = db.state();
    if state.commit_log.contains(hash) {
        return true;
    }
    match state.segments.iter().position(|s| s.id() == id) {
        Some(position) => state.segments[position + 1..]
            .iter()
            .any(|s| s.summary().contains(hash)),
        None => true,
    }
}
