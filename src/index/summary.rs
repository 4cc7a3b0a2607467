//! Summary
//!
//! In-memory index of one segment or the commit log. Adding an entry for a
//! hash that is already present replaces it (last write wins).

use std::collections::HashMap;

use super::IndexEntry;

#[derive(Debug, Clone, Default)]
pub struct Summary {
    table: HashMap<u32, IndexEntry>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: IndexEntry) {
        self.table.insert(entry.key_hash, entry);
    }

    pub fn lookup(&self, key_hash: u32) -> Option<&IndexEntry> {
        self.table.get(&key_hash)
    }

    pub fn contains(&self, key_hash: u32) -> bool {
        self.table.contains_key(&key_hash)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.table.values()
    }

    /// Entries ordered by file offset
    pub fn entries_by_offset(&self) -> Vec<&IndexEntry> {
        let mut entries: Vec<_> = self.table.values().collect();
        entries.sort_by_key(|e| e.offset);
        entries
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &IndexEntry> {
        self.table.values().filter(|e| e.is_removed())
    }
}
