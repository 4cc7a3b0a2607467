//! LRU list
//!
//! Single-threaded core of the cache. Callers provide locking.

use std::collections::HashMap;

use bytes::Bytes;

const SENTINEL: usize = 0;

#[derive(Debug)]
struct Node {
    key: u32,
    value: Bytes,
    prev: usize,
    next: usize,
}

/// Size-bounded LRU list over an arena of nodes
#[derive(Debug)]
pub struct LruList {
    nodes: Vec<Node>,
    /// Slots released by removals, reused before growing the arena
    free: Vec<usize>,
    slots: HashMap<u32, usize>,
    capacity: u64,
    used: u64,
}

impl LruList {
    pub fn new(capacity: u64) -> Self {
        Self {
            nodes: vec![Node {
                key: 0,
                value: Bytes::new(),
                prev: SENTINEL,
                next: SENTINEL,
            }],
            free: Vec::new(),
            slots: HashMap::new(),
            capacity,
            used: 0,
        }
    }

    /// Insert or overwrite, then evict from the tail until within capacity
    ///
    /// A value larger than the whole capacity evicts everything, itself included.
    pub fn insert(&mut self, key: u32, value: Bytes) {
        if let Some(&slot) = self.slots.get(&key) {
            self.used -= self.nodes[slot].value.len() as u64;
            self.used += value.len() as u64;
            self.nodes[slot].value = value;
            self.unlink(slot);
            self.push_front(slot);
        } else {
            self.used += value.len() as u64;
            let node = Node {
                key,
                value,
                prev: SENTINEL,
                next: SENTINEL,
            };
            let slot = match self.free.pop() {
                Some(slot) => {
                    self.nodes[slot] = node;
                    slot
                }
                None => {
                    self.nodes.push(node);
                    self.nodes.len() - 1
                }
            };
            self.slots.insert(key, slot);
            self.push_front(slot);
        }

        while self.used > self.capacity {
            let tail = self.nodes[SENTINEL].prev;
            if tail == SENTINEL {
                break;
            }
            let key = self.nodes[tail].key;
            self.remove(key);
        }
    }

    /// Look up and promote to most recently used
    pub fn get(&mut self, key: u32) -> Option<Bytes> {
        let slot = *self.slots.get(&key)?;
        self.unlink(slot);
        self.push_front(slot);
        Some(self.nodes[slot].value.clone())
    }

    pub fn remove(&mut self, key: u32) -> Option<Bytes> {
        let slot = self.slots.remove(&key)?;
        self.unlink(slot);
        let value = std::mem::take(&mut self.nodes[slot].value);
        self.used -= value.len() as u64;
        self.free.push(slot);
        Some(value)
    }

    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[SENTINEL].prev = SENTINEL;
        self.nodes[SENTINEL].next = SENTINEL;
        self.free.clear();
        self.slots.clear();
        self.used = 0;
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<u32> {
        let mut keys = Vec::with_capacity(self.slots.len());
        let mut slot = self.nodes[SENTINEL].next;
        while slot != SENTINEL {
            keys.push(self.nodes[slot].key);
            slot = self.nodes[slot].next;
        }
        keys
    }

    pub fn contains(&self, key: u32) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn push_front(&mut self, slot: usize) {
        let head = self.nodes[SENTINEL].next;
        self.nodes[slot].prev = SENTINEL;
        self.nodes[slot].next = head;
        self.nodes[head].prev = slot;
        self.nodes[SENTINEL].next = slot;
    }
}
