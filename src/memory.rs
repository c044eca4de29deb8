// # Memory Tier
//
// An in-process map from key to the decoded record plus its LRU metadata.
// Holds `Arc<R>` rather than a re-encoded copy so a memory hit never pays
// encoding cost (see SPEC_FULL.md §9).

use crate::eviction::Candidate;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MemoryEntry<R> {
    pub record: Arc<R>,
    pub timestamp: f64,
    pub size: u64,
}

impl<R> Clone for MemoryEntry<R> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            timestamp: self.timestamp,
            size: self.size,
        }
    }
}

#[derive(Default)]
pub struct MemoryTier<R> {
    entries: HashMap<String, MemoryEntry<R>>,
    total_size: u64,
}

impl<R> MemoryTier<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_size: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MemoryEntry<R>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: String, record: Arc<R>, timestamp: f64, size: u64) {
        if let Some(old) = self.entries.remove(&key) {
            self.total_size -= old.size;
        }
        self.total_size += size;
        self.entries.insert(
            key,
            MemoryEntry {
                record,
                timestamp,
                size,
            },
        );
    }

    /// Update an existing entry's timestamp in place (used on memory hits).
    /// No-op if the key is absent.
    pub fn touch(&mut self, key: &str, timestamp: f64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.timestamp = timestamp;
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if let Some(old) = self.entries.remove(key) {
            self.total_size -= old.size;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }

    pub fn count(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Every live entry as an eviction candidate, sorted oldest-first by
    /// `(timestamp asc, key asc)`. The memory tier is small by construction
    /// (bounded by `max_memory_items`), so sorting the full set on demand
    /// is cheap and needs no separately maintained ordered index.
    pub fn iter_oldest(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .entries
            .iter()
            .map(|(key, entry)| Candidate {
                key: key.clone(),
                timestamp: entry.timestamp,
                size: entry.size,
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap()
                .then_with(|| a.key.cmp(&b.key))
        });
        candidates
    }
}
