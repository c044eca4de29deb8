// # Statistics Ledger
//
// Monotonic counters plus current-state gauges, updated inside the same
// critical section as the state change they describe (see SPEC_FULL.md
// §4.7). Modeled on the pack's `cache::cache_statistics::CacheMetrics`, but
// scoped to exactly the counters spec.md names rather than that module's
// broader latency-histogram/rate tracking.

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot returned by `Cache::get_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub memory_evictions: u64,
    pub disk_evictions: u64,
    pub total_puts: u64,
    pub total_gets: u64,
    pub total_deletes: u64,
    pub current_memory_items: u64,
    pub current_disk_items: u64,
    /// Current total encoded size, in bytes, of the disk tier. Not named
    /// individually in spec.md's gauge list but required to answer
    /// `get_total_size()` (defined as the disk tier's total) without a
    /// read-time query against the store, keeping that call lock-free of
    /// the connection (see SPEC_FULL.md §4.8).
    pub current_disk_size_bytes: u64,
}

/// The live ledger. Counters only ever grow; gauges are overwritten to
/// reflect the tier's actual occupancy after each mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsLedger {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub memory_evictions: u64,
    pub disk_evictions: u64,
    pub total_puts: u64,
    pub total_gets: u64,
    pub total_deletes: u64,
    pub current_memory_items: u64,
    pub current_disk_items: u64,
    pub current_disk_size_bytes: u64,
}

impl StatsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
        self.total_gets += 1;
    }

    pub fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
        self.total_gets += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.total_gets += 1;
    }

    pub fn record_memory_eviction(&mut self) {
        self.memory_evictions += 1;
    }

    pub fn record_disk_eviction(&mut self) {
        self.disk_evictions += 1;
    }

    pub fn record_puts(&mut self, n: u64) {
        self.total_puts += n;
    }

    pub fn record_deletes(&mut self, n: u64) {
        self.total_deletes += n;
    }

    /// Set every gauge outright. Used only where there is no prior
    /// incremental state to build on: at `Cache::open` (the initial row
    /// count/size come from one startup scan) and at `clear` (the tier is
    /// known to be empty without needing to ask the store).
    pub fn set_gauges(&mut self, memory_items: u64, disk_items: u64, disk_size_bytes: u64) {
        self.current_memory_items = memory_items;
        self.current_disk_items = disk_items;
        self.current_disk_size_bytes = disk_size_bytes;
    }

    pub fn set_memory_items(&mut self, memory_items: u64) {
        self.current_memory_items = memory_items;
    }

    /// Fold a disk upsert into the gauges. `old_size` is the size of the row
    /// this write replaced, if any (`None` for a brand-new key) — this is
    /// how the disk gauges stay current without re-querying the store on
    /// every write.
    pub fn note_disk_write(&mut self, new_size: u64, old_size: Option<u64>) {
        match old_size {
            Some(old) => {
                self.current_disk_size_bytes =
                    self.current_disk_size_bytes.saturating_sub(old) + new_size;
            }
            None => {
                self.current_disk_items += 1;
                self.current_disk_size_bytes += new_size;
            }
        }
    }

    /// Fold a single disk row removal (delete, eviction, TTL expiry,
    /// schema mismatch, decode failure) into the gauges.
    pub fn note_disk_removal(&mut self, size: u64) {
        self.current_disk_items = self.current_disk_items.saturating_sub(1);
        self.current_disk_size_bytes = self.current_disk_size_bytes.saturating_sub(size);
    }

    /// Fold a batch removal (`delete_many`) into the gauges in one step.
    pub fn note_disk_removal_bulk(&mut self, count: u64, total_size: u64) {
        self.current_disk_items = self.current_disk_items.saturating_sub(count);
        self.current_disk_size_bytes = self.current_disk_size_bytes.saturating_sub(total_size);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits,
            disk_hits: self.disk_hits,
            misses: self.misses,
            memory_evictions: self.memory_evictions,
            disk_evictions: self.disk_evictions,
            total_puts: self.total_puts,
            total_gets: self.total_gets,
            total_deletes: self.total_deletes,
            current_memory_items: self.current_memory_items,
            current_disk_items: self.current_disk_items,
            current_disk_size_bytes: self.current_disk_size_bytes,
        }
    }
}
