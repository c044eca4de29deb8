// # Two-Tier Coordinator
//
// Implements `put`/`get`/`delete`/`exists`/`clear` and their `_many`
// counterparts, orchestrating the memory and disk tiers: promotion,
// cascading eviction, TTL and schema-mismatch handling. One
// `parking_lot::RwLock` guards the in-memory tier and statistics ledger;
// the SQLite connection sits behind its own `parking_lot::Mutex` because
// `rusqlite::Connection` is `Send` but not `Sync` (see DESIGN.md). Every
// mutating public method takes the write lock plus the store lock
// together, so the two are always acquired in the same order and the
// observable effect is indistinguishable from a single critical section:
// no caller ever sees a partially-updated entry, and no two writers run
// concurrently. Read-only accessors (`get_count`, `get_total_size`,
// `get_stats`) take only the read lock, answering from gauges the ledger
// keeps current rather than re-querying the store.

use crate::config::CacheConfig;
use crate::eviction::{self, Candidate, Limits, Occupancy};
use crate::error::{CacheError, Result};
use crate::memory::MemoryTier;
use crate::record::CacheRecord;
use crate::stats::{CacheStats, StatsLedger};
use crate::store::PersistentStore;
use crate::ttl;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

const MAX_KEY_CODE_UNITS: usize = 256;

struct CacheInner<R> {
    memory: MemoryTier<R>,
    stats: StatsLedger,
    closed: bool,
}

/// A thread-safe, two-tier LRU cache bound to exactly one record type `R`.
pub struct Cache<R: CacheRecord> {
    config: CacheConfig,
    inner: RwLock<CacheInner<R>>,
    store: Mutex<Option<PersistentStore>>,
    expected_schema_version: &'static str,
}

impl<R: CacheRecord> Cache<R> {
    /// Open (or create) the cache at `config.db_path`, clean up any rows
    /// whose schema version no longer matches `R::schema_version()`, and
    /// bring the disk tier within its configured limits before returning.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let expected = R::schema_version();
        if expected.is_empty() {
            return Err(CacheError::MissingSchemaVersion);
        }

        let mut store = PersistentStore::open(&config.db_path)?;

        let removed = store.delete_mismatched_schema(expected)?;
        if removed > 0 {
            debug!(removed, expected_schema_version = expected, "purged schema-mismatched rows during initialization");
        }

        let init_victims = Self::evict_disk(&mut store, &config)?;
        for victim in &init_victims {
            trace!(key = %victim.key, "evicted from disk during initialization");
        }

        let mut stats = StatsLedger::new();
        let disk_items = store.count()?;
        let disk_size = store.sum_size()?;
        stats.set_gauges(0, disk_items, disk_size);

        Ok(Self {
            config,
            inner: RwLock::new(CacheInner {
                memory: MemoryTier::new(),
                stats,
                closed: false,
            }),
            store: Mutex::new(Some(store)),
            expected_schema_version: expected,
        })
    }

    pub fn put(&self, key: &str, value: R, timestamp: Option<f64>) -> Result<()> {
        validate_key(key)?;
        let (text, size) = encode_for_storage(&value)?;
        if size > self.config.max_disk_size_bytes {
            return Err(CacheError::EvictionImpossible {
                size,
                max: self.config.max_disk_size_bytes,
            });
        }
        let now = resolve_timestamp(timestamp);

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let old_size = store.write(key, &text, now, self.expected_schema_version, size)?;
        inner.stats.note_disk_write(size, old_size);

        let disk_victims = Self::evict_disk(store, &self.config)?;
        let mut self_evicted = false;
        for victim in &disk_victims {
            trace!(key = %victim.key, "disk eviction");
            inner.stats.record_disk_eviction();
            inner.stats.note_disk_removal(victim.size);
            if victim.key == key {
                self_evicted = true;
            }
            if inner.memory.delete(&victim.key) {
                trace!(key = %victim.key, "cascading removal from memory");
                inner.stats.record_memory_eviction();
            }
        }

        // A custom (historical) timestamp can make the just-written entry
        // itself the oldest row; if disk eviction just removed it, memory
        // must not resurrect it (memory is always a subset of disk).
        if size <= self.config.max_item_size_bytes && !self_evicted {
            inner.memory.put(key.to_string(), Arc::new(value), now, size);
            let mem_victims = Self::evict_memory(&mut inner.memory, &self.config);
            for victim in &mem_victims {
                trace!(key = %victim.key, "memory eviction");
                inner.stats.record_memory_eviction();
            }
        } else {
            inner.memory.delete(key);
        }

        inner.stats.record_puts(1);
        inner.stats.set_memory_items(inner.memory.count());
        Ok(())
    }

    pub fn put_many(&self, items: Vec<(String, R)>, timestamp: Option<f64>) -> Result<()> {
        let now = resolve_timestamp(timestamp);

        let mut encoded = Vec::with_capacity(items.len());
        for (key, value) in &items {
            validate_key(key)?;
            let (text, size) = encode_for_storage(value)?;
            if size > self.config.max_disk_size_bytes {
                return Err(CacheError::EvictionImpossible {
                    size,
                    max: self.config.max_disk_size_bytes,
                });
            }
            encoded.push((key.clone(), text, size));
        }

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let rows: Vec<(String, String, f64, String, u64)> = encoded
            .iter()
            .map(|(key, text, size)| {
                (
                    key.clone(),
                    text.clone(),
                    now,
                    self.expected_schema_version.to_string(),
                    *size,
                )
            })
            .collect();
        let old_sizes = store.write_many(&rows)?;
        for ((_, _, size), old_size) in encoded.iter().zip(old_sizes) {
            inner.stats.note_disk_write(*size, old_size);
        }

        let disk_victims = Self::evict_disk(store, &self.config)?;
        let evicted_keys: std::collections::HashSet<&str> =
            disk_victims.iter().map(|v| v.key.as_str()).collect();
        for victim in &disk_victims {
            inner.stats.record_disk_eviction();
            inner.stats.note_disk_removal(victim.size);
            if inner.memory.delete(&victim.key) {
                inner.stats.record_memory_eviction();
            }
        }

        // Entries whose own (possibly historical) timestamp made them the
        // oldest row are gone from disk already; memory must not resurrect
        // them (memory is always a subset of disk).
        for ((key, value), (_, _, size)) in items.into_iter().zip(encoded.iter()) {
            if *size <= self.config.max_item_size_bytes && !evicted_keys.contains(key.as_str()) {
                inner.memory.put(key, Arc::new(value), now, *size);
            } else {
                inner.memory.delete(&key);
            }
        }
        let mem_victims = Self::evict_memory(&mut inner.memory, &self.config);
        for victim in &mem_victims {
            inner.stats.record_memory_eviction();
        }

        inner.stats.record_puts(encoded.len() as u64);
        inner.stats.set_memory_items(inner.memory.count());
        Ok(())
    }

    pub fn get(&self, key: &str, timestamp: Option<f64>) -> Result<Option<Arc<R>>> {
        validate_key(key)?;
        let now = resolve_timestamp(timestamp);

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let result = self.get_locked(&mut inner, store, key, now, true)?;
        inner.stats.set_memory_items(inner.memory.count());
        Ok(result)
    }

    pub fn get_many(
        &self,
        keys: &[String],
        timestamp: Option<f64>,
    ) -> Result<HashMap<String, Arc<R>>> {
        for key in keys {
            validate_key(key)?;
        }
        let now = resolve_timestamp(timestamp);

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let mut results = HashMap::new();
        for key in keys {
            if let Some(record) = self.get_locked(&mut inner, store, key, now, true)? {
                results.insert(key.clone(), record);
            }
        }
        inner.stats.set_memory_items(inner.memory.count());
        Ok(results)
    }

    pub fn exists(&self, key: &str, timestamp: Option<f64>) -> Result<bool> {
        validate_key(key)?;
        let now = resolve_timestamp(timestamp);

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let found = self.get_locked(&mut inner, store, key, now, false)?.is_some();
        inner.stats.set_memory_items(inner.memory.count());
        Ok(found)
    }

    /// Synonym for `exists`, kept for source compatibility with callers
    /// that expect a map-like `contains` method.
    #[inline]
    pub fn contains(&self, key: &str) -> Result<bool> {
        self.exists(key, None)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        if let Some(size) = store.delete(key)? {
            inner.stats.note_disk_removal(size);
        }
        inner.memory.delete(key);
        inner.stats.record_deletes(1);
        inner.stats.set_memory_items(inner.memory.count());
        Ok(())
    }

    pub fn delete_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            validate_key(key)?;
        }

        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        let (removed_count, removed_size) = store.delete_many(keys)?;
        inner.stats.note_disk_removal_bulk(removed_count, removed_size);
        for key in keys {
            inner.memory.delete(key);
        }
        inner.stats.record_deletes(keys.len() as u64);
        inner.stats.set_memory_items(inner.memory.count());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        let store = open_store(&mut store_guard)?;

        store.delete_all()?;
        inner.memory.clear();
        inner.stats.set_gauges(0, 0, 0);
        Ok(())
    }

    /// Disk tier's total encoded size in bytes (disk is the superset of
    /// memory; see SPEC_FULL.md §9).
    pub fn get_total_size(&self) -> Result<u64> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        Ok(inner.stats.current_disk_size_bytes)
    }

    pub fn get_count(&self) -> Result<u64> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        Ok(inner.stats.current_disk_items)
    }

    pub fn get_stats(&self) -> Result<CacheStats> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        Ok(inner.stats.snapshot())
    }

    /// Flush and release the persistent store. Any subsequent call on this
    /// cache fails with `CacheError::ClosedResource`.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(CacheError::ClosedResource);
        }
        let mut store_guard = self.store.lock();
        if let Some(store) = store_guard.take() {
            store.close()?;
        }
        inner.memory.clear();
        inner.closed = true;
        Ok(())
    }

    /// Shared lookup protocol behind `get`/`get_many` (`mutate = true`) and
    /// `exists` (`mutate = false`). Invalid entries (expired, schema
    /// mismatch, undecodable) are always purged from both tiers; only the
    /// hit-path side effects — timestamp refresh, promotion, hit counters —
    /// are gated by `mutate`, so `exists` never changes a timestamp or a
    /// monotonic counter on a hit.
    fn get_locked(
        &self,
        inner: &mut CacheInner<R>,
        store: &mut PersistentStore,
        key: &str,
        now: f64,
        mutate: bool,
    ) -> Result<Option<Arc<R>>> {
        if let Some(entry) = inner.memory.get(key) {
            if !ttl::is_expired(now, entry.timestamp, self.config.memory_ttl_seconds) {
                let record = entry.record.clone();
                if mutate {
                    inner.memory.touch(key, now);
                    store.touch_timestamp(key, now)?;
                    inner.stats.record_memory_hit();
                }
                return Ok(Some(record));
            }
            trace!(key, "memory entry expired, falling through to disk");
            inner.memory.delete(key);
        }

        let stored = match store.get_by_key(key)? {
            None => {
                if mutate {
                    inner.stats.record_miss();
                }
                return Ok(None);
            }
            Some(stored) => stored,
        };

        if stored.schema_version != self.expected_schema_version {
            trace!(key, expected = self.expected_schema_version, found = %stored.schema_version, "schema mismatch, purging");
            if let Some(size) = store.delete(key)? {
                inner.stats.note_disk_removal(size);
            }
            inner.memory.delete(key);
            if mutate {
                inner.stats.record_miss();
            }
            return Ok(None);
        }

        if ttl::is_expired(now, stored.timestamp, self.config.disk_ttl_seconds) {
            trace!(key, "disk entry expired, purging");
            if let Some(size) = store.delete(key)? {
                inner.stats.note_disk_removal(size);
            }
            inner.memory.delete(key);
            if mutate {
                inner.stats.record_miss();
            }
            return Ok(None);
        }

        let record = match R::decode(&stored.value) {
            Ok(record) => record,
            Err(reason) => {
                debug!(key, reason = %reason, "decode failure, purging");
                if let Some(size) = store.delete(key)? {
                    inner.stats.note_disk_removal(size);
                }
                inner.memory.delete(key);
                if mutate {
                    inner.stats.record_miss();
                }
                return Ok(None);
            }
        };

        let record = Arc::new(record);
        if mutate {
            store.touch_timestamp(key, now)?;
            if stored.size <= self.config.max_item_size_bytes {
                inner
                    .memory
                    .put(key.to_string(), record.clone(), now, stored.size);
                let victims = Self::evict_memory(&mut inner.memory, &self.config);
                for victim in &victims {
                    trace!(key = %victim.key, "memory eviction on promotion");
                    inner.stats.record_memory_eviction();
                }
            }
            inner.stats.record_disk_hit();
        }
        Ok(Some(record))
    }

    fn evict_disk(store: &mut PersistentStore, config: &CacheConfig) -> Result<Vec<Candidate>> {
        let occupancy = Occupancy {
            count: store.count()?,
            total_size: store.sum_size()?,
        };
        let limits = Limits {
            max_count: config.max_disk_items,
            max_size: config.max_disk_size_bytes,
        };
        let candidates: Vec<Candidate> = store
            .iter_oldest(occupancy.count)?
            .into_iter()
            .map(|entry| Candidate {
                key: entry.key,
                timestamp: entry.timestamp,
                size: entry.size,
            })
            .collect();
        let victims = eviction::select_victims(occupancy, limits, &candidates);
        if !victims.is_empty() {
            let keys: Vec<String> = victims.iter().map(|v| v.key.clone()).collect();
            // Sizes for the stats ledger come from `candidates` (already
            // known from the scan above); the row counts/sizes this call
            // returns would just duplicate that.
            store.delete_many(&keys)?;
        }
        Ok(victims)
    }

    fn evict_memory(memory: &mut MemoryTier<R>, config: &CacheConfig) -> Vec<Candidate> {
        let occupancy = Occupancy {
            count: memory.count(),
            total_size: memory.total_size(),
        };
        let limits = Limits {
            max_count: config.max_memory_items,
            max_size: config.max_memory_size_bytes,
        };
        let candidates = memory.iter_oldest();
        let victims = eviction::select_victims(occupancy, limits, &candidates);
        for victim in &victims {
            memory.delete(&victim.key);
        }
        victims
    }
}

fn open_store(guard: &mut Option<PersistentStore>) -> Result<&mut PersistentStore> {
    guard.as_mut().ok_or(CacheError::ClosedResource)
}

fn resolve_timestamp(timestamp: Option<f64>) -> f64 {
    timestamp.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs_f64()
    })
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::KeyValidation("key must not be empty".into()));
    }
    let len = key.encode_utf16().count();
    if len > MAX_KEY_CODE_UNITS {
        return Err(CacheError::KeyValidation(format!(
            "key length {len} exceeds the maximum of {MAX_KEY_CODE_UNITS} code units"
        )));
    }
    Ok(())
}

fn encode_for_storage<R: CacheRecord>(value: &R) -> Result<(String, u64)> {
    let bytes = value.encode();
    let size = bytes.len() as u64;
    let text = String::from_utf8(bytes).map_err(|e| {
        CacheError::TypeValidation(format!("canonical encoding must be valid UTF-8 text: {e}"))
    })?;
    Ok((text, size))
}
