// Layered cache integration tests.
// Test ID format: LCACHE-XXX

use layered_cache::{Cache, CacheConfig, CacheError, CacheRecord};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document {
    id: u64,
    title: String,
    body: String,
}

impl CacheRecord for Document {
    fn schema_version() -> &'static str {
        "2.0.0"
    }

    fn encode(&self) -> Vec<u8> {
        layered_cache::json_encode(self)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        layered_cache::json_decode(bytes)
    }
}

fn doc(id: u64) -> Document {
    Document {
        id,
        title: format!("title-{id}"),
        body: format!("body of document {id}"),
    }
}

// LCACHE-001: A fresh cache starts empty and answers gauges without error.
#[test]
fn test_lcache_001_fresh_cache_is_empty() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    assert_eq!(cache.get_count().unwrap(), 0);
    assert_eq!(cache.get_total_size().unwrap(), 0);
    assert!(cache.get_stats().unwrap() == Default::default());

    println!("LCACHE-001: PASSED");
}

// LCACHE-002: put/get round-trips through the memory tier.
#[test]
fn test_lcache_002_put_get_round_trip() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(100.0)).unwrap();
    let found = cache.get("doc-1", Some(101.0)).unwrap();
    assert_eq!(found.as_deref(), Some(&doc(1)));

    println!("LCACHE-002: PASSED");
}

// LCACHE-003: reopening the store after a process-boundary close recovers
// durable entries from disk.
#[test]
fn test_lcache_003_durability_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.db");

    {
        let config = CacheConfig::builder(&db_path).build().unwrap();
        let cache: Cache<Document> = Cache::open(config).unwrap();
        cache.put("doc-1", doc(1), Some(10.0)).unwrap();
        cache.close().unwrap();
    }

    let config = CacheConfig::builder(&db_path).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();
    let found = cache.get("doc-1", Some(11.0)).unwrap();
    assert_eq!(found.as_deref(), Some(&doc(1)));

    println!("LCACHE-003: PASSED");
}

// LCACHE-004: disk eviction cascades into the memory tier and respects the
// (timestamp asc, key asc) tie-break.
#[test]
fn test_lcache_004_cascading_eviction_tie_break() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db"))
        .max_memory_items(10)
        .max_disk_items(2)
        .build()
        .unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("b", doc(2), Some(5.0)).unwrap();
    cache.put("a", doc(1), Some(5.0)).unwrap();
    cache.put("c", doc(3), Some(6.0)).unwrap();

    assert_eq!(cache.get_count().unwrap(), 2);
    assert!(!cache.exists("a", Some(7.0)).unwrap());
    assert!(cache.exists("b", Some(7.0)).unwrap());
    assert!(cache.exists("c", Some(7.0)).unwrap());

    let stats = cache.get_stats().unwrap();
    assert_eq!(stats.disk_evictions, 1);
    assert_eq!(stats.memory_evictions, 1);

    println!("LCACHE-004: PASSED");
}

// LCACHE-005: a record past memory_ttl_seconds falls through and is served
// (and re-promoted) from disk.
#[test]
fn test_lcache_005_memory_ttl_falls_through_to_disk() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db"))
        .memory_ttl_seconds(5)
        .disk_ttl_seconds(1_000)
        .build()
        .unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(0.0)).unwrap();
    let found = cache.get("doc-1", Some(6.0)).unwrap();
    assert_eq!(found.as_deref(), Some(&doc(1)));

    let stats = cache.get_stats().unwrap();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.memory_hits, 0);

    println!("LCACHE-005: PASSED");
}

// LCACHE-006: a record past disk_ttl_seconds is purged entirely and reads
// as a miss.
#[test]
fn test_lcache_006_disk_ttl_expiry_is_a_miss() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db"))
        .disk_ttl_seconds(5)
        .build()
        .unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(0.0)).unwrap();
    let found = cache.get("doc-1", Some(10.0)).unwrap();
    assert!(found.is_none());
    assert_eq!(cache.get_count().unwrap(), 0);

    println!("LCACHE-006: PASSED");
}

// LCACHE-007: a schema version change at open purges stale rows before the
// cache becomes usable.
#[test]
fn test_lcache_007_schema_version_bump_purges_old_rows() {
    use layered_cache::store::PersistentStore;

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("cache.db");
    {
        let mut store = PersistentStore::open(&db_path).unwrap();
        store
            .write("doc-1", "{\"id\":1,\"title\":\"old\",\"body\":\"old\"}", 1.0, "1.0.0", 10)
            .unwrap();
    }

    let config = CacheConfig::builder(&db_path).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();
    assert_eq!(cache.get_count().unwrap(), 0);
    assert!(cache.get("doc-1", Some(2.0)).unwrap().is_none());

    println!("LCACHE-007: PASSED");
}

// LCACHE-008: exists() never mutates hit/miss counters or an entry's
// timestamp, but still performs TTL/schema cleanup.
#[test]
fn test_lcache_008_exists_is_read_only_on_hit() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(1.0)).unwrap();
    cache.get("doc-1", Some(2.0)).unwrap();

    let before = cache.get_stats().unwrap();
    assert!(cache.exists("doc-1", Some(500.0)).unwrap());
    let after = cache.get_stats().unwrap();
    assert_eq!(before, after);

    println!("LCACHE-008: PASSED");
}

// LCACHE-009: put_many is all-or-nothing against the configured item-size
// limit, and get_many returns only the keys actually found.
#[test]
fn test_lcache_009_batch_put_and_get() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    let items = vec![
        ("doc-1".to_string(), doc(1)),
        ("doc-2".to_string(), doc(2)),
        ("doc-3".to_string(), doc(3)),
    ];
    cache.put_many(items, Some(1.0)).unwrap();

    let keys = vec!["doc-1".to_string(), "doc-2".to_string(), "missing".to_string()];
    let found = cache.get_many(&keys, Some(2.0)).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found.get("doc-1").map(|d| d.as_ref()), Some(&doc(1)));

    let stats = cache.get_stats().unwrap();
    assert_eq!(stats.total_puts, 3);

    println!("LCACHE-009: PASSED");
}

// LCACHE-010: delete_many removes a batch from both tiers and is tolerant
// of unknown keys.
#[test]
fn test_lcache_010_delete_many_tolerates_unknown_keys() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(1.0)).unwrap();
    cache.put("doc-2", doc(2), Some(1.0)).unwrap();

    cache
        .delete_many(&["doc-1".to_string(), "missing".to_string()])
        .unwrap();

    assert!(!cache.exists("doc-1", Some(2.0)).unwrap());
    assert!(cache.exists("doc-2", Some(2.0)).unwrap());
    assert_eq!(cache.get_stats().unwrap().total_deletes, 2);

    println!("LCACHE-010: PASSED");
}

// LCACHE-011: an oversized put is rejected before any state mutates.
#[test]
fn test_lcache_011_oversized_item_is_rejected_eagerly() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db"))
        .max_disk_size_bytes(16)
        .max_item_size_bytes(16)
        .build()
        .unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    let err = cache.put("doc-1", doc(1), Some(1.0)).unwrap_err();
    assert!(matches!(err, CacheError::EvictionImpossible { .. }));
    assert_eq!(cache.get_count().unwrap(), 0);
    assert_eq!(cache.get_stats().unwrap().total_puts, 0);

    println!("LCACHE-011: PASSED");
}

// LCACHE-012: close() is terminal; every subsequent call fails with
// ClosedResource and nothing under the hood is touched again.
#[test]
fn test_lcache_012_closed_cache_rejects_all_calls() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(1.0)).unwrap();
    cache.close().unwrap();

    assert!(matches!(cache.get("doc-1", None), Err(CacheError::ClosedResource)));
    assert!(matches!(cache.put("doc-2", doc(2), None), Err(CacheError::ClosedResource)));
    assert!(matches!(cache.close(), Err(CacheError::ClosedResource)));

    println!("LCACHE-012: PASSED");
}

// LCACHE-013: clear() empties both tiers but preserves monotonic counters.
#[test]
fn test_lcache_013_clear_preserves_monotonic_counters() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    cache.put("doc-1", doc(1), Some(1.0)).unwrap();
    cache.put("doc-2", doc(2), Some(1.0)).unwrap();
    cache.clear().unwrap();

    assert_eq!(cache.get_count().unwrap(), 0);
    assert_eq!(cache.get_total_size().unwrap(), 0);
    assert_eq!(cache.get_stats().unwrap().total_puts, 2);

    println!("LCACHE-013: PASSED");
}

// LCACHE-014: keys are validated independently of any record's contents.
#[test]
fn test_lcache_014_key_validation_rejects_empty_and_overlong() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::builder(dir.path().join("cache.db")).build().unwrap();
    let cache: Cache<Document> = Cache::open(config).unwrap();

    assert!(matches!(
        cache.put("", doc(1), None),
        Err(CacheError::KeyValidation(_))
    ));
    let overlong = "k".repeat(300);
    assert!(matches!(
        cache.put(&overlong, doc(1), None),
        Err(CacheError::KeyValidation(_))
    ));

    println!("LCACHE-014: PASSED");
}
