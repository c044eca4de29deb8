// # Cache Configuration
//
// An immutable bundle of limits set once at construction, built through a
// validating builder in the same idiom as the pack's `CacheConfig::validate`
// (see `cache::query_cache::CacheConfig` in the lineage this crate comes
// from): construct-then-validate rather than panicking deep inside the
// coordinator.

use crate::error::{CacheError, Result};
use std::path::{Path, PathBuf};

/// Immutable limits and storage location for a `Cache` instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_memory_items: u64,
    pub max_memory_size_bytes: u64,
    pub max_disk_items: u64,
    pub max_disk_size_bytes: u64,
    pub memory_ttl_seconds: u64,
    pub disk_ttl_seconds: u64,
    pub max_item_size_bytes: u64,
    pub db_path: PathBuf,
}

impl CacheConfig {
    pub fn builder(db_path: impl AsRef<Path>) -> CacheConfigBuilder {
        CacheConfigBuilder::new(db_path)
    }
}

/// Builder for `CacheConfig`. All limits default to generous values;
/// callers are expected to set the ones that matter for their workload.
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    db_path: PathBuf,
    max_memory_items: u64,
    max_memory_size_bytes: u64,
    max_disk_items: u64,
    max_disk_size_bytes: u64,
    memory_ttl_seconds: u64,
    disk_ttl_seconds: u64,
    max_item_size_bytes: u64,
}

impl CacheConfigBuilder {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            max_memory_items: 1_000,
            max_memory_size_bytes: 64 * 1024 * 1024,
            max_disk_items: 100_000,
            max_disk_size_bytes: 1024 * 1024 * 1024,
            memory_ttl_seconds: 300,
            disk_ttl_seconds: 86_400,
            max_item_size_bytes: 1024 * 1024,
        }
    }

    pub fn max_memory_items(mut self, v: u64) -> Self {
        self.max_memory_items = v;
        self
    }

    pub fn max_memory_size_bytes(mut self, v: u64) -> Self {
        self.max_memory_size_bytes = v;
        self
    }

    pub fn max_disk_items(mut self, v: u64) -> Self {
        self.max_disk_items = v;
        self
    }

    pub fn max_disk_size_bytes(mut self, v: u64) -> Self {
        self.max_disk_size_bytes = v;
        self
    }

    pub fn memory_ttl_seconds(mut self, v: u64) -> Self {
        self.memory_ttl_seconds = v;
        self
    }

    pub fn disk_ttl_seconds(mut self, v: u64) -> Self {
        self.disk_ttl_seconds = v;
        self
    }

    pub fn max_item_size_bytes(mut self, v: u64) -> Self {
        self.max_item_size_bytes = v;
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<CacheConfig> {
        if self.max_memory_items == 0 {
            return Err(CacheError::Configuration(
                "max_memory_items must be greater than 0".into(),
            ));
        }
        if self.max_memory_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_memory_size_bytes must be greater than 0".into(),
            ));
        }
        if self.max_disk_items == 0 {
            return Err(CacheError::Configuration(
                "max_disk_items must be greater than 0".into(),
            ));
        }
        if self.max_disk_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_disk_size_bytes must be greater than 0".into(),
            ));
        }
        if self.max_item_size_bytes == 0 {
            return Err(CacheError::Configuration(
                "max_item_size_bytes must be greater than 0".into(),
            ));
        }
        if self.max_item_size_bytes > self.max_disk_size_bytes {
            return Err(CacheError::Configuration(
                "max_item_size_bytes cannot exceed max_disk_size_bytes; no item could ever fit"
                    .into(),
            ));
        }

        Ok(CacheConfig {
            max_memory_items: self.max_memory_items,
            max_memory_size_bytes: self.max_memory_size_bytes,
            max_disk_items: self.max_disk_items,
            max_disk_size_bytes: self.max_disk_size_bytes,
            memory_ttl_seconds: self.memory_ttl_seconds,
            disk_ttl_seconds: self.disk_ttl_seconds,
            max_item_size_bytes: self.max_item_size_bytes,
            db_path: self.db_path,
        })
    }
}
