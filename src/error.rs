// Error types for the layered cache.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("key validation failed: {0}")]
    KeyValidation(String),

    #[error("type validation failed: {0}")]
    TypeValidation(String),

    #[error("record type does not expose a schema version")]
    MissingSchemaVersion,

    #[error("schema mismatch for key {key:?}: expected {expected}, found {found}")]
    SchemaMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("failed to decode stored record for key {key:?}: {reason}")]
    DecodeFailure { key: String, reason: String },

    #[error("persistent store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("operation attempted on a closed cache")]
    ClosedResource,

    #[error("item of {size} bytes cannot fit within max_disk_size_bytes ({max})")]
    EvictionImpossible { size: u64, max: u64 },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
