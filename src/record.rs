// # Record Contract
//
// The cache treats cached values as opaque beyond a small capability
// interface: a stable schema-version tag, a canonical byte encoding, and a
// decoder back from that encoding. A cache instance is bound to exactly one
// concrete record type; `expected_schema_version` is read once at
// construction (see `crate::config::CacheConfig`).

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Capability a value must expose to be cacheable.
///
/// The canonical encoding is the JSON text encoding of the record's fields;
/// `size` accounting elsewhere in the crate is always the byte length of
/// `encode()`'s output.
pub trait CacheRecord: Sized + Send + Sync + 'static {
    /// Stable tag identifying this type's on-disk structural version.
    /// Read once per cache instance; entries whose stored tag differs are
    /// treated as a schema mismatch and purged on discovery.
    fn schema_version() -> &'static str;

    /// Canonical byte encoding used both for on-disk storage and size
    /// accounting.
    fn encode(&self) -> Vec<u8>;

    /// Decode a value previously produced by `encode`. The caller (the
    /// two-tier coordinator) attaches the offending key to the error before
    /// surfacing it, so implementations only need to describe the failure.
    fn decode(bytes: &[u8]) -> std::result::Result<Self, String>;
}

/// Canonical JSON encoder, for record types that derive `Serialize`.
pub fn json_encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("serde_json encoding of a well-formed record cannot fail")
}

/// Canonical JSON decoder, for record types that derive `Deserialize`.
pub fn json_decode<T: DeserializeOwned>(bytes: &[u8]) -> std::result::Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}
