//! Key-value backends the series store runs on.
//!
//! A backend offers ordered append to a named list, whole-key deletion,
//! per-key expiry and prefix enumeration of keys. Single values live beside
//! lists under their own keys. Expired keys behave as absent everywhere.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::StoreError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Byte-level contract every backend implements.
///
/// Implementations must serialize writes to a single key; appends to one list
/// are read back in the order they were made.
pub trait KvBackend: Send + Sync {
    /// Appends `value` to the list at `key`, creating it if needed.
    ///
    /// Returns the new length of the list.
    fn push(&self, key: &str, value: &[u8]) -> Result<u64, StoreError>;

    /// Appends `value` and sets the key to expire `ttl` from now, as one write.
    ///
    /// Either both take effect or neither does.
    fn push_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<u64, StoreError>;

    /// Returns every element of the list at `key` in insertion order.
    ///
    /// A missing key yields an empty vector.
    fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Number of elements in the list at `key` (0 if missing).
    fn len(&self, key: &str) -> Result<u64, StoreError>;

    /// Deletes the list or value at `key`.
    ///
    /// Deleting a missing key succeeds. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Sets the key to expire `ttl` from now. No-op if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Stores a single value under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Reads the single value under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Enumerates live keys (lists and values) starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Removes every expired key. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn deadline_ms(ttl: Duration) -> u64 {
    now_ms().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}
