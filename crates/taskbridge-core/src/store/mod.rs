//! Keyed string store with optional per-entry TTL.
//!
//! Both the credential cache and the mapping store sit on top of this
//! capability. Expiry is the back end's concern: a read shortly after an
//! entry's deadline is allowed to still return it, so callers must not
//! depend on expiry being synchronous.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

/// Failures surfaced by a [`KvStore`] back end.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("ttl out of range: {0:?}")]
    TtlOutOfRange(Duration),
}

/// `get`/`put`/`delete` by key, TTL-aware.
///
/// Each operation is atomic with respect to its single key; no cross-key
/// transactions are offered.
pub trait KvStore: Send + Sync {
    /// Read a live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Upsert an entry. `ttl = None` never expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end cannot be written.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove an entry; removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end cannot be written.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every expired entry now, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the back end cannot be written.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        (**self).put(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        (**self).purge_expired()
    }
}

impl<T: KvStore + ?Sized> KvStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        (**self).put(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        (**self).purge_expired()
    }
}

/// Convert a TTL to whole milliseconds for deadline arithmetic.
pub(crate) fn ttl_millis(ttl: Duration) -> Result<i64, StoreError> {
    i64::try_from(ttl.as_millis()).map_err(|_| StoreError::TtlOutOfRange(ttl))
}
