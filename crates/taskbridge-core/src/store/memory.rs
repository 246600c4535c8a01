use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{KvStore, StoreError, ttl_millis};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

/// In-process [`KvStore`] used by tests and the `--memory-store` dev mode.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKv {
    /// Empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store whose expiry follows `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are read
    /// or purged.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

const fn is_expired(entry: &Entry, now_ms: i64) -> bool {
    match entry.expires_at_ms {
        Some(deadline) => deadline <= now_ms,
        None => false,
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        match entries.get(key) {
            Some(entry) if is_expired(entry, now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_ms = match ttl {
            Some(ttl) => Some(
                self.clock
                    .now()
                    .timestamp_millis()
                    .saturating_add(ttl_millis(ttl)?),
            ),
            None => None,
        };
        self.entries.lock().map_err(|_| StoreError::Poisoned)?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| !is_expired(entry, now));
        Ok(before - entries.len())
    }
}
