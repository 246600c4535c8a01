//! Source-task-id → target-task-id association with tombstones.
//!
//! Keys are `mapping:{sourceTaskId}`. A value is either the target id or the
//! [`TOMBSTONE`] sentinel, which carries a bounded lifetime so very late
//! duplicates are eventually reprocessed as harmless no-ops instead of being
//! remembered forever.

use std::time::Duration;

use crate::store::{KvStore, StoreError};

/// Sentinel value stored for deleted source tasks.
pub const TOMBSTONE: &str = "__tombstone__";

/// Default lifetime of a tombstone.
pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(3600);

/// What the store knows about one source task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingState {
    /// Live mapping to a target task.
    Mapped(String),
    /// The source task was deleted recently.
    Tombstone,
    /// No entry, or the tombstone expired.
    Absent,
}

/// Typed view over a [`KvStore`] for mapping keys.
#[derive(Debug, Clone)]
pub struct MappingStore<S> {
    kv: S,
    tombstone_ttl: Duration,
}

#[must_use]
pub fn mapping_key(source_id: &str) -> String {
    format!("mapping:{source_id}")
}

impl<S: KvStore> MappingStore<S> {
    pub const fn new(kv: S) -> Self {
        Self::with_tombstone_ttl(kv, DEFAULT_TOMBSTONE_TTL)
    }

    pub const fn with_tombstone_ttl(kv: S, tombstone_ttl: Duration) -> Self {
        Self { kv, tombstone_ttl }
    }

    /// Unconditional upsert of a live mapping, no expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn put(&self, source_id: &str, target_id: &str) -> Result<(), StoreError> {
        self.kv.put(&mapping_key(source_id), target_id, None)
    }

    /// Replace the entry with a tombstone that expires after the configured TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn tombstone(&self, source_id: &str) -> Result<(), StoreError> {
        self.kv
            .put(&mapping_key(source_id), TOMBSTONE, Some(self.tombstone_ttl))
    }

    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn get(&self, source_id: &str) -> Result<MappingState, StoreError> {
        Ok(match self.kv.get(&mapping_key(source_id))? {
            Some(value) if value == TOMBSTONE => MappingState::Tombstone,
            Some(target_id) => MappingState::Mapped(target_id),
            None => MappingState::Absent,
        })
    }

    /// Remove the entry entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn delete(&self, source_id: &str) -> Result<(), StoreError> {
        self.kv.delete(&mapping_key(source_id))
    }
}
