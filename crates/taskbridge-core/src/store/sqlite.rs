use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{KvStore, StoreError, ttl_millis};
use crate::clock::{Clock, SystemClock};
use crate::db;

/// Durable [`KvStore`] backed by a single SQLite file.
///
/// Expired rows are invisible to `get` and deleted lazily on read;
/// [`SqliteKv::purge_expired`] sweeps the rest.
pub struct SqliteKv {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteKv {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or prepared.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_connection(
            db::open_store(path)?,
            Arc::new(SystemClock),
        ))
    }

    /// Private in-memory store, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?, clock))
    }

    /// Wrap a connection from [`db::open_store`] or [`db::open_in_memory`].
    #[must_use]
    pub fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Mutex::new(conn),
            clock,
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let conn = self.conn()?;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at_ms FROM kv_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((_, Some(deadline))) if deadline <= now => {
                conn.execute(
                    "DELETE FROM kv_entries WHERE key = ?1 AND expires_at_ms <= ?2",
                    params![key, now],
                )?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now().timestamp_millis();
        let expires_at_ms = match ttl {
            Some(ttl) => Some(now.saturating_add(ttl_millis(ttl)?)),
            None => None,
        };
        self.conn()?.execute(
            "INSERT INTO kv_entries (key, value, expires_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 expires_at_ms = excluded.expires_at_ms,
                 updated_at_ms = excluded.updated_at_ms",
            params![key, value, expires_at_ms, now],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn()?
            .execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now().timestamp_millis();
        let removed = self.conn()?.execute(
            "DELETE FROM kv_entries WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?1",
            [now],
        )?;
        if removed > 0 {
            debug!(removed, "purged expired store entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clocked() -> (Arc<ManualClock>, SqliteKv) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let kv = SqliteKv::open_in_memory(clock.clone()).expect("open in-memory store");
        (clock, kv)
    }

    #[test]
    fn put_get_delete() {
        let (_clock, kv) = clocked();
        kv.put("mapping:1", "g-1", None).expect("put");
        assert_eq!(kv.get("mapping:1").expect("get").as_deref(), Some("g-1"));

        kv.put("mapping:1", "g-2", None).expect("upsert");
        assert_eq!(kv.get("mapping:1").expect("get").as_deref(), Some("g-2"));

        kv.delete("mapping:1").expect("delete");
        assert_eq!(kv.get("mapping:1").expect("get"), None);
    }

    #[test]
    fn expired_rows_are_invisible_and_removed() {
        let (clock, kv) = clocked();
        kv.put("access-token:u1", "tok", Some(Duration::from_secs(3599)))
            .expect("put");

        clock.advance(Duration::from_secs(3598));
        assert_eq!(kv.get("access-token:u1").expect("get").as_deref(), Some("tok"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(kv.get("access-token:u1").expect("get"), None);

        let remaining: i64 = kv
            .conn()
            .expect("lock")
            .query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))
            .expect("count");
        assert_eq!(remaining, 0);
    }

    #[test]
    fn purge_sweeps_expired_rows_only() {
        let (clock, kv) = clocked();
        kv.put("refresh-token:u1", "rt", None).expect("put");
        kv.put("mapping:a", "__tombstone__", Some(Duration::from_secs(60)))
            .expect("put");
        kv.put("mapping:b", "__tombstone__", Some(Duration::from_secs(7200)))
            .expect("put");

        clock.advance(Duration::from_secs(3600));
        assert_eq!(kv.purge_expired().expect("purge"), 1);
        assert_eq!(kv.get("mapping:b").expect("get").as_deref(), Some("__tombstone__"));
        assert_eq!(kv.get("refresh-token:u1").expect("get").as_deref(), Some("rt"));
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.sqlite3");

        {
            let kv = SqliteKv::open(&path).expect("open");
            kv.put("refresh-token:u1", "rt", None).expect("put");
        }

        let kv = SqliteKv::open(&path).expect("reopen");
        assert_eq!(kv.get("refresh-token:u1").expect("get").as_deref(), Some("rt"));
    }
}
