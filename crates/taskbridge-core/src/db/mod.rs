//! SQLite file backing [`crate::store::SqliteKv`].
//!
//! One table, `kv_entries`, holds every credential, list and mapping key. A
//! NULL `expires_at_ms` never expires. The layout version lives in
//! `PRAGMA user_version`.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so the sweeper and request handlers don't block readers
//! - `busy_timeout = 5s` to absorb transient lock contention between requests

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Layout version written by this binary.
pub const STORE_LAYOUT_VERSION: i64 = 1;

const KV_ENTRIES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY NOT NULL CHECK (length(key) > 0),
    value TEXT NOT NULL,
    expires_at_ms INTEGER,
    updated_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_expires
    ON kv_entries(expires_at_ms)
    WHERE expires_at_ms IS NOT NULL;
";

/// Open (or create) the store file and make sure its table exists.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or configured, or if it was
/// written by a newer build.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store database {}", path.display()))?;

    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("configure sqlite pragmas")?;
    let _journal_mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("enable WAL")?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("configure sqlite pragmas")?;

    ensure_layout(&mut conn)
        .with_context(|| format!("prepare store {}", path.display()))?;
    Ok(conn)
}

/// Open a private in-memory store with the same table.
///
/// # Errors
///
/// Returns an error if creating the table fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    ensure_layout(&mut conn).context("prepare in-memory store")?;
    Ok(conn)
}

/// Version recorded in the file; 0 for a fresh file.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read.
pub fn layout_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn ensure_layout(conn: &mut Connection) -> Result<()> {
    let found = layout_version(conn)?;
    if found > STORE_LAYOUT_VERSION {
        bail!(
            "store layout version {found} is newer than this build supports \
             ({STORE_LAYOUT_VERSION})"
        );
    }
    if found == STORE_LAYOUT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(KV_ENTRIES_SQL)?;
    tx.pragma_update(None, "user_version", STORE_LAYOUT_VERSION)?;
    tx.commit()?;
    Ok(())
}
