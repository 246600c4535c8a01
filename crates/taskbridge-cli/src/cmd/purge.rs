use anyhow::{Context, Result};
use serde::Serialize;
use taskbridge_core::store::KvStore;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Debug, Serialize)]
struct PurgeReport {
    removed: usize,
}

/// Sweep expired entries (cached access tokens, old tombstones) now.
///
/// # Errors
///
/// Returns an error if the store write fails.
pub fn run_purge(store: &dyn KvStore, output: OutputMode) -> Result<()> {
    let removed = store.purge_expired().context("purge expired entries")?;
    render(output, &PurgeReport { removed }, |r, w| {
        pretty_kv(w, "removed", r.removed.to_string())
    })
}
