use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use taskbridge_core::mapping::{MappingState, MappingStore};
use taskbridge_core::store::KvStore;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Subcommand, Debug)]
pub enum MappingCommand {
    #[command(
        about = "Show what a source task id maps to",
        after_help = "EXAMPLES:\n    tbridge mapping show 6X7rM8\n    tbridge mapping show 6X7rM8 --json"
    )]
    Show {
        /// Source task id.
        source_id: String,
    },

    #[command(about = "Drop the mapping (or tombstone) for a source task id")]
    Forget {
        /// Source task id.
        source_id: String,
    },
}

#[derive(Debug, Serialize)]
struct MappingView {
    source_id: String,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
}

impl MappingView {
    fn new(source_id: &str, state: MappingState) -> Self {
        let (state, target_id) = match state {
            MappingState::Mapped(target_id) => ("mapped", Some(target_id)),
            MappingState::Tombstone => ("tombstone", None),
            MappingState::Absent => ("absent", None),
        };
        Self {
            source_id: source_id.to_string(),
            state,
            target_id,
        }
    }
}

/// Execute a `mapping` subcommand against `store`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn run_mapping(command: &MappingCommand, store: &dyn KvStore, output: OutputMode) -> Result<()> {
    let mappings = MappingStore::new(store);
    let view = match command {
        MappingCommand::Show { source_id } => {
            let state = mappings.get(source_id).context("read mapping")?;
            MappingView::new(source_id, state)
        }
        MappingCommand::Forget { source_id } => {
            mappings.delete(source_id).context("delete mapping")?;
            MappingView::new(source_id, MappingState::Absent)
        }
    };

    render(output, &view, |v, w| {
        pretty_kv(w, "source", &v.source_id)?;
        pretty_kv(w, "state", v.state)?;
        if let Some(target_id) = &v.target_id {
            pretty_kv(w, "target", target_id)?;
        }
        Ok(())
    })
}
