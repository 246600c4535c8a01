//! Replay one webhook body through the full pipeline and report the outcome.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use taskbridge_core::config::BridgeConfig;
use taskbridge_core::model::WebhookEvent;

use super::{build_handler, open_store};
use crate::output::{CliError, OutputMode, pretty_kv, render, render_error};

/// Arguments for `tbridge process`.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Event JSON file; omit to read from stdin.
    #[arg(long, short, value_name = "PATH")]
    pub input: Option<PathBuf>,
}

/// Decode and pipeline failures are rendered once as a coded error and the
/// process exits with status 1. Unlike the webhook edge, failures are
/// reported.
///
/// # Errors
///
/// Returns an error if the event or the store cannot be read.
pub fn run_process(args: &ProcessArgs, config: &BridgeConfig, output: OutputMode) -> Result<()> {
    let body = match &args.input {
        Some(path) => fs::read(path).with_context(|| format!("read {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("read event from stdin")?;
            buf
        }
    };

    let event = match WebhookEvent::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            process::exit(1);
        }
    };

    let store = Arc::new(open_store(config)?);
    let handler = build_handler(store, config)?;

    match handler.handle(&event) {
        Ok(outcome) => render(output, &outcome, |o, w| {
            pretty_kv(w, "event", event.event_name.as_str())?;
            pretty_kv(w, "source", &event.task.id)?;
            pretty_kv(w, "outcome", o.to_string())
        }),
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            process::exit(1);
        }
    }
}
