use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use taskbridge_core::config::BridgeConfig;
use taskbridge_core::store::{KvStore, MemoryKv};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{build_handler, open_store};
use crate::server;

/// Arguments for `tbridge serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address; overrides `server.bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Keep all state in memory (lost on exit). For local testing only.
    #[arg(long)]
    pub memory_store: bool,
}

/// Run the webhook edge until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the store, identity config or listener cannot be set up.
pub fn run_serve(args: &ServeArgs, config: &BridgeConfig) -> Result<()> {
    let store: Arc<dyn KvStore> = if args.memory_store {
        warn!("using in-memory store, credentials and mappings are lost on exit");
        Arc::new(MemoryKv::new())
    } else {
        info!(path = %config.store.path.display(), "opening store");
        Arc::new(open_store(config)?)
    };
    let handler = Arc::new(build_handler(Arc::clone(&store), config)?);
    let bind = args.bind.as_deref().unwrap_or(&config.server.bind);
    let sweep_every = Duration::from_secs(config.server.sweep_interval_secs.max(1));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("bind {bind}"))?;
        let sweeper = tokio::spawn(server::sweep_expired(store, sweep_every));
        let result = server::serve(listener, handler).await;
        sweeper.abort();
        result
    })
}
