pub mod completions;
pub mod credentials;
pub mod mapping;
pub mod process;
pub mod purge;
pub mod serve;

use std::sync::Arc;

use anyhow::{Context, Result};
use taskbridge_core::WebhookHandler;
use taskbridge_core::client::GoogleTasksConnector;
use taskbridge_core::config::BridgeConfig;
use taskbridge_core::credential::OAuthTokenExchange;
use taskbridge_core::store::{KvStore, SqliteKv};
use taskbridge_core::sync::HandlerSettings;

/// Handler wired to the real identity provider and target API.
pub type LiveHandler<S> = WebhookHandler<S, OAuthTokenExchange, GoogleTasksConnector>;

/// Open the configured durable store.
pub fn open_store(config: &BridgeConfig) -> Result<SqliteKv> {
    SqliteKv::open(&config.store.path)
        .with_context(|| format!("open store {}", config.store.path.display()))
}

/// Build the full pipeline on top of `store`.
///
/// # Errors
///
/// Returns an error if the identity client id or secret is missing.
pub fn build_handler<S: KvStore + ?Sized>(
    store: Arc<S>,
    config: &BridgeConfig,
) -> Result<LiveHandler<S>> {
    let (client_id, client_secret) = config.identity.client_credentials()?;
    let timeout = config.target.timeout();
    let exchange = OAuthTokenExchange::new(
        config.identity.token_url.as_str(),
        client_id,
        client_secret,
        timeout,
    );
    let connector = GoogleTasksConnector::new(config.target.api_base.as_str(), timeout);

    Ok(
        WebhookHandler::new(store, exchange, connector, HandlerSettings::from(config))
            .with_tombstone_ttl(config.mapping.tombstone_ttl()),
    )
}
