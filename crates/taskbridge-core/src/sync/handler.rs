//! Full pipeline for one webhook delivery: credential, target list, then the
//! orchestrator.

use std::sync::Arc;

use tracing::{error, info, info_span, warn};

use super::{SyncOptions, SyncOrchestrator, SyncOutcome};
use crate::client::TaskApiConnector;
use crate::clock::{Clock, SystemClock};
use crate::config::{BridgeConfig, DEFAULT_LIST_ID};
use crate::credential::{CredentialProvider, TokenExchange};
use crate::error::{ErrorCode, SyncError};
use crate::mapping::MappingStore;
use crate::model::WebhookEvent;
use crate::store::KvStore;

/// Per-user target list key.
#[must_use]
pub fn task_list_key(user_id: &str) -> String {
    format!("task-list:{user_id}")
}

/// Handler behaviour that comes from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// List used when the user has no `task-list:{userId}` entry.
    pub fallback_list_id: String,
    /// Fail with corrupted state instead of falling back.
    pub require_user_list: bool,
    pub sync: SyncOptions,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            fallback_list_id: DEFAULT_LIST_ID.to_string(),
            require_user_list: false,
            sync: SyncOptions::default(),
        }
    }
}

impl From<&BridgeConfig> for HandlerSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            fallback_list_id: config.target.fallback_list_id().to_string(),
            require_user_list: config.target.require_user_list,
            sync: SyncOptions {
                validate_mappings: config.target.validate_mappings,
            },
        }
    }
}

/// Owns every collaborator needed to process webhook events.
///
/// One call to [`WebhookHandler::handle`] is one sequential unit of work.
/// Concurrent calls for the same source id are not serialized; the last
/// mapping write wins.
pub struct WebhookHandler<S: ?Sized, X, C> {
    kv: Arc<S>,
    credentials: CredentialProvider<Arc<S>, X>,
    mappings: MappingStore<Arc<S>>,
    connector: C,
    clock: Arc<dyn Clock>,
    settings: HandlerSettings,
}

impl<S, X, C> WebhookHandler<S, X, C>
where
    S: KvStore + ?Sized,
    X: TokenExchange,
    C: TaskApiConnector,
{
    pub fn new(kv: Arc<S>, exchange: X, connector: C, settings: HandlerSettings) -> Self {
        Self::with_clock(kv, exchange, connector, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        kv: Arc<S>,
        exchange: X,
        connector: C,
        settings: HandlerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials: CredentialProvider::new(Arc::clone(&kv), exchange),
            mappings: MappingStore::new(Arc::clone(&kv)),
            kv,
            connector,
            clock,
            settings,
        }
    }

    /// Replace the mapping store's tombstone lifetime.
    #[must_use]
    pub fn with_tombstone_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.mappings = MappingStore::with_tombstone_ttl(Arc::clone(&self.kv), ttl);
        self
    }

    /// Process one decoded event.
    ///
    /// # Errors
    ///
    /// Returns the first failure; nothing is retried.
    pub fn handle(&self, event: &WebhookEvent) -> Result<SyncOutcome, SyncError> {
        let span = info_span!(
            "sync_event",
            event = %event.event_name,
            user = %event.user_id,
            source_id = %event.task.id,
        );
        let _guard = span.enter();

        let Some(credential) = self.credentials.resolve(&event.user_id)? else {
            info!(
                code = %ErrorCode::Unauthenticated,
                "no credential for user, dropping event"
            );
            return Ok(SyncOutcome::Unauthenticated);
        };

        let list_id = self.list_id(&event.user_id)?;
        let api = self.connector.connect(&list_id, &credential);
        SyncOrchestrator::new(&api, &self.mappings, self.clock.as_ref(), self.settings.sync)
            .apply(event)
    }

    /// Decode and process a raw webhook body. Never fails: every error is
    /// logged with its code and the delivery is still acknowledged.
    pub fn acknowledge(&self, body: &[u8]) -> Option<SyncOutcome> {
        let event = match WebhookEvent::from_slice(body) {
            Ok(event) => event,
            Err(err) => {
                warn!(code = %err.code(), error = %err, "dropping undecodable webhook body");
                return None;
            }
        };

        match self.handle(&event) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(
                    code = %err.code(),
                    event = %event.event_name,
                    user = %event.user_id,
                    source_id = %event.task.id,
                    error = %err,
                    "event dropped"
                );
                None
            }
        }
    }

    fn list_id(&self, user_id: &str) -> Result<String, SyncError> {
        if let Some(list_id) = self.kv.get(&task_list_key(user_id))? {
            return Ok(list_id);
        }
        if self.settings.require_user_list {
            return Err(SyncError::CorruptedState(format!(
                "{} is missing",
                task_list_key(user_id)
            )));
        }
        Ok(self.settings.fallback_list_id.clone())
    }
}
