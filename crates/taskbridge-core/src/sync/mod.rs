//! Per-event sync state machine.
//!
//! The decision for an event depends only on its [`EventKind`] and the
//! [`MappingState`] of its source id. [`decide`] is that table, written as one
//! exhaustive match so the tie-break rules can be read and tested directly:
//!
//! | event    | Mapped(id)   | Tombstone        | Absent          |
//! |----------|--------------|------------------|-----------------|
//! | added    | create       | create           | create          |
//! | deleted  | delete(id)   | ignore           | ignore          |
//! | changed  | update(id)   | ignore           | create          |
//!
//! A tombstone beats every non-`added` event. `added` always creates, so a
//! reused source id after deletion starts a fresh mapping.

pub mod handler;

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::TaskApi;
use crate::clock::Clock;
use crate::error::{ErrorCode, SyncError};
use crate::mapping::{MappingState, MappingStore};
use crate::model::{EventKind, WebhookEvent};
use crate::store::KvStore;
use crate::translate::translate;

pub use handler::{HandlerSettings, WebhookHandler};

/// Why an event produced no remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Delete for a source id that is already tombstoned.
    DuplicateDelete,
    /// Delete for a source id that was never mapped (or whose tombstone expired).
    NothingToDelete,
    /// Change for a source id deleted within the tombstone lifetime.
    StaleAfterDelete,
}

impl IgnoreReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateDelete => "duplicate_delete",
            Self::NothingToDelete => "nothing_to_delete",
            Self::StaleAfterDelete => "stale_after_delete",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single mutation chosen for one event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update { target_id: String },
    Delete { target_id: String },
    Ignore(IgnoreReason),
}

/// Choose the action for an event given the current mapping.
#[must_use]
pub fn decide(kind: EventKind, state: MappingState) -> Action {
    match (kind, state) {
        (EventKind::Added, _) | (EventKind::Changed, MappingState::Absent) => Action::Create,
        (EventKind::Deleted, MappingState::Mapped(target_id)) => Action::Delete { target_id },
        (EventKind::Deleted, MappingState::Tombstone) => {
            Action::Ignore(IgnoreReason::DuplicateDelete)
        }
        (EventKind::Deleted, MappingState::Absent) => Action::Ignore(IgnoreReason::NothingToDelete),
        (EventKind::Changed, MappingState::Mapped(target_id)) => Action::Update { target_id },
        (EventKind::Changed, MappingState::Tombstone) => {
            Action::Ignore(IgnoreReason::StaleAfterDelete)
        }
    }
}

/// What processing one event achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created { target_id: String },
    Updated { target_id: String },
    Deleted { target_id: String },
    Ignored { reason: IgnoreReason },
    /// No usable credential; the event was dropped before any remote call.
    Unauthenticated,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { target_id } => write!(f, "created {target_id}"),
            Self::Updated { target_id } => write!(f, "updated {target_id}"),
            Self::Deleted { target_id } => write!(f, "deleted {target_id}"),
            Self::Ignored { reason } => write!(f, "ignored ({reason})"),
            Self::Unauthenticated => f.write_str("unauthenticated"),
        }
    }
}

/// Knobs for [`SyncOrchestrator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Probe the target before updating a mapped task and recreate it when
    /// the probe fails.
    pub validate_mappings: bool,
}

/// Applies one event against an already-authenticated target list.
pub struct SyncOrchestrator<'a, A, S> {
    api: &'a A,
    mappings: &'a MappingStore<S>,
    clock: &'a dyn Clock,
    options: SyncOptions,
}

impl<'a, A: TaskApi, S: KvStore> SyncOrchestrator<'a, A, S> {
    pub const fn new(
        api: &'a A,
        mappings: &'a MappingStore<S>,
        clock: &'a dyn Clock,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            mappings,
            clock,
            options,
        }
    }

    /// Decide and perform the mutation for `event`.
    ///
    /// The mapping is only written after the remote call succeeded, so a
    /// failed call leaves it as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if a remote call or a store access fails.
    pub fn apply(&self, event: &WebhookEvent) -> Result<SyncOutcome, SyncError> {
        let source_id = event.task.id.as_str();
        let kind = event.kind();
        let mut state = self.mappings.get(source_id)?;

        if kind == EventKind::Added
            && let MappingState::Mapped(previous) = &state
        {
            warn!(previous_target = %previous, "added event overwrites a live mapping");
        }

        if self.options.validate_mappings
            && kind == EventKind::Changed
            && let MappingState::Mapped(target_id) = &state
            && !self.probe(source_id, target_id)?
        {
            state = MappingState::Absent;
        }

        let action = decide(kind, state);
        debug!(?action, "decided");

        let outcome = match action {
            Action::Create => {
                let payload = translate(&event.task, self.clock.now());
                let created = self.api.create(&payload)?;
                self.mappings.put(source_id, &created.id)?;
                SyncOutcome::Created {
                    target_id: created.id,
                }
            }
            Action::Update { target_id } => {
                let payload = translate(&event.task, self.clock.now());
                self.api.update(&target_id, &payload)?;
                SyncOutcome::Updated { target_id }
            }
            Action::Delete { target_id } => {
                self.api.delete(&target_id)?;
                self.mappings.tombstone(source_id)?;
                SyncOutcome::Deleted { target_id }
            }
            Action::Ignore(reason) => SyncOutcome::Ignored { reason },
        };

        info!(outcome = %outcome, "event applied");
        Ok(outcome)
    }

    /// Returns `false` after dropping a mapping whose target task cannot be
    /// retrieved. Any failure counts, not just 404.
    fn probe(&self, source_id: &str, target_id: &str) -> Result<bool, SyncError> {
        match self.api.retrieve(target_id) {
            Ok(_) => Ok(true),
            Err(err) => {
                let reason = if err.is_not_found() {
                    "target task is gone"
                } else {
                    "target task could not be retrieved"
                };
                warn!(
                    code = %ErrorCode::StaleMapping,
                    target_id,
                    reason,
                    error = %err,
                    "stored mapping failed validation, recreating"
                );
                self.mappings.delete(source_id)?;
                Ok(false)
            }
        }
    }
}
