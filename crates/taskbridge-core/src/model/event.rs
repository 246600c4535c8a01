//! Inbound webhook events and the task snapshot they carry.
//!
//! Event names use the sender's `item:<verb>` colon format. Only `added` and
//! `deleted` have dedicated handling; every other name is a change to an
//! existing task.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// Name of a webhook event as sent by the source tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A task was created.
    ItemAdded,
    /// Fields of a task changed.
    ItemUpdated,
    /// A task was deleted.
    ItemDeleted,
    /// A task was checked off.
    ItemCompleted,
    /// A completed task was reopened.
    ItemUncompleted,
    /// Any other event name, kept verbatim.
    Other(String),
}

/// How the orchestrator treats an event, independent of its exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Deleted,
    Changed,
}

impl EventName {
    /// Return the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ItemAdded => "item:added",
            Self::ItemUpdated => "item:updated",
            Self::ItemDeleted => "item:deleted",
            Self::ItemCompleted => "item:completed",
            Self::ItemUncompleted => "item:uncompleted",
            Self::Other(raw) => raw,
        }
    }

    /// Collapse the name into the three branches of the sync state machine.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ItemAdded => EventKind::Added,
            Self::ItemDeleted => EventKind::Deleted,
            Self::ItemUpdated | Self::ItemCompleted | Self::ItemUncompleted | Self::Other(_) => {
                EventKind::Changed
            }
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "item:added" => Self::ItemAdded,
            "item:updated" => Self::ItemUpdated,
            "item:deleted" => Self::ItemDeleted,
            "item:completed" => Self::ItemCompleted,
            "item:uncompleted" => Self::ItemUncompleted,
            other => Self::Other(other.to_string()),
        })
    }
}

// Custom serde: serialize as the `item:<verb>` string.
impl Serialize for EventName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}

/// Due date of a source task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    pub date: String,
    #[serde(default)]
    pub is_recurring: bool,
}

/// Full current state of a source task at event time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// One webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_name: EventName,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(rename = "event_data")]
    pub task: TaskSnapshot,
}

impl WebhookEvent {
    /// Decode a webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedEvent`] when the body is not a task event.
    pub fn from_slice(body: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(body).map_err(|err| SyncError::MalformedEvent(err.to_string()))
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.event_name.kind()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    })
}
