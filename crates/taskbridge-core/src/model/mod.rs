//! Wire types for both sides of the bridge.

pub mod event;
pub mod task;

pub use event::{Due, EventKind, EventName, TaskSnapshot, WebhookEvent};
pub use task::{RemoteTask, TargetTaskMutation, TaskStatus};
