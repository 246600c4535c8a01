//! taskbridge-core library.
//!
//! Mirrors source-tracker webhook events onto a target task list. The pieces,
//! leaves first: [`credential`] resolves a bearer token per user,
//! [`translate`] maps a snapshot to a target payload, [`mapping`] remembers
//! source-to-target ids with tombstones, [`client`] talks to the target API,
//! and [`sync`] decides and applies one mutation per event.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums inside the pipeline; `anyhow::Result`
//!   for config and store opening.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod client;
pub mod clock;
pub mod config;
pub mod credential;
pub mod db;
pub mod error;
pub mod mapping;
pub mod model;
pub mod store;
pub mod sync;
pub mod translate;

pub use error::{ErrorCode, SyncError};
pub use sync::{SyncOutcome, WebhookHandler};
