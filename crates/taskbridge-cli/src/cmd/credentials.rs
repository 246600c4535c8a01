//! Operator access to the per-user keys the pipeline reads.
//!
//! Refresh tokens are stored without expiry. Access tokens are only ever
//! written by the pipeline itself.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use taskbridge_core::credential::{access_token_key, refresh_token_key};
use taskbridge_core::store::KvStore;
use taskbridge_core::sync::handler::task_list_key;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Subcommand, Debug)]
pub enum CredentialsCommand {
    #[command(
        about = "Store a user's long-lived refresh token",
        after_help = "EXAMPLES:\n    # Pass the token inline\n    tbridge credentials set-refresh --user 1234 --token 1//0g...\n\n    # Read the token from stdin\n    pass show todoist/1234 | tbridge credentials set-refresh --user 1234"
    )]
    SetRefresh {
        /// Source user id.
        #[arg(long)]
        user: String,

        /// Refresh token; read from stdin when omitted.
        #[arg(long)]
        token: Option<String>,
    },

    #[command(about = "Store the target list events for a user are mirrored into")]
    SetList {
        /// Source user id.
        #[arg(long)]
        user: String,

        /// Target list id.
        #[arg(long)]
        list: String,
    },

    #[command(about = "Remove every stored key for a user")]
    Forget {
        /// Source user id.
        #[arg(long)]
        user: String,
    },
}

#[derive(Debug, Serialize)]
struct CredentialsReport {
    user: String,
    action: &'static str,
    keys: Vec<String>,
}

/// Execute a `credentials` subcommand against `store`.
///
/// # Errors
///
/// Returns an error if the token cannot be read or the store write fails.
pub fn run_credentials(
    command: &CredentialsCommand,
    store: &dyn KvStore,
    output: OutputMode,
) -> Result<()> {
    let report = match command {
        CredentialsCommand::SetRefresh { user, token } => {
            let token = match token {
                Some(token) => token.trim().to_string(),
                None => read_token(io::stdin().lock())?,
            };
            if token.is_empty() {
                anyhow::bail!("refresh token is empty");
            }
            let key = refresh_token_key(user);
            store.put(&key, &token, None).context("store refresh token")?;
            // A cached access token may belong to the previous grant.
            store
                .delete(&access_token_key(user))
                .context("clear cached access token")?;
            CredentialsReport {
                user: user.clone(),
                action: "set_refresh",
                keys: vec![key],
            }
        }
        CredentialsCommand::SetList { user, list } => {
            let key = task_list_key(user);
            store.put(&key, list, None).context("store task list")?;
            CredentialsReport {
                user: user.clone(),
                action: "set_list",
                keys: vec![key],
            }
        }
        CredentialsCommand::Forget { user } => {
            let keys = vec![
                access_token_key(user),
                refresh_token_key(user),
                task_list_key(user),
            ];
            for key in &keys {
                store.delete(key).with_context(|| format!("delete {key}"))?;
            }
            CredentialsReport {
                user: user.clone(),
                action: "forget",
                keys,
            }
        }
    };

    render(output, &report, |r, w| {
        pretty_kv(w, "user", &r.user)?;
        pretty_kv(w, "action", r.action)?;
        pretty_kv(w, "keys", r.keys.join(", "))
    })
}

fn read_token(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("read refresh token from stdin")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbridge_core::store::MemoryKv;

    #[test]
    fn set_refresh_stores_token_and_drops_cached_access() {
        let store = MemoryKv::new();
        store
            .put("access-token:u1", "old", Some(std::time::Duration::from_secs(60)))
            .expect("seed");

        run_credentials(
            &CredentialsCommand::SetRefresh {
                user: "u1".into(),
                token: Some(" rt-1 \n".into()),
            },
            &store,
            OutputMode::Json,
        )
        .expect("set refresh");

        assert_eq!(store.get("refresh-token:u1").expect("get").as_deref(), Some("rt-1"));
        assert_eq!(store.get("access-token:u1").expect("get"), None);
    }

    #[test]
    fn empty_token_is_rejected() {
        let store = MemoryKv::new();
        let err = run_credentials(
            &CredentialsCommand::SetRefresh {
                user: "u1".into(),
                token: Some("   ".into()),
            },
            &store,
            OutputMode::Json,
        )
        .expect_err("empty token");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn forget_removes_all_user_keys() {
        let store = MemoryKv::new();
        for key in ["access-token:u1", "refresh-token:u1", "task-list:u1", "refresh-token:u2"] {
            store.put(key, "v", None).expect("seed");
        }

        run_credentials(
            &CredentialsCommand::Forget { user: "u1".into() },
            &store,
            OutputMode::Json,
        )
        .expect("forget");

        assert!(store.get("refresh-token:u1").expect("get").is_none());
        assert!(store.get("task-list:u1").expect("get").is_none());
        assert!(store.get("refresh-token:u2").expect("get").is_some());
    }

    #[test]
    fn token_is_read_from_first_line() {
        let token = read_token("1//0abc\nignored\n".as_bytes()).expect("read");
        assert_eq!(token, "1//0abc");
    }
}
