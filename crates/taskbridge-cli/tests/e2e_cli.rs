//! E2E tests for the `tbridge` operator surface.
//!
//! Each test runs the binary as a subprocess against a config file and
//! SQLite store in an isolated temp directory. Nothing here reaches the
//! network: events are either unauthenticated or rejected before any call.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        Self::with_config(
            r#"
[store]
path = "bridge.sqlite3"

[identity]
token_url = "http://127.0.0.1:9/token"
client_id = "test-client"
client_secret = "test-secret"

[target]
api_base = "http://127.0.0.1:9/tasks/v1"
timeout_secs = 1
"#,
        )
    }

    fn with_config(contents: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let config = dir.path().join("config.toml");
        fs::write(&config, contents).expect("write config");
        Self { dir, config }
    }

    /// Build a Command targeting the `tbridge` binary with this workspace's config.
    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tbridge"));
        cmd.current_dir(self.dir.path());
        cmd.arg("--config").arg(&self.config);
        cmd.env("TASKBRIDGE_LOG", "error");
        for var in [
            "TASKBRIDGE_CLIENT_ID",
            "TASKBRIDGE_CLIENT_SECRET",
            "TASKBRIDGE_LIST_ID",
            "TASKBRIDGE_STORE",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(args)
            .arg("--json")
            .output()
            .expect("command should not crash");
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
    }

    fn write_event(&self, name: &str, body: &Value) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, serde_json::to_vec(body).expect("encode")).expect("write event");
        path
    }

    fn store_path(&self) -> PathBuf {
        self.dir.path().join("bridge.sqlite3")
    }
}

fn event(user_id: &str, source_id: &str) -> Value {
    json!({
        "event_name": "item:added",
        "user_id": user_id,
        "event_data": {
            "id": source_id,
            "content": "Water plants",
            "description": "",
            "checked": false,
            "is_deleted": false,
            "due": null
        }
    })
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

// ---------------------------------------------------------------------------
// Credentials and mappings
// ---------------------------------------------------------------------------

#[test]
fn set_refresh_creates_store_next_to_config() {
    let ws = Workspace::new();

    let report = ws.json(&["credentials", "set-refresh", "--user", "42", "--token", "rt-1"]);
    assert_eq!(report["action"], "set_refresh");
    assert_eq!(report["keys"], json!(["refresh-token:42"]));
    assert!(ws.store_path().exists());
}

#[test]
fn set_refresh_reads_token_from_stdin() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["credentials", "set-refresh", "--user", "42"])
        .write_stdin("1//0from-stdin\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh-token:42"));
}

#[test]
fn forget_reports_every_user_key() {
    let ws = Workspace::new();
    ws.json(&["credentials", "set-list", "--user", "42", "--list", "L1"]);

    let report = ws.json(&["credentials", "forget", "--user", "42"]);
    assert_eq!(
        report["keys"],
        json!(["access-token:42", "refresh-token:42", "task-list:42"])
    );
}

#[test]
fn unknown_mapping_is_absent() {
    let ws = Workspace::new();

    let view = ws.json(&["mapping", "show", "6X7rM8"]);
    assert_eq!(view, json!({"source_id": "6X7rM8", "state": "absent"}));
}

#[test]
fn mapping_show_human_output() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["mapping", "show", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state:").and(predicate::str::contains("absent")));
}

#[test]
fn mapping_forget_is_idempotent() {
    let ws = Workspace::new();

    for _ in 0..2 {
        let view = ws.json(&["mapping", "forget", "s1"]);
        assert_eq!(view["state"], "absent");
    }
}

#[test]
fn purge_on_fresh_store_removes_nothing() {
    let ws = Workspace::new();

    let report = ws.json(&["purge"]);
    assert_eq!(report, json!({"removed": 0}));
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[test]
fn process_unauthenticated_user_reports_outcome() {
    let ws = Workspace::new();
    let path = ws.write_event("event.json", &event("7", "s1"));

    let outcome = ws.json(&["process", "--input", path_str(&path)]);
    assert_eq!(outcome, json!({"outcome": "unauthenticated"}));

    let view = ws.json(&["mapping", "show", "s1"]);
    assert_eq!(view["state"], "absent");
}

#[test]
fn process_reads_stdin() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("process")
        .write_stdin(serde_json::to_vec(&event("7", "s1")).expect("encode"))
        .assert()
        .success()
        .stdout(predicate::str::contains("unauthenticated"));
}

#[test]
fn process_numeric_ids_are_accepted() {
    let ws = Workspace::new();
    let mut body = event("7", "s1");
    body["user_id"] = json!(7);
    body["event_data"]["id"] = json!(2_995_104_339_u64);
    let path = ws.write_event("numeric.json", &body);

    let outcome = ws.json(&["process", "--input", path_str(&path)]);
    assert_eq!(outcome["outcome"], "unauthenticated");
}

#[test]
fn process_malformed_event_fails_with_code() {
    let ws = Workspace::new();
    let path = ws.dir.path().join("bad.json");
    fs::write(&path, b"{\"event_name\":\"item:added\"}").expect("write");

    ws.cmd()
        .args(["process", "--input", path_str(&path)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E4002"));
}

#[test]
fn process_failure_is_reported_once() {
    let ws = Workspace::new();
    let path = ws.dir.path().join("bad.json");
    fs::write(&path, b"not json").expect("write");

    let output = ws
        .cmd()
        .args(["process", "--input", path_str(&path)])
        .output()
        .expect("command should not crash");
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("E4002").count(), 1, "{stderr}");
    assert!(stderr.starts_with("error[E4002]"), "{stderr}");
}

#[test]
fn process_json_failure_is_a_single_document() {
    let ws = Workspace::new();
    let path = ws.dir.path().join("bad.json");
    fs::write(&path, b"{}").expect("write");

    let output = ws
        .cmd()
        .args(["process", "--input", path_str(&path), "--json"])
        .output()
        .expect("command should not crash");
    assert!(!output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stderr).expect("stderr is one JSON object");
    assert_eq!(parsed["error"]["error_code"], "E4002");
}

#[test]
fn process_without_identity_fails_with_missing_value() {
    let ws = Workspace::with_config("[store]\npath = \"bridge.sqlite3\"\n");
    let path = ws.write_event("event.json", &event("7", "s1"));

    ws.cmd()
        .args(["process", "--input", path_str(&path)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn process_missing_required_list_is_corrupted_state() {
    let ws = Workspace::with_config(
        r#"
[store]
path = "bridge.sqlite3"

[identity]
client_id = "test-client"
client_secret = "test-secret"

[target]
require_user_list = true
"#,
    );
    ws.json(&["credentials", "set-refresh", "--user", "7", "--token", "rt"]);
    seed_access_token(&ws, "7");

    let path = ws.write_event("event.json", &event("7", "s1"));
    ws.cmd()
        .args(["process", "--input", path_str(&path), "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E4001"));
}

/// Cache an access token so the run never reaches the token endpoint. The
/// CLI has no command for this, so write through the library.
fn seed_access_token(ws: &Workspace, user_id: &str) {
    use taskbridge_core::store::{KvStore, SqliteKv};
    let kv = SqliteKv::open(&ws.store_path()).expect("open store");
    kv.put(
        &format!("access-token:{user_id}"),
        "ya29.cached",
        Some(std::time::Duration::from_secs(3600)),
    )
    .expect("seed access token");
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[test]
fn missing_explicit_config_is_an_error() {
    let ws = Workspace::new();

    Command::new(assert_cmd::cargo::cargo_bin!("tbridge"))
        .args(["--config"])
        .arg(ws.dir.path().join("absent.toml"))
        .arg("purge")
        .env("TASKBRIDGE_LOG", "error")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn completions_mention_binary_name() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tbridge"));
}

#[test]
fn help_lists_subcommands() {
    Command::new(assert_cmd::cargo::cargo_bin!("tbridge"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("serve")
                .and(predicate::str::contains("process"))
                .and(predicate::str::contains("credentials"))
                .and(predicate::str::contains("mapping")),
        );
}
