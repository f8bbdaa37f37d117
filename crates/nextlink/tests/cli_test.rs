//! Integration tests for the `nextlink` CLI binary.
//!
//! Argument parsing, config handling and error exit codes, plus a few
//! commands against a wiremock server standing in for Nextcloud.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `nextlink` binary with env isolation.
///
/// Clears all `NEXTLINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn nextlink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("nextlink");
    cmd.env("HOME", "/tmp/nextlink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/nextlink-cli-test-nonexistent")
        .env_remove("NEXTLINK_ACCOUNT")
        .env_remove("NEXTLINK_SERVICE")
        .env_remove("NEXTLINK_CONFIG")
        .env_remove("NEXTLINK_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a config with one password account pointing at `server_url`.
fn write_config(dir: &TempDir, server_url: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let body = format!(
        r#"
default_account = 1

[defaults]
keyring = false

[[accounts]]
id = 1
display_name = "Alice"
server_url = "{server_url}"
username = "alice"
password = "hunter2"

[[accounts]]
id = 2
display_name = "Disabled"
server_url = "{server_url}"
username = "bob"
password = "secret"
enabled = false
"#
    );
    std::fs::write(&path, body).unwrap();
    path
}

fn config_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run a prepared command off the async runtime so wiremock keeps serving.
async fn run_blocking(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = nextlink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    nextlink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Nextcloud")
            .and(predicate::str::contains("accounts"))
            .and(predicate::str::contains("ls"))
            .and(predicate::str::contains("notifications")),
    );
}

#[test]
fn test_version_flag() {
    nextlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nextlink"));
}

#[test]
fn test_invalid_output_format_is_usage_error() {
    nextlink_cmd()
        .args(["--output", "xml", "accounts"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    nextlink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    nextlink_cmd()
        .args(["--config", &config_arg(&path), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_show_redacts_passwords() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "https://cloud.example.com");
    nextlink_cmd()
        .args(["--config", &config_arg(&path), "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("***")
                .and(predicate::str::contains("hunter2").not())
                .and(predicate::str::contains("cloud.example.com")),
        );
}

#[test]
fn test_set_secret_for_unknown_account_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "https://cloud.example.com");
    nextlink_cmd()
        .args(["--config", &config_arg(&path), "config", "set-secret", "9"])
        .write_stdin("pw\n")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Account 9 not found"));
}

// ── Accounts ────────────────────────────────────────────────────────

#[test]
fn test_passive_accounts_lists_only_eligible() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "https://cloud.example.com");
    nextlink_cmd()
        .args([
            "--config",
            &config_arg(&path),
            "--output",
            "plain",
            "accounts",
            "--passive",
        ])
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn test_accounts_sign_in_reports_ready() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "https://cloud.example.com");
    nextlink_cmd()
        .args(["--config", &config_arg(&path), "--output", "json", "accounts"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""state": "ready""#)
                .and(predicate::str::contains(r#""auth": "basic""#))
                .and(predicate::str::contains("/remote.php/dav/files/alice/")),
        );
}

#[test]
fn test_account_without_secret_fails_aggregation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[defaults]
keyring = false

[[accounts]]
id = 5
server_url = "https://cloud.example.com"
username = "carol"
"#,
    )
    .unwrap();

    nextlink_cmd()
        .args(["--config", &config_arg(&path), "ls"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No signed-in account"));
}

#[test]
fn test_no_accounts_configured() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");
    nextlink_cmd()
        .args(["--config", &config_arg(&path), "whoami"])
        .assert()
        .code(3);
}

// ── Against a server ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_ls_prints_directory_entries() {
    let server = MockServer::start().await;
    let body = r#"<d:multistatus xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">
      <d:response><d:href>/remote.php/dav/files/alice/</d:href>
        <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
      </d:response>
      <d:response><d:href>/remote.php/dav/files/alice/Documents/</d:href>
        <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
      </d:response>
      <d:response><d:href>/remote.php/dav/files/alice/notes.txt</d:href>
        <d:propstat><d:prop><oc:size>12</oc:size></d:prop></d:propstat>
      </d:response>
    </d:multistatus>"#;
    Mock::given(method("PROPFIND"))
        .and(path("/remote.php/dav/files/alice/"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(207).set_body_string(body))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri());
    let mut cmd = nextlink_cmd();
    cmd.args(["--config", &config_arg(&config), "--output", "plain", "ls"]);

    let output = run_blocking(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Documents\nnotes.txt\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthorized_flags_account_for_update() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ocs/v2.php/cloud/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri());
    let mut cmd = nextlink_cmd();
    cmd.args(["--config", &config_arg(&config), "whoami"]);

    let output = run_blocking(cmd).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("credentials_need_update = true"), "{saved}");

    // The flagged account is no longer eligible.
    let mut cmd = nextlink_cmd();
    cmd.args(["--config", &config_arg(&config), "whoami"]);
    let output = run_blocking(cmd).await;
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("No usable credentials for account 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whoami_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ocs/v2.php/cloud/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ocs": {
                "meta": { "statuscode": 200, "message": "OK" },
                "data": { "id": "alice", "display-name": "Alice Liddell" }
            }
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &server.uri());
    let mut cmd = nextlink_cmd();
    cmd.args(["--config", &config_arg(&config), "-o", "json-compact", "whoami"]);

    let output = run_blocking(cmd).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"user_id":"alice","display_name":"Alice Liddell"}"#
    );
}
