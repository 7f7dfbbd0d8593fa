//! Integration tests for the `telesync` CLI binary.
//!
//! Argument parsing, help output, completions and config handling run
//! without a device; fetch/alerts/watch run against a mock status
//! endpoint.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::process::Output;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `telesync` binary with env isolation.
///
/// Clears all `TELESYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn telesync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("telesync");
    cmd.env("HOME", "/tmp/telesync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/telesync-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("TELESYNC_PROFILE")
        .env_remove("TELESYNC_CONFIG")
        .env_remove("TELESYNC_STATUS_URL")
        .env_remove("TELESYNC_STREAM_URL")
        .env_remove("TELESYNC_OUTPUT")
        .env_remove("TELESYNC_INSECURE")
        .env_remove("TELESYNC_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run a blocking command from inside an async test.
async fn run(mut cmd: assert_cmd::Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn status_body(temperature: f64) -> serde_json::Value {
    json!({
        "temperature": temperature,
        "humidity": 62,
        "battery": 60,
        "door_open": false,
        "last_update": "2026-02-10T12:00:31Z"
    })
}

async fn status_server(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

fn status_url(server: &MockServer) -> String {
    format!("{}/api/status", server.uri())
}

fn config_arg(path: &Path) -> String {
    path.display().to_string()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = telesync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    telesync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("telemetry")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("fetch"))
            .and(predicate::str::contains("alerts")),
    );
}

#[test]
fn test_version_flag() {
    telesync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("telesync"));
}

#[test]
fn test_completions_bash() {
    telesync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("telesync"));
}

#[test]
fn test_invalid_output_format_is_usage_error() {
    let output = telesync_cmd()
        .args(["fetch", "-o", "xml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_fetch_without_config_or_url() {
    let output = telesync_cmd().arg("fetch").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("No config found"),
        "Expected config hint in output:\n{text}"
    );
}

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("telesync.toml");
    telesync_cmd()
        .args(["--config", &config_arg(&file), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("telesync.toml"));
}

#[test]
fn test_config_init_show_and_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    let file_arg = config_arg(&file);

    telesync_cmd()
        .args([
            "--config",
            &file_arg,
            "config",
            "init",
            "--status-url",
            "http://gw.local:8000/api/status",
        ])
        .assert()
        .success();
    assert!(file.exists());

    // A second init refuses to clobber the file.
    let output = telesync_cmd()
        .args(["--config", &file_arg, "config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6));

    telesync_cmd()
        .args(["--config", &file_arg, "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("http://gw.local:8000/api/status")
                .and(predicate::str::contains("default_profile")),
        );

    telesync_cmd()
        .args(["--config", &file_arg, "-o", "plain", "config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::diff("default\n"));
}

#[test]
fn test_unknown_profile_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    let file_arg = config_arg(&file);
    telesync_cmd()
        .args(["--config", &file_arg, "config", "init"])
        .assert()
        .success();

    let output = telesync_cmd()
        .args(["--config", &file_arg, "-p", "barn", "fetch"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("barn"));
}

// ── Fetch / alerts ──────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_json() {
    let server = status_server(ResponseTemplate::new(200).set_body_json(status_body(4.5))).await;

    let mut cmd = telesync_cmd();
    cmd.args(["fetch", "-o", "json", "--status-url", &status_url(&server)]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["source"], "pull");
    assert_eq!(value["fields"]["temperature"], 4.5);
    assert_eq!(value["fields"]["door_open"], false);
    assert!(value["fields"].get("last_update").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_plain() {
    let server = status_server(ResponseTemplate::new(200).set_body_json(status_body(4.5))).await;

    let mut cmd = telesync_cmd();
    cmd.args(["fetch", "-o", "plain", "--status-url", &status_url(&server)]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("temperature=4.5"), "{stdout}");
    assert!(stdout.contains("battery=60"), "{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_server_error_is_connection_failure() {
    let server = status_server(ResponseTemplate::new(503)).await;

    let mut cmd = telesync_cmd();
    cmd.args(["fetch", "--status-url", &status_url(&server)]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetch_html_is_payload_error() {
    let server =
        status_server(ResponseTemplate::new(200).set_body_string("<html>login</html>")).await;

    let mut cmd = telesync_cmd();
    cmd.args(["fetch", "--status-url", &status_url(&server)]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(9), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_fail_on_warning() {
    let server = status_server(ResponseTemplate::new(200).set_body_json(status_body(7.0))).await;

    let mut cmd = telesync_cmd();
    cmd.args([
        "alerts",
        "-o",
        "plain",
        "--fail-on",
        "warning",
        "--status-url",
        &status_url(&server),
    ]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(10), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("warning\tTemperature warning"), "{stdout}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alerts_all_clear() {
    let server = status_server(ResponseTemplate::new(200).set_body_json(status_body(4.0))).await;

    let mut cmd = telesync_cmd();
    cmd.args([
        "alerts",
        "-o",
        "plain",
        "--fail-on",
        "warning",
        "--status-url",
        &status_url(&server),
    ]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert!(String::from_utf8_lossy(&output.stdout).contains("normal"));
}

// ── Watch ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_pull_only_emits_json_lines() {
    let server = status_server(ResponseTemplate::new(200).set_body_json(status_body(4.5))).await;

    let mut cmd = telesync_cmd();
    cmd.args([
        "watch",
        "--pull-only",
        "--count",
        "1",
        "-o",
        "json-compact",
        "--status-url",
        &status_url(&server),
    ])
    .timeout(std::time::Duration::from_secs(30));
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(events[0]["event"], "state");
    let snapshot = events
        .iter()
        .find(|e| e["event"] == "snapshot")
        .expect("a snapshot event");
    assert_eq!(snapshot["snapshot"]["source"], "pull");
    assert_eq!(snapshot["snapshot"]["fields"]["temperature"], 4.5);
}
