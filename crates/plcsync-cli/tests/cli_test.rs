//! Integration tests for the `plcsync` CLI binary.
//!
//! These tests cover argument parsing, help output, shell completions,
//! config handling and error exit codes. None of them needs a live
//! controller.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `plcsync` binary with env isolation.
///
/// Clears the `PLCSYNC_*` variables and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn plcsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("plcsync");
    cmd.env("HOME", "/tmp/plcsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/plcsync-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/plcsync-cli-test-nonexistent")
        .env_remove("PLCSYNC_CONFIG")
        .env_remove("PLCSYNC_OUTPUT")
        .env_remove("PLCSYNC_USERNAME")
        .env_remove("PLCSYNC_DATA_DIR")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A scratch data dir, calendar file and config file. `defaults` is
/// appended verbatim to the `[defaults]` table.
struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(defaults: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let toml = format!(
            "data_dir = {data:?}\ncalendar_file = {calendar:?}\n\n[defaults]\n{defaults}\n",
            data = dir.path().join("data").display().to_string(),
            calendar = dir.path().join("calendar.json").display().to_string(),
        );
        std::fs::write(&config, toml).unwrap();
        std::fs::write(dir.path().join("calendar.json"), "[]").unwrap();
        Self { dir, config }
    }

    fn with_calendar(self, json: &str) -> Self {
        std::fs::write(self.dir.path().join("calendar.json"), json).unwrap();
        self
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = plcsync_cmd();
        cmd.arg("--config").arg(&self.config);
        cmd
    }
}

/// Credentials for every target, and a gateway nothing listens on.
const UNREACHABLE: &str = "username = \"operador\"\n\
    password = \"segredo\"\n\
    api_url = \"http://127.0.0.1:1/scadaweb/api\"\n\
    retry_count = 0\n\
    write_delay_ms = 0\n\
    timeout = 2";

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = plcsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    plcsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("PLC registers")
            .and(predicate::str::contains("sync"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("run")),
    );
}

#[test]
fn test_version_flag() {
    plcsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("plcsync"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    plcsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    plcsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    plcsync_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_masks_passwords() {
    let ws = Workspace::new(UNREACHABLE);
    ws.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********")
                .and(predicate::str::contains("segredo").not())
                .and(predicate::str::contains("operador")),
        );
}

#[test]
fn test_invalid_schedule_time_is_a_usage_error() {
    let ws = Workspace::new("times = [\"25:00\"]");
    ws.cmd().arg("status").assert().code(2);
}

// ── Targets and status ──────────────────────────────────────────────

#[test]
fn test_builtin_targets_listed() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["targets", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plenario").and(predicate::str::contains("auditorio")));
}

#[test]
fn test_status_without_credentials() {
    let ws = Workspace::new("");
    let output = ws
        .cmd()
        .args(["status", "plenario", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["key"], "plenario");
    assert_eq!(report["state"], "never_synced");
    assert_eq!(report["data_version"], 0);
}

#[test]
fn test_status_all_targets_plain() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["status", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("plenario\tnever_synced")
                .and(predicate::str::contains("auditorio\tnever_synced")),
        );
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = plcsync_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_unknown_target() {
    let ws = Workspace::new(UNREACHABLE);
    ws.cmd()
        .args(["sync", "garagem"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("garagem"));
}

#[test]
fn test_sync_without_credentials() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["sync", "plenario"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("credentials"));
}

#[test]
fn test_clear_requires_yes_when_not_interactive() {
    let ws = Workspace::new(UNREACHABLE);
    ws.cmd()
        .args(["clear", "plenario"])
        .write_stdin("")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_sync_unreachable_gateway_records_failure() {
    let ws = Workspace::new(UNREACHABLE);
    ws.cmd().args(["sync", "plenario", "-q"]).assert().code(7);

    let output = ws
        .cmd()
        .args(["status", "plenario", "-o", "json"])
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["state"], "failed");
    assert_eq!(report["controller_available"], false);
    assert!(ws.path().join("data/plenario_status.json").exists());
}

// ── Plan ────────────────────────────────────────────────────────────

#[test]
fn test_plan_is_offline() {
    let ws = Workspace::new(UNREACHABLE).with_calendar(
        r#"[
            {"id": "h1", "kind": "holiday", "date": "2025-04-21", "label": "Tiradentes"},
            {"id": "e1", "kind": "event", "date": "2025-04-22",
             "time": {"start": "14:00", "end": "17:30"},
             "label": "Sessão ordinária", "location": "Plenário"}
        ]"#,
    );

    ws.cmd()
        .args(["plan", "plenario", "--at", "2025-04-01 08:00", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("N33:0=21")
                .and(predicate::str::contains("N34:0=4"))
                .and(predicate::str::contains("N60:0=22"))
                .and(predicate::str::contains("N62:0=14"))
                .and(predicate::str::contains("N65:0=30")),
        );

    let output = ws
        .cmd()
        .args(["plan", "plenario", "--at", "2025-04-01 08:00", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["target"], "plenario");
    assert_eq!(plan["banks"].as_array().unwrap().len(), 2);
}

#[test]
fn test_plan_rejects_bad_time() {
    let ws = Workspace::new(UNREACHABLE);
    ws.cmd()
        .args(["plan", "plenario", "--at", "amanhã"])
        .assert()
        .code(2);
}
