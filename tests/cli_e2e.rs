//! End-to-end CLI tests for the timeshift binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn timeshift() -> Command {
    let mut cmd = Command::cargo_bin("timeshift").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Writes a config file with credentials and returns its path.
fn write_config(dir: &TempDir, extra: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let data_dir = dir.path().join("data");
    std::fs::write(
        &path,
        format!(
            "username = \"me@example.com\"\npassword = \"secret\"\ndata_dir = \"{}\"\n{extra}",
            data_dir.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_binary_help_displays_usage() {
    timeshift()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reserve niconico live timeshifts"))
        .stdout(predicate::str::contains("reserve"))
        .stdout(predicate::str::contains("download"));
}

#[test]
fn test_binary_version_displays_version() {
    timeshift()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("timeshift"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    timeshift().assert().failure().code(2);
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    timeshift()
        .args(["reserve", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    timeshift()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("reserve")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_config_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "read_timeout_secs = 20\n").unwrap();
    timeshift()
        .arg("--config")
        .arg(&path)
        .arg("download")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("username"));
}

#[test]
fn test_unknown_config_key_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "concurrency = 4\n");
    timeshift()
        .arg("--config")
        .arg(&path)
        .arg("reserve")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_reserve_without_search_words_fails_before_login() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    timeshift()
        .arg("--config")
        .arg(&path)
        .arg("reserve")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("search words file"));
    assert!(dir.path().join("data").is_dir(), "data dir is created");
}

#[test]
fn test_quiet_flag_suppresses_startup_log() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    timeshift()
        .args(["-q", "--config"])
        .arg(&path)
        .arg("reserve")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("timeshift starting").not());
}
