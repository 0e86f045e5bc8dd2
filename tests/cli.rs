//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

/// Command isolated from the user's config and environment
fn shopchat(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("shopchat").unwrap();
    cmd.env("SHOPCHAT_CONFIG", tmp.path().join("config.toml"))
        .env_remove("SHOPCHAT_API_BASE")
        .env_remove("SHOPCHAT_USERNAME")
        .env_remove("SHOPCHAT_PASSWORD")
        .env_remove("SHOPCHAT_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    shopchat(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("similar"))
        .stdout(predicate::str::contains("login"));
}

#[test]
fn test_ask_help() {
    let tmp = TempDir::new().unwrap();
    shopchat(&tmp)
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--category"))
        .stdout(predicate::str::contains("--limit"));
}

#[test]
fn test_missing_api_base_fails_with_hint() {
    let tmp = TempDir::new().unwrap();
    shopchat(&tmp)
        .args(["ask", "gold necklace"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API base URL is not configured"))
        .stderr(predicate::str::contains("--api-base"));
}

#[test]
fn test_invalid_api_base_rejected() {
    let tmp = TempDir::new().unwrap();
    shopchat(&tmp)
        .args(["--api-base", "ftp://shop.test", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("http or https"));
}

#[test]
fn test_zero_limit_rejected() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        "[api]\nbase_url = \"http://127.0.0.1:9\"\n[auth]\ntoken = \"preset\"\nusername = \"ana\"\n",
    )
    .unwrap();

    shopchat(&tmp)
        .env("HOME", tmp.path())
        .env("XDG_DATA_HOME", tmp.path().join("data"))
        .args(["ask", "rings", "--limit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit must be greater than zero"));
}

#[test]
fn test_invalid_config_file_reported() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("config.toml"), "[api\n").unwrap();

    shopchat(&tmp)
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn test_logout_wipes_local_credentials_without_backend() {
    let tmp = TempDir::new().unwrap();
    let creds = tmp.path().join("creds.json");
    std::fs::write(&creds, r#"{"access_token":"tok-old"}"#).unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        format!("[auth]\ncredentials_path = {:?}\n", creds),
    )
    .unwrap();

    shopchat(&tmp)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    assert!(!creds.exists());
}
