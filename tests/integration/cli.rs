//! Binary-level smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Node home whose config disables the startup check and points releases at
/// an unroutable host, so no test touches the network.
fn offline_home() -> TempDir {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("push-validator.toml"),
        "[release]\napi_base = \"http://127.0.0.1:9\"\n\n[update]\ncheck_on_startup = false\n",
    )
    .unwrap();
    dir
}

fn cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("push-validator").unwrap();
    cmd.env_remove("RUST_LOG").arg("--home").arg(home);
    cmd
}

#[test]
fn test_version() {
    let home = offline_home();
    cmd(home.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_json() {
    let home = offline_home();
    let output = cmd(home.path()).args(["--output", "json", "version"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_status_json() {
    let home = offline_home();
    let output = cmd(home.path()).args(["-o", "json", "status"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["cli_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["daemon_running"], false);
    assert!(value["update_check"].is_null());
}

#[test]
fn test_status_text() {
    let home = offline_home();
    cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Node home:"))
        .stdout(predicate::str::contains("never checked"));
}

#[test]
fn test_rollback_without_backup_exits_30() {
    let home = offline_home();
    let target = home.path().join("bin").join("push-validator");
    cmd(home.path())
        .args(["update", "--rollback", "--install-path"])
        .arg(&target)
        .assert()
        .code(30)
        .stderr(predicate::str::contains("nothing to roll back"));
}

#[test]
fn test_chain_rollback_without_backup_exits_30() {
    let home = offline_home();
    let target = home.path().join("bin").join("pchaind");
    cmd(home.path())
        .args(["chain", "rollback", "--install-path"])
        .arg(&target)
        .assert()
        .code(30);
}

#[test]
fn test_peers_refresh_without_url_exits_30() {
    let home = offline_home();
    cmd(home.path())
        .args(["peers", "refresh"])
        .assert()
        .code(30)
        .stderr(predicate::str::contains("remote_url"));
}

#[test]
fn test_update_check_network_failure_exits_10() {
    let home = offline_home();
    cmd(home.path())
        .args(["update", "--check"])
        .assert()
        .code(10)
        .stdout(predicate::str::contains("Update available").not());
}

#[test]
fn test_conflicting_flags_are_rejected() {
    let home = offline_home();
    cmd(home.path())
        .args(["update", "--skip-verify", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_malformed_config_is_reported() {
    let home = offline_home();
    std::fs::write(home.path().join("config").join("push-validator.toml"), "[update\n").unwrap();
    cmd(home.path())
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config"));
}
