//! Installation-path invariants across repeated updates and rollbacks.

#![cfg(unix)]

use push_validator_cli::core::{EXIT_PRECONDITION, UpdateError};
use push_validator_cli::test_utils::{TestServer, script_binary};
use push_validator_cli::upgrade::{AtomicInstaller, BinaryInstaller, UpdateOptions};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::harness::{atomic, options, orchestrator, publish};

async fn install_tag(path: &std::path::Path, tag: &str, current: &str) {
    let server = TestServer::start().await;
    let version = tag.trim_start_matches('v');
    publish(&server, tag, &script_binary(version), Some(true));
    let opts = UpdateOptions {
        force: true,
        ..options(current)
    };
    let outcome =
        orchestrator(&server, atomic(path)).run(&opts, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.installed_version.as_deref(), Some(version));
}

#[tokio::test]
async fn test_rollback_restores_exactly_one_generation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");

    install_tag(&path, "v1.0.0", "").await;
    install_tag(&path, "v1.1.0", "v1.0.0").await;
    install_tag(&path, "v1.2.0", "v1.1.0").await;

    let installer = AtomicInstaller::new(&path);
    assert_eq!(std::fs::read(&path).unwrap(), script_binary("1.2.0"));
    assert_eq!(std::fs::read(installer.old_path()).unwrap(), script_binary("1.1.0"));

    installer.rollback().await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), script_binary("1.1.0"));

    // v1.0.0 was discarded when v1.2.0 moved v1.1.0 aside.
    let err = installer.rollback().await.unwrap_err();
    assert!(matches!(err, UpdateError::NothingToRollback { .. }));
    assert_eq!(err.exit_code(), EXIT_PRECONDITION);
    assert_eq!(std::fs::read(&path).unwrap(), script_binary("1.1.0"));
}

#[tokio::test]
async fn test_no_transient_files_after_update() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bin").join("pchaind");
    install_tag(&path, "v1.0.0", "").await;
    install_tag(&path, "v2.0.0", "v1.0.0").await;

    let mut names: Vec<String> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["pchaind", "pchaind.lock", "pchaind.old"]);
}

#[tokio::test]
async fn test_concurrent_installs_leave_one_complete_binary() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");
    let installer: Arc<dyn BinaryInstaller> = atomic(&path);

    let payloads: Vec<Vec<u8>> = (1..=3).map(|i| script_binary(&format!("{i}.0.0"))).collect();
    let mut handles = Vec::new();
    for payload in payloads.clone() {
        let installer = Arc::clone(&installer);
        handles.push(tokio::spawn(async move {
            installer.install(&payload, &CancellationToken::new()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let current = std::fs::read(&path).unwrap();
    assert!(payloads.contains(&current));
    let previous = std::fs::read(AtomicInstaller::new(&path).old_path()).unwrap();
    assert!(payloads.contains(&previous));
    assert_ne!(current, previous);
}
