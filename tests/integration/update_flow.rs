//! Full update runs against the local release host.

#![cfg(unix)]

use push_validator_cli::core::{EXIT_PROCESS, EXIT_VALIDATION, UpdateError, user_friendly_error};
use push_validator_cli::test_utils::{
    FailingRollbackInstaller, TestServer, failing_binary, script_binary, write_executable,
};
use push_validator_cli::upgrade::{AtomicInstaller, UpdateCache, UpdateOptions, UpdateStatus};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::harness::{atomic, options, orchestrator, publish};

const OLD_BINARY: &[u8] = b"#!/bin/sh\necho \"1.0.0\"\n";

fn rendered(err: UpdateError) -> String {
    user_friendly_error(anyhow::Error::from(err)).to_string()
}

#[tokio::test]
async fn test_happy_path_update() {
    let server = TestServer::start().await;
    let published = publish(&server, "v2.0.0", &script_binary("2.0.0"), Some(true));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bin").join("pchaind");
    write_executable(&path, OLD_BINARY);
    let cache = UpdateCache::new(dir.path().join(".update-cache.json"));

    let outcome = orchestrator(&server, atomic(&path))
        .with_cache(cache.clone())
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.status, UpdateStatus::Installed);
    assert_eq!(outcome.installed_version.as_deref(), Some("2.0.0"));
    assert_eq!(outcome.checksum.as_deref(), Some(&published.manifest[..64]));
    assert_eq!(std::fs::read(&path).unwrap(), script_binary("2.0.0"));
    assert_eq!(std::fs::read(AtomicInstaller::new(&path).old_path()).unwrap(), OLD_BINARY);

    let entry = cache.load().unwrap();
    assert_eq!(entry.latest_version, "v2.0.0");
    assert!(!entry.update_available);
    assert!(entry.is_valid());

    assert_eq!(server.hit_count(&format!("/download/{}", published.asset_name)), 1);
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_install_path_untouched() {
    let server = TestServer::start().await;
    publish(&server, "v2.0.0", &script_binary("2.0.0"), Some(false));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");
    write_executable(&path, OLD_BINARY);

    let err = orchestrator(&server, atomic(&path))
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_VALIDATION);
    assert!(rendered(err).contains("checksum verification failed"));
    assert_eq!(std::fs::read(&path).unwrap(), OLD_BINARY);
    let installer = AtomicInstaller::new(&path);
    assert!(!installer.old_path().exists());
    assert!(!installer.new_path().exists());
}

#[tokio::test]
async fn test_broken_release_is_rolled_back() {
    let server = TestServer::start().await;
    publish(&server, "v2.0.0", &failing_binary(), Some(true));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");
    write_executable(&path, OLD_BINARY);

    let err = orchestrator(&server, atomic(&path))
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), EXIT_PROCESS);
    let message = rendered(err);
    assert!(message.contains("verification failed"), "{message}");
    assert!(message.contains("rolled back"), "{message}");
    assert_eq!(std::fs::read(&path).unwrap(), OLD_BINARY);
}

#[tokio::test]
async fn test_broken_release_with_failed_rollback() {
    let server = TestServer::start().await;
    publish(&server, "v2.0.0", &failing_binary(), Some(true));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");
    write_executable(&path, OLD_BINARY);

    let err = orchestrator(&server, Arc::new(FailingRollbackInstaller::new(&path)))
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap_err();

    let message = rendered(err);
    assert!(message.contains("rollback failed"), "{message}");
    assert!(message.contains("verification failed"), "{message}");
    assert!(message.contains("exited with"), "{message}");
}

#[tokio::test]
async fn test_missing_manifest_tolerated_unless_strict() {
    let server = TestServer::start().await;
    publish(&server, "v2.0.0", &script_binary("2.0.0"), None);
    let dir = TempDir::new().unwrap();

    let strict_path = dir.path().join("strict").join("pchaind");
    let strict = UpdateOptions {
        strict: true,
        ..options("v1.0.0")
    };
    let err = orchestrator(&server, atomic(&strict_path))
        .run(&strict, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::ChecksumUnavailable { .. }), "{err:?}");
    assert!(!strict_path.exists());
    // The derived manifest location was tried.
    assert!(server.hits().iter().any(|p| p == "/releases/download/v2.0.0/checksums.txt"));

    let lenient_path = dir.path().join("lenient").join("pchaind");
    let outcome = orchestrator(&server, atomic(&lenient_path))
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.updated);
    assert!(outcome.checksum.is_none());
    assert_eq!(std::fs::read(&lenient_path).unwrap(), script_binary("2.0.0"));
}

#[tokio::test]
async fn test_install_specific_tag_when_nothing_installed() {
    let server = TestServer::start().await;
    publish(&server, "v1.5.0", &script_binary("1.5.0"), Some(true));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pchaind");

    let opts = UpdateOptions {
        version_tag: Some("1.5.0".to_string()),
        ..options("")
    };
    let outcome =
        orchestrator(&server, atomic(&path)).run(&opts, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.installed_version.as_deref(), Some("1.5.0"));
    let tag_path = "/repos/pushchain/push-chain-node/releases/tags/v1.5.0";
    assert_eq!(server.hit_count(tag_path), 1);
    // First install has no previous generation.
    assert!(!AtomicInstaller::new(&path).old_path().exists());
}

#[tokio::test]
async fn test_missing_release_is_a_network_error() {
    let server = TestServer::start().await;
    let dir = TempDir::new().unwrap();

    let err = orchestrator(&server, atomic(&dir.path().join("pchaind")))
        .run(&options("v1.0.0"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::Network { status: Some(404), .. }), "{err:?}");
    // 404 is permanent: a single request.
    assert_eq!(server.hits().len(), 1);
}
