//! A fake release host: metadata API, archives and checksum manifests.

use push_validator_cli::test_utils::{TestServer, archive_name, build_tar_gz};
use push_validator_cli::upgrade::verification::compute_sha256;
use push_validator_cli::upgrade::{
    AtomicInstaller, BinaryInstaller, BinaryKind, GithubFetcher, HttpDownloader, HttpVerifier,
    Platform, TarGzExtractor, UpdateOptions, UpdateOrchestrator,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const REPO: &str = "pushchain/push-chain-node";

pub fn linux() -> Platform {
    Platform::new("linux", "amd64")
}

/// What the fake host publishes for one release.
pub struct Published {
    pub tag: String,
    pub archive: Vec<u8>,
    pub asset_name: String,
    pub manifest: String,
}

/// Publish `binary_contents` as `pchaind` under `tag`.
///
/// `manifest` selects the checksum manifest: `Some(true)` lists the correct
/// digest, `Some(false)` a digest with its first nibble flipped, `None`
/// publishes no manifest at all.
pub fn publish(
    server: &TestServer,
    tag: &str,
    binary_contents: &[u8],
    manifest: Option<bool>,
) -> Published {
    let archive = build_tar_gz(&[
        ("README.md", b"pchaind release".as_slice(), 0o644),
        ("pchaind", binary_contents, 0o755),
    ]);
    let asset_name = archive_name("pchaind", tag, &linux());
    let base = server.base_url();

    let mut digest = compute_sha256(&archive);
    if manifest == Some(false) {
        let flipped = if digest.starts_with('0') { "1" } else { "0" };
        digest.replace_range(0..1, flipped);
    }
    let manifest_text = format!("{digest}  {asset_name}\n");

    let mut assets = vec![json!({
        "name": asset_name,
        "size": archive.len(),
        "browser_download_url": format!("{base}/download/{asset_name}"),
    })];
    if manifest.is_some() {
        assets.push(json!({
            "name": "checksums.txt",
            "size": manifest_text.len(),
            "browser_download_url": format!("{base}/download/checksums.txt"),
        }));
        server.route("/download/checksums.txt", 200, manifest_text.clone());
    }

    let metadata = json!({
        "tag_name": tag,
        "body": "## What's new\n- faster block sync\n- bug fixes",
        "html_url": format!("{base}/releases/tag/{tag}"),
        "assets": assets,
    });
    server.route(&format!("/repos/{REPO}/releases/latest"), 200, metadata.to_string());
    server.route(&format!("/repos/{REPO}/releases/tags/{tag}"), 200, metadata.to_string());
    server.route(&format!("/download/{asset_name}"), 200, archive.clone());

    Published {
        tag: tag.to_string(),
        archive,
        asset_name,
        manifest: manifest_text,
    }
}

/// Orchestrator wired to `server` with the production HTTP implementations.
pub fn orchestrator(
    server: &TestServer,
    installer: Arc<dyn BinaryInstaller>,
) -> UpdateOrchestrator {
    UpdateOrchestrator::new(
        Arc::new(GithubFetcher::new(&server.base_url(), REPO).unwrap()),
        Arc::new(HttpDownloader::default()),
        Arc::new(HttpVerifier::new().unwrap()),
        Arc::new(TarGzExtractor::new("pchaind")),
        installer,
    )
    .with_retry_base(Duration::from_millis(1))
}

pub fn atomic(path: &Path) -> Arc<dyn BinaryInstaller> {
    Arc::new(AtomicInstaller::new(path))
}

/// Non-interactive daemon update options for linux/amd64.
pub fn options(current: &str) -> UpdateOptions {
    UpdateOptions {
        assume_yes: true,
        platform: linux(),
        ..UpdateOptions::new(BinaryKind::Daemon, current)
    }
}
