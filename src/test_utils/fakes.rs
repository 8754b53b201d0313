//! Deterministic stand-ins for the network and process capabilities.

use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::core::UpdateError;
use crate::peers::{StartOptions, Supervisor};
use crate::upgrade::download::{AssetDownloader, ProgressFn};
use crate::upgrade::fetcher::ReleaseFetcher;
use crate::upgrade::installer::{AtomicInstaller, BinaryInstaller};
use crate::upgrade::orchestrator::{InstalledProbe, Prompt};
use crate::upgrade::release::{Asset, Release};
use crate::upgrade::verification::{ChecksumManifest, ReleaseVerifier, Verification};

/// [`ReleaseFetcher`] replaying queued responses; the last one repeats.
pub struct FakeFetcher {
    responses: Mutex<VecDeque<Result<Release, UpdateError>>>,
    calls: AtomicUsize,
    tags: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(release: Release) -> Self {
        Self::with_sequence(vec![Ok(release)])
    }

    pub fn failing(error: UpdateError) -> Self {
        Self::with_sequence(vec![Err(error)])
    }

    pub fn with_sequence(responses: Vec<Result<Release, UpdateError>>) -> Self {
        assert!(!responses.is_empty(), "FakeFetcher needs at least one response");
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            tags: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tags passed to `fetch_by_tag`.
    pub fn requested_tags(&self) -> Vec<String> {
        self.tags.lock().unwrap().clone()
    }

    fn next(&self) -> Result<Release, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl ReleaseFetcher for FakeFetcher {
    async fn fetch_latest(&self) -> Result<Release, UpdateError> {
        self.next()
    }

    async fn fetch_by_tag(&self, tag: &str) -> Result<Release, UpdateError> {
        self.tags.lock().unwrap().push(tag.to_string());
        self.next()
    }
}

/// [`AssetDownloader`] serving bodies keyed by asset name.
#[derive(Default)]
pub struct FakeDownloader {
    bodies: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_body(mut self, asset_name: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(asset_name.to_string(), body);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetDownloader for FakeDownloader {
    async fn download(
        &self,
        asset: &Asset,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }
        let body = self.bodies.get(&asset.name).cloned().ok_or_else(|| UpdateError::Network {
            url: asset.download_url.clone(),
            status: Some(404),
            reason: "HTTP 404 Not Found".to_string(),
        })?;
        progress(body.len() as u64, asset.size);
        Ok(body)
    }
}

/// [`ReleaseVerifier`] checking against fixed manifest text, or none at all.
pub struct ManifestVerifier {
    manifest: Option<String>,
}

impl ManifestVerifier {
    pub fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: Some(manifest.into()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            manifest: None,
        }
    }
}

#[async_trait]
impl ReleaseVerifier for ManifestVerifier {
    async fn verify(
        &self,
        bytes: &[u8],
        _release: &Release,
        asset_name: &str,
    ) -> Result<Verification, UpdateError> {
        match &self.manifest {
            Some(text) => ChecksumManifest::parse(text).check(bytes, asset_name),
            None => Ok(Verification::NotAvailable {
                reason: "checksum manifest returned HTTP 404 Not Found".to_string(),
            }),
        }
    }
}

/// Real [`AtomicInstaller`] whose rollback always fails.
pub struct FailingRollbackInstaller {
    inner: AtomicInstaller,
}

impl FailingRollbackInstaller {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            inner: AtomicInstaller::new(path),
        }
    }
}

#[async_trait]
impl BinaryInstaller for FailingRollbackInstaller {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    async fn install(&self, binary: &[u8], cancel: &CancellationToken) -> Result<(), UpdateError> {
        self.inner.install(binary, cancel).await
    }

    async fn rollback(&self) -> Result<(), UpdateError> {
        Err(UpdateError::Install {
            path: self.inner.path().display().to_string(),
            reason: "failed to restore previous binary: Permission denied".to_string(),
            half_installed: true,
        })
    }

    async fn remove_installed(&self) -> Result<(), UpdateError> {
        self.inner.remove_installed().await
    }
}

/// [`InstalledProbe`] with a fixed answer.
pub struct StaticProbe {
    result: Result<String, String>,
}

impl StaticProbe {
    pub fn reporting(version: &str) -> Self {
        Self {
            result: Ok(version.to_string()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
        }
    }
}

#[async_trait]
impl InstalledProbe for StaticProbe {
    async fn probe(&self, _path: &Path) -> anyhow::Result<String> {
        self.result.clone().map_err(|reason| anyhow!(reason))
    }
}

/// [`Prompt`] giving the same answer every time.
pub struct ScriptedPrompt {
    answer: bool,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, _question: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// [`Supervisor`] recording every call.
#[derive(Default)]
pub struct FakeSupervisor {
    running: AtomicBool,
    fail_stop: bool,
    calls: Mutex<Vec<String>>,
    starts: Mutex<Vec<StartOptions>>,
}

impl FakeSupervisor {
    pub fn running(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            ..Self::default()
        }
    }

    /// A running daemon that refuses to stop.
    pub fn stuck() -> Self {
        Self {
            running: AtomicBool::new(true),
            fail_stop: true,
            ..Self::default()
        }
    }

    /// `stop` and `start` calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn start_options(&self) -> Vec<StartOptions> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push("stop".to_string());
        if self.fail_stop {
            return Err(anyhow!("daemon did not exit within 30s"));
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, opts: &StartOptions) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push("start".to_string());
        self.starts.lock().unwrap().push(opts.clone());
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
}
