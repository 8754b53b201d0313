//! End-to-end update flow.
//!
//! [`UpdateOrchestrator::run`] drives one update: resolve the release, record
//! the check, gate on version, confirm, then download, verify, extract, install
//! and probe the new binary. Each stage is a separate capability so tests can
//! swap any of them for a deterministic fake.

use async_trait::async_trait;
use colored::Colorize;
use regex::Regex;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{
    CHANGELOG_PREVIEW_LINES, MAX_BACKOFF_DELAY_MS, PROBE_TIMEOUT, RELEASE_FETCH_RETRIES,
    STARTING_BACKOFF_DELAY_MS,
};
use crate::core::{RollbackStatus, UpdateError};
use crate::node::NodeHome;
use crate::upgrade::download::{AssetDownloader, within_size_slack};
use crate::upgrade::extract::BinaryExtractor;
use crate::upgrade::fetcher::ReleaseFetcher;
use crate::upgrade::installer::BinaryInstaller;
use crate::upgrade::release::{BinaryKind, Platform, Release};
use crate::upgrade::verification::{ReleaseVerifier, Verification};
use crate::upgrade::version_check::{UpdateCache, UpdateCacheEntry, is_newer};
use crate::utils::DownloadProgress;

/// Runs a freshly installed binary to prove it starts.
#[async_trait]
pub trait InstalledProbe: Send + Sync {
    /// Run the binary at `path` with a harmless argument and return the version it reports.
    async fn probe(&self, path: &Path) -> anyhow::Result<String>;
}

/// [`InstalledProbe`] executing `<path> version`.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    timeout: Duration,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl CommandProbe {
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
        }
    }
}

#[async_trait]
impl InstalledProbe for CommandProbe {
    async fn probe(&self, path: &Path) -> anyhow::Result<String> {
        let run = tokio::process::Command::new(path).arg("version").kill_on_drop(true).output();
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| anyhow::anyhow!("`{} version` timed out", path.display()))?
            .map_err(|e| anyhow::anyhow!("failed to execute {}: {e}", path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "`{} version` exited with {}: {}",
                path.display(),
                output.status,
                stderr.trim()
            );
        }

        Ok(extract_version(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// First semver-looking token in `output`, or the trimmed output.
#[must_use]
pub fn extract_version(output: &str) -> String {
    static VERSION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.\-]+)?(?:\+[0-9A-Za-z.\-]+)?)").ok()
    });

    re.as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| output.trim().to_string(), |m| m.as_str().to_string())
}

/// Yes/no confirmation before installing.
pub trait Prompt: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Blank, `y` and `yes` (any case) proceed.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes")
}

/// [`Prompt`] reading one line from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&self, question: &str) -> bool {
        print!("{question} [Y/n] ");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_affirmative(&answer),
        }
    }
}

/// Inputs of one [`UpdateOrchestrator::run`].
///
/// The installation path is owned by the installer the orchestrator was built with.
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub kind: BinaryKind,
    /// Stop after reporting whether an update exists.
    pub check_only: bool,
    /// Skip the version gate and the confirmation prompt.
    pub force: bool,
    /// Install this tag instead of the latest release.
    pub version_tag: Option<String>,
    pub skip_verify: bool,
    /// Refuse to install when no checksum is available.
    pub strict: bool,
    /// Version currently installed; empty when nothing is installed.
    pub current_version: String,
    /// Global `--yes`.
    pub assume_yes: bool,
    pub platform: Platform,
}

impl UpdateOptions {
    pub fn new(kind: BinaryKind, current_version: impl Into<String>) -> Self {
        Self {
            kind,
            check_only: false,
            force: false,
            version_tag: None,
            skip_verify: false,
            strict: false,
            current_version: current_version.into(),
            assume_yes: false,
            platform: Platform::current(),
        }
    }
}

/// Where a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    Available,
    Declined,
    Installed,
    Failed,
}

/// Structured record of one run, printed as JSON or YAML in structured output mode.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub ok: bool,
    pub status: UpdateStatus,
    pub kind: BinaryKind,
    pub current_version: String,
    pub latest_version: Option<String>,
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    pub restart_advised: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateOutcome {
    fn new(opts: &UpdateOptions, status: UpdateStatus) -> Self {
        Self {
            ok: true,
            status,
            kind: opts.kind,
            current_version: opts.current_version.clone(),
            latest_version: None,
            updated: false,
            checksum: None,
            installed_path: None,
            installed_version: None,
            restart_advised: false,
            error: None,
        }
    }

    /// Record for a run that ended in `error`.
    #[must_use]
    pub fn failed(opts: &UpdateOptions, error: &UpdateError) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Self::new(opts, UpdateStatus::Failed)
        }
    }
}

/// First `max_lines` lines of `changelog`, plus a pointer to `url` when truncated.
#[must_use]
pub fn changelog_preview(changelog: &str, max_lines: usize, url: &str) -> String {
    let lines: Vec<&str> = changelog.trim().lines().collect();
    let mut preview = lines.iter().take(max_lines).copied().collect::<Vec<_>>().join("\n");
    if lines.len() > max_lines {
        preview.push_str(&format!("\n... see full changelog at {url}"));
    }
    preview
}

/// Step lines on stdout, silent in quiet or structured mode.
#[derive(Debug, Clone, Copy)]
struct Steps {
    enabled: bool,
}

impl Steps {
    fn start(self, msg: &str) {
        if self.enabled {
            println!("{} {msg}", "→".cyan());
        }
    }

    fn done(self, msg: &str) {
        if self.enabled {
            println!("{} {msg}", "✓".green());
        }
    }

    fn caution(self, msg: &str) {
        if self.enabled {
            println!("{} {msg}", "⚠".yellow());
        }
    }

    fn plain(self, msg: &str) {
        if self.enabled {
            println!("{msg}");
        }
    }
}

/// Wires the update capabilities together.
pub struct UpdateOrchestrator {
    fetcher: Arc<dyn ReleaseFetcher>,
    downloader: Arc<dyn AssetDownloader>,
    verifier: Arc<dyn ReleaseVerifier>,
    extractor: Arc<dyn BinaryExtractor>,
    installer: Arc<dyn BinaryInstaller>,
    probe: Arc<dyn InstalledProbe>,
    prompt: Arc<dyn Prompt>,
    cache: Option<UpdateCache>,
    node_home: Option<NodeHome>,
    steps: Steps,
    retry_base_ms: u64,
}

impl UpdateOrchestrator {
    pub fn new(
        fetcher: Arc<dyn ReleaseFetcher>,
        downloader: Arc<dyn AssetDownloader>,
        verifier: Arc<dyn ReleaseVerifier>,
        extractor: Arc<dyn BinaryExtractor>,
        installer: Arc<dyn BinaryInstaller>,
    ) -> Self {
        Self {
            fetcher,
            downloader,
            verifier,
            extractor,
            installer,
            probe: Arc::new(CommandProbe::default()),
            prompt: Arc::new(StdinPrompt),
            cache: None,
            node_home: None,
            steps: Steps {
                enabled: false,
            },
            retry_base_ms: STARTING_BACKOFF_DELAY_MS,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn InstalledProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Record every check in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: UpdateCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Node home used to detect a running daemon for the restart advice.
    #[must_use]
    pub fn with_node_home(mut self, home: NodeHome) -> Self {
        self.node_home = Some(home);
        self
    }

    /// Print step lines and the progress bar.
    #[must_use]
    pub fn with_status_output(mut self, enabled: bool) -> Self {
        self.steps = Steps {
            enabled,
        };
        self
    }

    /// Base delay for retrying transient metadata failures.
    #[must_use]
    pub fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base_ms = u64::try_from(delay.as_millis()).unwrap_or(STARTING_BACKOFF_DELAY_MS);
        self
    }

    #[must_use]
    pub fn installer(&self) -> &Arc<dyn BinaryInstaller> {
        &self.installer
    }

    /// Run the update flow.
    pub async fn run(
        &self,
        opts: &UpdateOptions,
        cancel: &CancellationToken,
    ) -> Result<UpdateOutcome, UpdateError> {
        let steps = self.steps;
        let binary = opts.kind.binary_name();

        steps.start(&format!("Checking for {binary} updates..."));
        let release = self.resolve_release(opts.version_tag.as_deref()).await?;
        let newer = release_is_newer(&opts.current_version, &release.tag);

        if let Some(cache) = &self.cache {
            cache.save(&UpdateCacheEntry::new(release.tag.clone(), newer.unwrap_or(false)));
        }

        let mut outcome = UpdateOutcome::new(opts, UpdateStatus::UpToDate);
        outcome.latest_version = Some(release.tag.clone());

        if !opts.force {
            match newer {
                Some(true) => {}
                Some(false) => {
                    steps.done(&format!(
                        "{binary} is already up to date ({})",
                        display_version(opts)
                    ));
                    return Ok(outcome);
                }
                None => {
                    steps.caution(&format!(
                        "Cannot compare versions {} and {}; use --force to install anyway",
                        display_version(opts),
                        release.tag
                    ));
                    return Ok(outcome);
                }
            }
        }

        steps.plain(&format!(
            "\n{} {} → {}",
            "Update available:".bold(),
            display_version(opts).yellow(),
            release.tag.green().bold()
        ));
        let preview =
            changelog_preview(&release.changelog, CHANGELOG_PREVIEW_LINES, &release.landing_url);
        if !preview.is_empty() {
            steps.plain(&format!("\n{preview}\n"));
        }

        if opts.check_only {
            outcome.status = UpdateStatus::Available;
            return Ok(outcome);
        }

        let question = format!("Install {binary} {}?", release.tag);
        if !opts.force && !opts.assume_yes && !self.prompt.confirm(&question) {
            steps.plain("Update cancelled");
            outcome.status = UpdateStatus::Declined;
            return Ok(outcome);
        }

        let asset = release.select_asset(&opts.platform)?;
        debug!("Selected asset {} for {}", asset.name, opts.platform);

        steps.start(&format!("Downloading {}...", asset.name));
        let progress = DownloadProgress::new(asset.size, steps.enabled);
        let on_progress = |downloaded: u64, total: u64| progress.update(downloaded, total);
        let result = self.downloader.download(asset, &on_progress, cancel).await;
        progress.finish_and_clear();
        let archive = result?;

        if !within_size_slack(asset.size, archive.len() as u64) {
            return Err(UpdateError::Network {
                url: asset.download_url.clone(),
                status: None,
                reason: format!(
                    "size mismatch: expected {} bytes, received {}",
                    asset.size,
                    archive.len()
                ),
            });
        }
        steps.done(&format!("Downloaded {} bytes", archive.len()));

        if opts.skip_verify {
            steps.caution("Skipping checksum verification");
        } else {
            match self.verifier.verify(&archive, &release, &asset.name).await? {
                Verification::Verified {
                    digest,
                } => {
                    steps.done("Checksum verified");
                    outcome.checksum = Some(digest);
                }
                Verification::NotAvailable {
                    reason,
                } => {
                    if opts.strict {
                        return Err(UpdateError::ChecksumUnavailable {
                            asset: asset.name.clone(),
                            reason,
                        });
                    }
                    warn!("Installing {} without checksum verification: {reason}", asset.name);
                    steps.caution(&format!("Checksum not available ({reason}); continuing"));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        steps.start("Extracting...");
        let contents = self.extractor.extract(&archive)?;
        drop(archive);

        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let path = self.installer.path().to_path_buf();
        steps.start(&format!("Installing to {}...", path.display()));
        if let Err(err) = self.installer.install(&contents, cancel).await {
            if matches!(err, UpdateError::Install { half_installed: true, .. }) {
                match self.installer.rollback().await {
                    Ok(()) => warn!("Install failed midway; previous binary restored"),
                    Err(rollback_err) => {
                        warn!("Install failed midway and rollback failed: {rollback_err}");
                    }
                }
            }
            return Err(err);
        }

        let installed_version = match self.probe.probe(&path).await {
            Ok(version) => version,
            Err(probe_err) => {
                let reason = format!("{probe_err:#}");
                warn!("New binary failed to run: {reason}");
                let rollback = match self.installer.rollback().await {
                    Ok(()) => RollbackStatus::RolledBack,
                    Err(UpdateError::NothingToRollback {
                        ..
                    }) => match self.installer.remove_installed().await {
                        Ok(()) => RollbackStatus::Removed,
                        Err(e) => RollbackStatus::Failed(e.to_string()),
                    },
                    Err(e) => RollbackStatus::Failed(e.to_string()),
                };
                return Err(UpdateError::VerificationFailed {
                    reason,
                    rollback,
                });
            }
        };

        if let Some(cache) = &self.cache {
            cache.save(&UpdateCacheEntry::new(release.tag.clone(), false));
        }

        info!("Installed {binary} {installed_version} at {}", path.display());
        steps.done(&format!("Updated {binary} to {installed_version}"));

        outcome.status = UpdateStatus::Installed;
        outcome.updated = true;
        outcome.installed_path = Some(path.display().to_string());
        outcome.installed_version = Some(installed_version);
        outcome.restart_advised = self.node_home.as_ref().is_some_and(NodeHome::daemon_running);
        if outcome.restart_advised {
            steps.caution("The node is running; restart it to use the new binary");
        }

        Ok(outcome)
    }

    /// Resolve the release, retrying transient network failures.
    async fn resolve_release(&self, tag: Option<&str>) -> Result<Release, UpdateError> {
        let strategy = ExponentialBackoff::from_millis(self.retry_base_ms)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(RELEASE_FETCH_RETRIES);

        RetryIf::spawn(
            strategy,
            || async move {
                let result = match tag.filter(|t| !t.trim().is_empty()) {
                    Some(tag) => self.fetcher.fetch_by_tag(tag).await,
                    None => self.fetcher.fetch_latest().await,
                };
                if let Err(e) = &result {
                    debug!("Release lookup failed: {e}");
                }
                result
            },
            UpdateError::is_transient,
        )
        .await
    }
}

/// Like [`is_newer`], but anything beats "not installed".
fn release_is_newer(current: &str, tag: &str) -> Option<bool> {
    if current.trim().is_empty() {
        return Some(true);
    }
    is_newer(current, tag)
}

fn display_version(opts: &UpdateOptions) -> String {
    if opts.current_version.trim().is_empty() {
        "not installed".to_string()
    } else {
        opts.current_version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changelog_preview_truncates() {
        let changelog = (1..=15).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let preview = changelog_preview(&changelog, 10, "https://example.com/r");
        assert!(preview.starts_with("line 1\n"));
        assert!(preview.contains("line 10"));
        assert!(!preview.contains("line 11"));
        assert!(preview.ends_with("see full changelog at https://example.com/r"));

        let short = changelog_preview("only one", 10, "u");
        assert_eq!(short, "only one");
        assert_eq!(changelog_preview("", 10, "u"), "");
    }

    #[test]
    fn test_affirmative_answers() {
        for answer in ["", "\n", "y", "Y", "yes", "YES\n"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["n", "no", "yep", "maybe"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("2.0.0\n"), "2.0.0");
        assert_eq!(extract_version("pchaind version v1.4.2-rc.1 (abc123)"), "1.4.2-rc.1");
        assert_eq!(extract_version("dev-build\n"), "dev-build");
    }

    #[test]
    fn test_not_installed_is_always_older() {
        assert_eq!(release_is_newer("", "v0.0.1"), Some(true));
        assert_eq!(release_is_newer("v1.0.0", "v1.0.0"), Some(false));
        assert_eq!(release_is_newer("custom", "v1.0.0"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_probe_runs_binary() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let ok = dir.path().join("ok");
        std::fs::write(&ok, "#!/bin/sh\necho \"pchaind 2.0.0\"\n").unwrap();
        std::fs::set_permissions(&ok, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(CommandProbe::default().probe(&ok).await.unwrap(), "2.0.0");

        let bad = dir.path().join("bad");
        std::fs::write(&bad, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&bad, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(CommandProbe::default().probe(&bad).await.is_err());
    }
}
