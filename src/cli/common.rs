//! Shared plumbing for CLI commands.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{CliConfig, GlobalConfig, OutputMode};
use crate::constants::CLI_BINARY_NAME;
use crate::core::UpdateError;
use crate::node::NodeHome;
use crate::upgrade::{
    AtomicInstaller, BinaryKind, GithubFetcher, HttpDownloader, HttpVerifier, Notifier,
    StdinPrompt, TarGzExtractor, UpdateCache, UpdateOptions, UpdateOrchestrator, UpdateOutcome,
    UpdateStatus,
};

/// Flags shared by `update` and `chain install`.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallFlags {
    /// Only report whether an update is available.
    #[arg(long)]
    pub check: bool,

    /// Install even when the release is not newer, without prompting.
    #[arg(short, long)]
    pub force: bool,

    /// Install a specific release tag instead of the latest (e.g. `v1.2.0`).
    #[arg(long, value_name = "TAG")]
    pub version: Option<String>,

    /// Do not verify the download against the checksum manifest.
    #[arg(long, conflicts_with = "strict")]
    pub skip_verify: bool,

    /// Fail when no checksum is published for the download.
    #[arg(long)]
    pub strict: bool,

    /// Install to this path instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub install_path: Option<PathBuf>,
}

impl InstallFlags {
    /// Orchestrator options for `kind` with `current_version` installed.
    pub fn options(
        &self,
        ctx: &CommandContext,
        kind: BinaryKind,
        current_version: &str,
    ) -> UpdateOptions {
        UpdateOptions {
            check_only: self.check,
            force: self.force,
            version_tag: self.version.clone(),
            skip_verify: self.skip_verify,
            strict: self.strict || ctx.global.update.strict_checksum,
            assume_yes: ctx.config.assume_yes,
            ..UpdateOptions::new(kind, current_version)
        }
    }
}

/// Everything a command needs besides its own arguments.
///
/// Built once by the dispatcher; the notifier handle is the only piece of state
/// shared with the background update check.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: CliConfig,
    pub global: GlobalConfig,
    pub home: NodeHome,
    pub notifier: Notifier,
}

impl CommandContext {
    pub fn new(config: CliConfig, global: GlobalConfig, notifier: Notifier) -> Self {
        let home = NodeHome::new(&config.node_home);
        Self {
            config,
            global,
            home,
            notifier,
        }
    }

    pub const fn output(&self) -> OutputMode {
        self.config.output
    }

    /// Repository publishing `kind`.
    pub fn repo_for(&self, kind: BinaryKind) -> &str {
        match kind {
            BinaryKind::Cli => &self.global.release.cli_repo,
            BinaryKind::Daemon => &self.global.release.chain_repo,
        }
    }

    /// Release fetcher for `kind` honoring the configured API base and timeout.
    pub fn fetcher(&self, kind: BinaryKind) -> Result<GithubFetcher, UpdateError> {
        Ok(GithubFetcher::new(&self.global.release.api_base, self.repo_for(kind))?
            .with_timeout(self.global.update.metadata_timeout()))
    }

    /// Production orchestrator installing `kind` at `install_path`.
    pub fn orchestrator(
        &self,
        kind: BinaryKind,
        install_path: PathBuf,
    ) -> Result<UpdateOrchestrator, UpdateError> {
        let downloader = HttpDownloader::new(self.global.update.max_download_bytes())?;
        let verifier = HttpVerifier::new()?.with_timeout(self.global.update.metadata_timeout());

        let mut orchestrator = UpdateOrchestrator::new(
            Arc::new(self.fetcher(kind)?),
            Arc::new(downloader),
            Arc::new(verifier),
            Arc::new(TarGzExtractor::new(kind.binary_name())),
            Arc::new(AtomicInstaller::new(install_path)),
        )
        .with_prompt(Arc::new(StdinPrompt))
        .with_node_home(self.home.clone())
        .with_status_output(self.config.prints_status());

        // Only CLI releases feed the update banner.
        if kind == BinaryKind::Cli {
            orchestrator = orchestrator.with_cache(UpdateCache::for_home(&self.home));
        }
        Ok(orchestrator)
    }

    /// Print `value` as JSON or YAML. Does nothing in text mode.
    pub fn print_structured<T: Serialize>(&self, value: &T) -> Result<()> {
        match self.output() {
            OutputMode::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputMode::Yaml => {
                print!("{}", serde_yaml::to_string(value)?);
            }
            OutputMode::Text => {}
        }
        Ok(())
    }

    /// Print a status line unless quiet or structured.
    pub fn status(&self, msg: impl std::fmt::Display) {
        if self.config.prints_status() {
            println!("{msg}");
        }
    }
}

/// Token cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            child.cancel();
        }
    });
    token
}

/// Run `orchestrator` and report the outcome in the configured output mode.
///
/// In structured mode a failed run still prints one record with `ok: false`
/// before the error is returned for the exit code.
pub async fn run_update(
    ctx: &CommandContext,
    orchestrator: &UpdateOrchestrator,
    opts: &UpdateOptions,
) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    match orchestrator.run(opts, &cancel).await {
        Ok(outcome) => {
            ctx.print_structured(&outcome)?;
            if outcome.status == UpdateStatus::Available && ctx.config.prints_status() {
                let hint = match opts.kind {
                    BinaryKind::Cli => format!("{CLI_BINARY_NAME} update"),
                    BinaryKind::Daemon => format!("{CLI_BINARY_NAME} chain install"),
                };
                println!("Run {} to install it", hint.cyan());
            }
            Ok(())
        }
        Err(err) => {
            ctx.print_structured(&UpdateOutcome::failed(opts, &err))?;
            Err(err.into())
        }
    }
}

/// Restore the previous binary at `install_path`.
pub async fn run_rollback(ctx: &CommandContext, install_path: PathBuf) -> Result<()> {
    use crate::upgrade::BinaryInstaller;

    let installer = AtomicInstaller::new(install_path);
    ctx.status(format!("{} Rolling back {}...", "→".cyan(), installer.path().display()));
    installer
        .rollback()
        .await
        .with_context(|| format!("Failed to roll back {}", installer.path().display()))?;

    ctx.print_structured(&serde_json::json!({
        "ok": true,
        "rolled_back": installer.path().display().to_string(),
    }))?;
    ctx.status(format!("{} Restored previous binary", "✓".green()));
    Ok(())
}
