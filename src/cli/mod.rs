//! Command-line interface for the Push Chain validator CLI.
//!
//! # Commands
//!
//! - `update` - self-update the CLI, or roll back the last self-update
//! - `chain install | rollback` - manage the `pchaind` daemon binary
//! - `peers refresh` - sync `persistent_peers` with the published list (cron)
//! - `status` - daemon state and last update check
//! - `version` - print the CLI version
//!
//! # Global Options
//!
//! - `--home` - node home directory (default `~/.pchain`, env `PCHAIN_HOME`)
//! - `--output text|json|yaml` - structured output for automation
//! - `--quiet` - only errors and final results
//! - `--yes` - answer yes to every prompt
//! - `--verbose` - debug logging
//! - `--config` - path to the CLI config file
//!
//! # Update banner
//!
//! Before dispatch, commands outside the suppression set start a background
//! check for a newer CLI release. After a successful command the result, if
//! any arrived in time, is printed once as a banner. See
//! [`crate::upgrade::notifier`].

mod chain;
pub mod common;
mod peers;
mod status;
mod update;
mod version;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{CliConfig, OutputMode, resolve_node_home};
use crate::constants::UPDATE_CHECK_GRACE;
use crate::upgrade::notifier::is_suppressed;
use crate::upgrade::{BinaryKind, Notifier, UpdateCache, spawn_background_check};
use common::CommandContext;

#[derive(Parser, Debug)]
#[command(
    name = "push-validator",
    about = "Push Chain validator operator CLI",
    version,
    long_about = "Installs and updates the pchaind daemon, keeps the CLI itself up to date \
                  and refreshes the node's persistent peers."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Node home directory.
    #[arg(long, global = true, env = "PCHAIN_HOME", value_name = "DIR")]
    home: Option<String>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputMode::Text)]
    output: OutputMode,

    /// Suppress everything except errors and final results.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Answer yes to every confirmation prompt.
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the CLI config file.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update the CLI to the latest release.
    Update(update::UpdateArgs),

    /// Install, update or roll back the chain daemon.
    Chain(chain::ChainCommand),

    /// Manage the node's persistent peers.
    Peers(peers::PeersCommand),

    /// Show daemon state and the last update check.
    Status(status::StatusArgs),

    /// Print the CLI version.
    Version(version::VersionArgs),
}

impl Commands {
    /// Command words, used to decide whether the update banner may show.
    fn path(&self) -> Vec<&'static str> {
        match self {
            Self::Update(_) => vec!["update"],
            Self::Chain(cmd) => match cmd.action {
                chain::ChainAction::Install(_) => vec!["chain", "install"],
                chain::ChainAction::Rollback {
                    ..
                } => vec!["chain", "rollback"],
            },
            Self::Peers(_) => vec!["peers", "refresh"],
            Self::Status(_) => vec!["status"],
            Self::Version(_) => vec!["version"],
        }
    }
}

impl Cli {
    /// Log filter for the global verbosity flags.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }

    /// Translate global flags into a [`CliConfig`].
    pub fn build_config(&self) -> Result<CliConfig> {
        Ok(CliConfig {
            log_level: self.log_level().to_string(),
            node_home: resolve_node_home(self.home.as_deref())?,
            output: self.output,
            quiet: self.quiet,
            assume_yes: self.yes,
            config_path: self.config.clone(),
        })
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.build_config()?;
        self.execute_with_config(config).await
    }

    /// Run the command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        let global = config.load_global().await?;
        let notifier = Notifier::new();
        let command_path = self.command.path();

        let ctx = CommandContext::new(config, global, notifier);
        let check = if ctx.global.update.check_on_startup
            && !is_suppressed(&command_path, ctx.config.output, ctx.config.quiet)
        {
            start_update_check(&ctx)
        } else {
            None
        };

        let result = match self.command {
            Commands::Update(args) => args.execute(&ctx).await,
            Commands::Chain(cmd) => cmd.execute(&ctx).await,
            Commands::Peers(cmd) => cmd.execute(&ctx).await,
            Commands::Status(args) => args.execute(&ctx).await,
            Commands::Version(args) => args.execute(&ctx),
        };

        if result.is_ok() {
            if let Some(check) = check {
                // A check still in flight after the grace period is abandoned.
                let _ = tokio::time::timeout(UPDATE_CHECK_GRACE, check).await;
            }
            ctx.notifier.render(&command_path, ctx.config.output, ctx.config.quiet);
        }
        result
    }
}

/// Start the background check for a newer CLI; never fails the command.
fn start_update_check(ctx: &CommandContext) -> Option<JoinHandle<()>> {
    let fetcher = match ctx.fetcher(BinaryKind::Cli) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            debug!("Skipping background update check: {e}");
            return None;
        }
    };
    Some(spawn_background_check(
        Arc::new(fetcher),
        UpdateCache::for_home(&ctx.home),
        env!("CARGO_PKG_VERSION").to_string(),
        ctx.notifier.clone(),
    ))
}
