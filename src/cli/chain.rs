//! `chain` - install, update and roll back the `pchaind` daemon binary.
//!
//! The daemon is installed where the node expects it: the active cosmovisor
//! slot when the home is cosmovisor-managed, otherwise `pchaind` on `PATH`,
//! otherwise `<home>/bin/pchaind`. `--install-path` overrides all of them.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::common::{CommandContext, InstallFlags, run_rollback, run_update};
use crate::upgrade::{BinaryKind, CommandProbe, InstalledProbe};

#[derive(Args, Debug, Clone)]
pub struct ChainCommand {
    #[command(subcommand)]
    pub action: ChainAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ChainAction {
    /// Install the chain daemon, or update it to a newer release.
    #[command(visible_alias = "update")]
    Install(InstallFlags),

    /// Restore the daemon binary replaced by the last install.
    Rollback {
        #[arg(long, value_name = "PATH")]
        install_path: Option<PathBuf>,
    },
}

impl ChainCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        match self.action {
            ChainAction::Install(flags) => {
                let install_path = daemon_path(ctx, flags.install_path.as_deref());
                debug!("Daemon install path: {}", install_path.display());

                let current = installed_version(&install_path).await;
                let opts = flags.options(ctx, BinaryKind::Daemon, &current);
                let orchestrator = ctx.orchestrator(BinaryKind::Daemon, install_path)?;
                run_update(ctx, &orchestrator, &opts).await
            }
            ChainAction::Rollback {
                install_path,
            } => run_rollback(ctx, daemon_path(ctx, install_path.as_deref())).await,
        }
    }
}

fn daemon_path(ctx: &CommandContext, flag: Option<&Path>) -> PathBuf {
    flag.map_or_else(|| ctx.home.resolve_daemon_path(), Path::to_path_buf)
}

/// Version reported by the daemon at `path`; empty when absent or broken.
async fn installed_version(path: &Path) -> String {
    if !path.is_file() {
        return String::new();
    }
    match CommandProbe::default().probe(path).await {
        Ok(version) => version,
        Err(e) => {
            warn!("Could not determine installed daemon version: {e:#}");
            String::new()
        }
    }
}
