//! `update` - replace the running CLI with the newest release.
//!
//! ```bash
//! push-validator update              # install the latest release after confirmation
//! push-validator update --check      # only report whether one exists
//! push-validator update --version v1.4.0 --force
//! push-validator update --rollback   # restore the binary replaced by the last update
//! ```

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::common::{CommandContext, InstallFlags, run_rollback, run_update};
use crate::upgrade::BinaryKind;

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub install: InstallFlags,

    /// Restore the previous CLI binary instead of updating.
    #[arg(long, conflicts_with_all = ["check", "force", "version", "skip_verify", "strict"])]
    pub rollback: bool,
}

impl UpdateArgs {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let install_path = self.install_path()?;

        if self.rollback {
            return run_rollback(ctx, install_path).await;
        }

        let opts = self.install.options(ctx, BinaryKind::Cli, env!("CARGO_PKG_VERSION"));
        let orchestrator = ctx.orchestrator(BinaryKind::Cli, install_path)?;
        run_update(ctx, &orchestrator, &opts).await
    }

    /// `--install-path`, or the executable currently running.
    fn install_path(&self) -> Result<PathBuf> {
        match &self.install.install_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().context("Failed to locate the running executable"),
        }
    }
}
