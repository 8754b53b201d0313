//! `peers refresh` - sync `persistent_peers` with the published peer list.
//!
//! Designed for cron:
//!
//! ```bash
//! */30 * * * * push-validator peers refresh --quiet
//! ```
//!
//! Failures are written to `<home>/logs/peer-refresh.log` and never turn into
//! a non-zero exit, so the scheduler is not disturbed by transient outages.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::common::CommandContext;
use crate::core::UpdateError;
use crate::peers::{PeerRefresher, PidFileSupervisor, RefreshOutcome};

#[derive(Args, Debug, Clone)]
pub struct PeersCommand {
    #[command(subcommand)]
    pub action: PeersAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PeersAction {
    /// Replace the configured peers with the remote list and restart the node if they changed.
    Refresh(RefreshArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    /// URL of the peer list; defaults to `[peers] remote_url` from the config.
    #[arg(long)]
    pub url: Option<String>,

    /// Keep at most this many peers.
    #[arg(long)]
    pub max_peers: Option<usize>,

    /// Daemon binary used for the restart.
    #[arg(long, value_name = "PATH")]
    pub bin_path: Option<PathBuf>,
}

impl PeersCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        match self.action {
            PeersAction::Refresh(args) => args.execute(ctx).await,
        }
    }
}

impl RefreshArgs {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let peers = &ctx.global.peers;
        let url = self.url.or_else(|| peers.remote_url.clone()).ok_or_else(|| {
            UpdateError::Config {
                message: "no peer list URL; pass --url or set [peers] remote_url".to_string(),
            }
        })?;
        let max_peers = self.max_peers.unwrap_or(peers.max_peers);

        let supervisor = Arc::new(PidFileSupervisor::new(ctx.home.clone()));
        let mut refresher = PeerRefresher::new(supervisor)?
            .with_restart_delay(Duration::from_secs(peers.restart_delay_secs));
        if let Some(bin) = self.bin_path {
            refresher = refresher.with_bin_path(bin);
        }

        let outcome = refresher.refresh(&ctx.home, &url, max_peers).await;
        ctx.print_structured(&outcome)?;
        ctx.status(describe(&outcome));
        Ok(())
    }
}

fn describe(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Unchanged {
            peers,
        } => format!("{} Peers unchanged ({peers} peers)", "✓".green()),
        RefreshOutcome::Updated {
            before,
            after,
            restarted,
        } => {
            let restart = if *restarted {
                "; node restarted"
            } else {
                "; node not running"
            };
            format!("{} Peers updated: {before} -> {after}{restart}", "✓".green())
        }
        RefreshOutcome::Failed {
            detail,
        } => format!("{} Peer refresh failed: {detail}", "⚠".yellow()),
    }
}
