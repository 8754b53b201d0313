//! `status` - node process state and the last recorded update check.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::common::CommandContext;
use crate::peers::{PidFileSupervisor, Supervisor};
use crate::upgrade::{UpdateCache, UpdateCacheEntry};

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {}

#[derive(Debug, Serialize)]
struct StatusReport {
    cli_version: &'static str,
    node_home: String,
    daemon_running: bool,
    daemon_path: String,
    update_check: Option<UpdateCacheEntry>,
}

impl StatusArgs {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let supervisor = PidFileSupervisor::new(ctx.home.clone());
        let report = StatusReport {
            cli_version: env!("CARGO_PKG_VERSION"),
            node_home: ctx.home.root().display().to_string(),
            daemon_running: supervisor.is_running().await,
            daemon_path: ctx.home.resolve_daemon_path().display().to_string(),
            update_check: UpdateCache::for_home(&ctx.home).load(),
        };

        if ctx.output().is_structured() {
            return ctx.print_structured(&report);
        }

        let running = if report.daemon_running {
            "running".green()
        } else {
            "stopped".red()
        };
        println!("{:<14} {}", "CLI version:".bold(), report.cli_version);
        println!("{:<14} {}", "Node home:".bold(), report.node_home);
        println!("{:<14} {running}", "Daemon:".bold());
        println!("{:<14} {}", "Daemon path:".bold(), report.daemon_path);
        match &report.update_check {
            Some(entry) => {
                let state = if entry.update_available {
                    format!("{} available", entry.latest_version).yellow()
                } else {
                    "up to date".green()
                };
                println!(
                    "{:<14} {state} (checked {})",
                    "Updates:".bold(),
                    entry.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            None => println!("{:<14} never checked", "Updates:".bold()),
        }
        Ok(())
    }
}
