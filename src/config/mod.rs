//! Configuration management for the validator CLI.
//!
//! Two layers feed every command:
//!
//! 1. [`CliConfig`] - derived from global command-line flags (node home, output
//!    mode, quiet/yes/verbose).
//! 2. [`GlobalConfig`] - the optional TOML file with release sources, update
//!    limits and peer refresh settings. See [`global`] for the file layout.

pub mod global;

pub use global::{GlobalConfig, PeersConfig, ReleaseConfig};

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Default node home when neither `--home` nor the environment provide one.
pub const DEFAULT_NODE_HOME: &str = "~/.pchain";

/// How command results are rendered on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Human-readable status lines.
    #[default]
    Text,
    Json,
    Yaml,
}

impl OutputMode {
    /// True for machine-readable modes, which must never carry banners or step lines.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json | Self::Yaml)
    }
}

/// Settings derived from global flags, shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive, e.g. `debug` or `warn`.
    pub log_level: String,

    /// Resolved node home directory.
    pub node_home: PathBuf,

    pub output: OutputMode,

    /// Suppress everything except errors and the final result.
    pub quiet: bool,

    /// Answer yes to every confirmation prompt.
    pub assume_yes: bool,

    /// Explicit path to the CLI config file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Whether human-oriented step lines should be printed.
    #[must_use]
    pub const fn prints_status(&self) -> bool {
        !self.quiet && !self.output.is_structured()
    }

    /// Load the TOML config this invocation points at.
    pub async fn load_global(&self) -> Result<GlobalConfig> {
        GlobalConfig::load_with_optional(self.config_path.clone(), &self.node_home).await
    }
}

/// Expand `~` and environment variables in a user supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Resolve the node home from the flag value or the default location.
pub fn resolve_node_home(flag: Option<&str>) -> Result<PathBuf> {
    match flag {
        Some(raw) => expand_path(raw),
        None => {
            let home = dirs::home_dir().context("Could not determine home directory")?;
            Ok(home.join(DEFAULT_NODE_HOME.trim_start_matches("~/")))
        }
    }
}
