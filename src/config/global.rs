//! CLI configuration file.
//!
//! The file is optional. When present it is a TOML document, by default at
//! `<node-home>/config/push-validator.toml`:
//!
//! ```toml
//! [release]
//! api_base = "https://api.github.com"
//! cli_repo = "pushchain/push-validator-cli"
//! chain_repo = "pushchain/push-chain-node"
//!
//! [update]
//! max_download_mb = 500
//! strict_checksum = false
//!
//! [peers]
//! remote_url = "https://peers.push.org/testnet.json"
//! max_peers = 20
//! ```
//!
//! Every key has a default, so a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::constants::{DEFAULT_MAX_PEERS, RESTART_DELAY};
use crate::upgrade::config::UpgradeConfig;

/// File name of the CLI config inside `<node-home>/config/`.
pub const CONFIG_FILE_NAME: &str = "push-validator.toml";

/// Where releases are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Base URL of the release-hosting API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// `owner/name` of the repository publishing the CLI.
    #[serde(default = "default_cli_repo")]
    pub cli_repo: String,

    /// `owner/name` of the repository publishing the chain daemon.
    #[serde(default = "default_chain_repo")]
    pub chain_repo: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            cli_repo: default_cli_repo(),
            chain_repo: default_chain_repo(),
        }
    }
}

/// Peer refresh settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersConfig {
    /// URL serving the canonical peer list. Required by `peers refresh` unless passed as a flag.
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Seconds to wait between stopping and starting the daemon.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            max_peers: default_max_peers(),
            restart_delay_secs: default_restart_delay_secs(),
        }
    }
}

/// The whole CLI config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub update: UpgradeConfig,

    #[serde(default)]
    pub peers: PeersConfig,
}

impl GlobalConfig {
    /// Default config location for a node home.
    #[must_use]
    pub fn default_path(node_home: &Path) -> PathBuf {
        node_home.join("config").join(CONFIG_FILE_NAME)
    }

    /// Load from `path` when given, otherwise from the node home default.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub async fn load_with_optional(path: Option<PathBuf>, node_home: &Path) -> Result<Self> {
        let path = path.unwrap_or_else(|| Self::default_path(node_home));
        if path.exists() {
            Self::load_from(&path).await
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_cli_repo() -> String {
    "pushchain/push-validator-cli".to_string()
}

fn default_chain_repo() -> String {
    "pushchain/push-chain-node".to_string()
}

fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}

fn default_restart_delay_secs() -> u64 {
    RESTART_DELAY.as_secs()
}
