//! Peer refresh and node restart.
//!
//! [`PeerRefresher::refresh`] is meant to be called from cron. It replaces the
//! daemon's `persistent_peers` with a remote list and restarts the node when the
//! set of peers changed. It never fails its caller: every problem ends up as an
//! `ERROR:` line in `<node-home>/logs/peer-refresh.log`.

pub mod config;
pub mod log;
pub mod supervisor;

pub use config::{parse_peer_list, peer_set, read_peers, write_peers};
pub use log::RefreshLog;
pub use supervisor::{PidFileSupervisor, StartOptions, Supervisor};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{PEER_FETCH_TIMEOUT, RESTART_DELAY};
use crate::node::NodeHome;
use crate::upgrade::fetcher::build_client;

/// What a refresh did. Returned for display only; a refresh never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Unchanged {
        peers: usize,
    },
    Updated {
        before: usize,
        after: usize,
        restarted: bool,
    },
    Failed {
        detail: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RemotePeers {
    List(Vec<String>),
    Wrapped { peers: Vec<String> },
}

/// Parse a remote peer list.
///
/// Accepts a JSON array of strings, a JSON object with a `peers` array, or
/// plain text separated by commas or whitespace. Duplicates are dropped,
/// first occurrence wins.
#[must_use]
pub fn parse_remote_peers(body: &str) -> Vec<String> {
    let raw: Vec<String> = match serde_json::from_str::<RemotePeers>(body) {
        Ok(RemotePeers::List(peers))
        | Ok(RemotePeers::Wrapped {
            peers,
        }) => peers,
        Err(_) => body
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(ToString::to_string)
            .collect(),
    };

    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .collect()
}

/// Keeps `persistent_peers` in sync with a remote list.
pub struct PeerRefresher {
    client: reqwest::Client,
    supervisor: Arc<dyn Supervisor>,
    fetch_timeout: Duration,
    restart_delay: Duration,
    bin_path: Option<PathBuf>,
}

impl PeerRefresher {
    pub fn new(supervisor: Arc<dyn Supervisor>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            supervisor,
            fetch_timeout: PEER_FETCH_TIMEOUT,
            restart_delay: RESTART_DELAY,
            bin_path: None,
        })
    }

    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Daemon binary used for the restart; defaults to the resolved daemon path.
    #[must_use]
    pub fn with_bin_path(mut self, path: PathBuf) -> Self {
        self.bin_path = Some(path);
        self
    }

    /// Refresh the peers of the node at `home` from `remote_url`, keeping at most `max_peers`.
    pub async fn refresh(
        &self,
        home: &NodeHome,
        remote_url: &str,
        max_peers: usize,
    ) -> RefreshOutcome {
        let log = RefreshLog::new(home.peer_refresh_log());
        match self.try_refresh(home, remote_url, max_peers, &log).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = format!("{e:#}");
                warn!("Peer refresh failed: {detail}");
                log.record(&format!("ERROR: {detail}"));
                RefreshOutcome::Failed {
                    detail,
                }
            }
        }
    }

    async fn try_refresh(
        &self,
        home: &NodeHome,
        remote_url: &str,
        max_peers: usize,
        log: &RefreshLog,
    ) -> Result<RefreshOutcome> {
        let config_path = home.daemon_config();
        let old = read_peers(&config_path)?;

        let mut new = self.fetch_peers(remote_url).await?;
        if new.is_empty() {
            return Err(anyhow!("remote peer list from {remote_url} is empty"));
        }
        new.truncate(max_peers.max(1));

        if new != old {
            write_peers(&config_path, &new)?;
        }

        if peer_set(&old) == peer_set(&new) {
            log.record(&format!("peers unchanged ({} peers)", new.len()));
            return Ok(RefreshOutcome::Unchanged {
                peers: new.len(),
            });
        }

        log.record(&format!("peers updated: {} -> {} peers", old.len(), new.len()));
        info!("Updated persistent_peers: {} -> {} peers", old.len(), new.len());

        let mut restarted = false;
        if self.supervisor.is_running().await {
            log.record("restarting node to apply new peers...");
            self.restart(home).await?;
            log.record("node restarted successfully");
            restarted = true;
        } else {
            debug!("Daemon not running; new peers apply on next start");
        }

        Ok(RefreshOutcome::Updated {
            before: old.len(),
            after: new.len(),
            restarted,
        })
    }

    async fn restart(&self, home: &NodeHome) -> Result<()> {
        self.supervisor.stop().await.context("failed to stop node")?;
        tokio::time::sleep(self.restart_delay).await;

        let bin_path = self.bin_path.clone().unwrap_or_else(|| home.resolve_daemon_path());
        let opts = StartOptions {
            home_dir: home.root().to_path_buf(),
            bin_path,
        };
        self.supervisor.start(&opts).await.context("failed to start node")
    }

    async fn fetch_peers(&self, url: &str) -> Result<Vec<String>> {
        debug!("Fetching peers from {url}");
        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .with_context(|| format!("failed to fetch peers from {url}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("failed to fetch peers from {url}: HTTP {status}"));
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read peer list from {url}"))?;
        Ok(parse_remote_peers(&body))
    }
}
