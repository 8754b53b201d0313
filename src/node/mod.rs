//! Node home layout.
//!
//! The node home holds the daemon's configuration, state, logs and the CLI's own
//! cache files. [`NodeHome`] centralizes every well-known path inside it so the
//! rest of the crate never concatenates file names by hand.
//!
//! ```text
//! <node-home>/
//! ├── config/config.toml        daemon config (persistent_peers)
//! ├── config/push-validator.toml
//! ├── logs/peer-refresh.log
//! ├── logs/pchaind.log
//! ├── pchaind.pid | cosmovisor.pid
//! ├── cosmovisor/{current,genesis}/bin/pchaind
//! └── .update-cache.json
//! ```

use std::path::{Path, PathBuf};

use crate::constants::DAEMON_BINARY_NAME;

/// Typed view over a node home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHome {
    root: PathBuf,
}

impl NodeHome {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// The daemon's TOML config holding `persistent_peers`.
    #[must_use]
    pub fn daemon_config(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    #[must_use]
    pub fn peer_refresh_log(&self) -> PathBuf {
        self.logs_dir().join("peer-refresh.log")
    }

    #[must_use]
    pub fn daemon_log(&self) -> PathBuf {
        self.logs_dir().join(format!("{DAEMON_BINARY_NAME}.log"))
    }

    #[must_use]
    pub fn update_cache(&self) -> PathBuf {
        self.root.join(".update-cache.json")
    }

    /// PID sentinel written when the daemon is started directly.
    #[must_use]
    pub fn daemon_pid_file(&self) -> PathBuf {
        self.root.join(format!("{DAEMON_BINARY_NAME}.pid"))
    }

    /// PID sentinel written when the daemon runs under cosmovisor.
    #[must_use]
    pub fn cosmovisor_pid_file(&self) -> PathBuf {
        self.root.join("cosmovisor.pid")
    }

    /// Sentinels in the order they are consulted.
    #[must_use]
    pub fn pid_sentinels(&self) -> [PathBuf; 2] {
        [self.daemon_pid_file(), self.cosmovisor_pid_file()]
    }

    /// Presence of either PID sentinel.
    ///
    /// This is a proxy for "the daemon is running", good enough to advise a
    /// restart after an update; the supervisor does a real liveness probe.
    #[must_use]
    pub fn daemon_running(&self) -> bool {
        self.pid_sentinels().iter().any(|p| p.is_file())
    }

    #[must_use]
    pub fn cosmovisor_dir(&self) -> PathBuf {
        self.root.join("cosmovisor")
    }

    /// Where the daemon binary lives when cosmovisor manages the node.
    ///
    /// Returns `None` when the home has no cosmovisor directory. Prefers the
    /// `current` link (the active upgrade) over `genesis`.
    #[must_use]
    pub fn cosmovisor_daemon_path(&self) -> Option<PathBuf> {
        let dir = self.cosmovisor_dir();
        if !dir.is_dir() {
            return None;
        }
        let current = dir.join("current");
        let base = if current.exists() {
            current
        } else {
            dir.join("genesis")
        };
        Some(base.join("bin").join(DAEMON_BINARY_NAME))
    }

    /// Fallback daemon location inside the home.
    #[must_use]
    pub fn local_daemon_path(&self) -> PathBuf {
        self.root.join("bin").join(DAEMON_BINARY_NAME)
    }

    /// Resolve where the daemon binary should be installed.
    ///
    /// Order: cosmovisor layout, `pchaind` on `PATH`, `<home>/bin/pchaind`.
    #[must_use]
    pub fn resolve_daemon_path(&self) -> PathBuf {
        if let Some(path) = self.cosmovisor_daemon_path() {
            return path;
        }
        which::which(DAEMON_BINARY_NAME).unwrap_or_else(|_| self.local_daemon_path())
    }
}
