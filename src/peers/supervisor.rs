//! Starting and stopping the chain daemon.
//!
//! [`Supervisor`] is the only way the peer refresher touches the daemon
//! process. [`PidFileSupervisor`] implements it with the PID sentinels in the
//! node home and plain `kill` signals.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::constants::STOP_TIMEOUT;
use crate::node::NodeHome;
use crate::utils::{atomic_write, ensure_dir};

/// How to launch the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub home_dir: PathBuf,
    pub bin_path: PathBuf,
}

/// Process management for the chain daemon.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn is_running(&self) -> bool;
    async fn stop(&self) -> Result<()>;
    async fn start(&self, opts: &StartOptions) -> Result<()>;
}

/// [`Supervisor`] driven by `pchaind.pid` / `cosmovisor.pid` in the node home.
#[derive(Debug, Clone)]
pub struct PidFileSupervisor {
    home: NodeHome,
    stop_timeout: Duration,
}

impl PidFileSupervisor {
    pub fn new(home: NodeHome) -> Self {
        Self {
            home,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sentinels holding a parseable PID, in lookup order.
    fn recorded_pids(&self) -> Vec<(PathBuf, u32)> {
        self.home
            .pid_sentinels()
            .into_iter()
            .filter_map(|path| {
                let pid = std::fs::read_to_string(&path).ok()?.trim().parse::<u32>().ok()?;
                Some((path, pid))
            })
            .collect()
    }

    /// First sentinel whose PID belongs to a live process.
    async fn running_pid(&self) -> Option<(PathBuf, u32)> {
        for (path, pid) in self.recorded_pids() {
            if process_alive(pid).await {
                return Some((path, pid));
            }
            debug!("Sentinel {} names dead pid {pid}", path.display());
        }
        None
    }

    /// Remove every sentinel whose process is gone.
    async fn clear_stale_sentinels(&self) -> Result<()> {
        for (path, pid) in self.recorded_pids() {
            if !process_alive(pid).await {
                remove_sentinel(&path)?;
            }
        }
        Ok(())
    }
}

async fn signal(pid: u32, sig: &str) -> bool {
    tokio::process::Command::new("kill")
        .arg(sig)
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

async fn process_alive(pid: u32) -> bool {
    signal(pid, "-0").await
}

#[async_trait]
impl Supervisor for PidFileSupervisor {
    async fn is_running(&self) -> bool {
        self.running_pid().await.is_some()
    }

    async fn stop(&self) -> Result<()> {
        let Some((pid_file, pid)) = self.running_pid().await else {
            debug!("No live daemon behind the PID sentinels; already stopped");
            return self.clear_stale_sentinels().await;
        };

        info!("Stopping daemon (pid {pid})");
        if !signal(pid, "-TERM").await {
            bail!("failed to send SIGTERM to pid {pid}");
        }

        let deadline = Instant::now() + self.stop_timeout;
        while process_alive(pid).await {
            if Instant::now() >= deadline {
                let secs = self.stop_timeout.as_secs();
                bail!("daemon (pid {pid}) did not exit within {secs}s");
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        remove_sentinel(&pid_file)?;
        self.clear_stale_sentinels().await
    }

    async fn start(&self, opts: &StartOptions) -> Result<()> {
        ensure_dir(&self.home.logs_dir())?;
        let log_path = self.home.daemon_log();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open daemon log: {}", log_path.display()))?;
        let log_err = log.try_clone().context("Failed to duplicate daemon log handle")?;

        let mut child = Command::new(&opts.bin_path)
            .arg("start")
            .arg("--home")
            .arg(&opts.home_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .with_context(|| format!("Failed to start {}", opts.bin_path.display()))?;

        let pid = child.id();
        // Reap the child once it exits.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        atomic_write(&self.home.daemon_pid_file(), pid.to_string().as_bytes())?;
        info!("Started daemon (pid {pid}), logging to {}", log_path.display());
        Ok(())
    }
}

fn remove_sentinel(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("Failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}
