//! Atomic binary installation with one-step rollback.
//!
//! Layout next to the installation path:
//!
//! - `<path>` current executable
//! - `<path>.old` previous generation, kept for [`BinaryInstaller::rollback`]
//! - `<path>.new` transient, present only while an install is in progress
//! - `<path>.lock` advisory lock held for the duration of install or rollback;
//!   the file stays in place between runs
//!
//! An interrupted install leaves one of two states: pre-install (the current
//! binary was never moved) or half-installed (the current binary is already
//! `<path>.old`). Both are repaired by `rollback`.

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::constants::{INSTALL_LOCK_TIMEOUT, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::UpdateError;
use crate::utils::sibling_with_suffix;

/// Owns an installation path and its `.old`/`.new` siblings.
#[async_trait]
pub trait BinaryInstaller: Send + Sync {
    /// The installation path.
    fn path(&self) -> &Path;

    /// Replace the current binary with `binary`, keeping the previous one as `.old`.
    async fn install(&self, binary: &[u8], cancel: &CancellationToken) -> Result<(), UpdateError>;

    /// Put `.old` back in place. Fails with [`UpdateError::NothingToRollback`]
    /// when there is no previous generation.
    async fn rollback(&self) -> Result<(), UpdateError>;

    /// Delete the current binary, returning the path to its pre-install state.
    ///
    /// Used when a first install fails verification and there is nothing to
    /// roll back to. Only valid while no `.old` exists.
    async fn remove_installed(&self) -> Result<(), UpdateError>;
}

/// Filesystem [`BinaryInstaller`] using write-fsync-rename.
#[derive(Debug, Clone)]
pub struct AtomicInstaller {
    path: PathBuf,
    lock_timeout: Duration,
}

impl AtomicInstaller {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: INSTALL_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn new_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "new")
    }

    #[must_use]
    pub fn old_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "old")
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "lock")
    }

    /// Whether a previous generation is available.
    #[must_use]
    pub fn has_backup(&self) -> bool {
        self.old_path().exists()
    }

    fn install_error(&self, step: &str, err: &std::io::Error, half_installed: bool) -> UpdateError {
        UpdateError::Install {
            path: self.path.display().to_string(),
            reason: format!("{step}: {err}"),
            half_installed,
        }
    }

    /// Steps (a) to (c): the staged file is complete, durable and executable.
    fn stage(&self, new_path: &Path, binary: &[u8]) -> std::io::Result<()> {
        let mut file = File::create(new_path)?;
        file.write_all(binary)?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(new_path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BinaryInstaller for AtomicInstaller {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn install(&self, binary: &[u8], cancel: &CancellationToken) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| self.install_error("failed to create install directory", &e, false))?;
        }

        let _lock = InstallLock::acquire(self.lock_path(), self.lock_timeout).await?;

        let new_path = self.new_path();
        let old_path = self.old_path();

        debug!("Staging {} bytes at {}", binary.len(), new_path.display());
        if let Err(e) = self.stage(&new_path, binary) {
            let _ = fs::remove_file(&new_path);
            return Err(self.install_error("failed to stage new binary", &e, false));
        }

        if cancel.is_cancelled() {
            let _ = fs::remove_file(&new_path);
            return Err(UpdateError::Cancelled);
        }

        let had_current = self.path.exists();
        if had_current {
            fs::rename(&self.path, &old_path).map_err(|e| {
                let _ = fs::remove_file(&new_path);
                self.install_error("failed to move current binary aside", &e, false)
            })?;
        }

        fs::rename(&new_path, &self.path).map_err(|e| {
            self.install_error("failed to move new binary into place", &e, had_current)
        })?;

        info!("Installed new binary at {}", self.path.display());
        Ok(())
    }

    async fn rollback(&self) -> Result<(), UpdateError> {
        let old_path = self.old_path();
        if !old_path.exists() {
            return Err(UpdateError::NothingToRollback {
                path: old_path.display().to_string(),
            });
        }

        let _lock = InstallLock::acquire(self.lock_path(), self.lock_timeout).await?;

        let new_path = self.new_path();
        if new_path.exists() {
            fs::remove_file(&new_path)
                .map_err(|e| self.install_error("failed to remove staged binary", &e, true))?;
        }

        fs::rename(&old_path, &self.path)
            .map_err(|e| self.install_error("failed to restore previous binary", &e, true))?;

        info!("Restored previous binary at {}", self.path.display());
        Ok(())
    }

    async fn remove_installed(&self) -> Result<(), UpdateError> {
        let _lock = InstallLock::acquire(self.lock_path(), self.lock_timeout).await?;

        let _ = fs::remove_file(self.new_path());
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(self.install_error("failed to remove new binary", &e, false))
            }
            _ => {
                info!("Removed unusable binary at {}", self.path.display());
                Ok(())
            }
        }
    }
}

/// Exclusive advisory lock on `<path>.lock`, released on drop.
///
/// The lock file itself is never removed: a waiter may already hold an open
/// handle to it, and unlinking would let a later caller lock a fresh inode.
#[derive(Debug)]
struct InstallLock {
    _file: Arc<File>,
}

impl InstallLock {
    async fn acquire(path: PathBuf, timeout: Duration) -> Result<Self, UpdateError> {
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .map_err(|e| UpdateError::Io {
            message: format!("lock task failed: {e}"),
        })?
        .map_err(|e| UpdateError::Install {
            path: path.display().to_string(),
            reason: format!("failed to open install lock: {e}"),
            half_installed: false,
        })?;

        let file = Arc::new(file);
        let start = Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let file_clone = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || file_clone.try_lock_exclusive())
                .await
                .map_err(|e| UpdateError::Io {
                    message: format!("lock task failed: {e}"),
                })?;

            match locked {
                Ok(true) => {
                    debug!(wait_ms = start.elapsed().as_millis(), "Install lock acquired");
                    return Ok(Self {
                        _file: file,
                    });
                }
                Ok(false) | Err(_) => {
                    let remaining = timeout.saturating_sub(start.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(delay.min(remaining)).await;
                }
            }
        }

        Err(UpdateError::Install {
            path: path.display().to_string(),
            reason: format!("another install holds the lock (waited {timeout:?})"),
            half_installed: false,
        })
    }
}
