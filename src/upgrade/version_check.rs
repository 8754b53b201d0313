//! Cached update checks.
//!
//! Every successful release lookup is recorded in `<node-home>/.update-cache.json`
//! so that the startup check can skip the network for ten minutes. The cache is
//! strictly advisory: unreadable or corrupt files are treated as "no entry" and
//! failed writes only produce a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::UPDATE_CACHE_TTL;
use crate::node::NodeHome;
use crate::upgrade::fetcher::ReleaseFetcher;
use crate::upgrade::notifier::{Notifier, UpdateNotice};
use crate::utils::atomic_write;

/// One recorded update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCacheEntry {
    pub checked_at: DateTime<Utc>,
    /// Tag of the newest release seen, e.g. `v1.2.0`.
    pub latest_version: String,
    pub update_available: bool,
}

impl UpdateCacheEntry {
    /// Entry stamped with the current time.
    pub fn new(latest_version: impl Into<String>, update_available: bool) -> Self {
        Self {
            checked_at: Utc::now(),
            latest_version: latest_version.into(),
            update_available,
        }
    }

    /// Fresh when `0 <= now - checked_at < 10 minutes`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// [`Self::is_valid`] against an explicit clock.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let age = now - self.checked_at;
        let ttl = chrono::Duration::from_std(UPDATE_CACHE_TTL).unwrap_or(chrono::Duration::MAX);
        age >= chrono::Duration::zero() && age < ttl
    }
}

/// JSON file holding the last [`UpdateCacheEntry`].
#[derive(Debug, Clone)]
pub struct UpdateCache {
    path: PathBuf,
}

impl UpdateCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    #[must_use]
    pub fn for_home(home: &NodeHome) -> Self {
        Self::new(home.update_cache())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last entry, or `None` when the file is absent or unreadable.
    #[must_use]
    pub fn load(&self) -> Option<UpdateCacheEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No update cache at {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Ignoring corrupt update cache {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Persist `entry`. Failures are logged and otherwise ignored.
    pub fn save(&self, entry: &UpdateCacheEntry) {
        let result = serde_json::to_vec_pretty(entry)
            .map_err(anyhow::Error::from)
            .and_then(|content| atomic_write(&self.path, &content));

        match result {
            Ok(()) => debug!("Saved update check to {}", self.path.display()),
            Err(e) => warn!("Could not write update cache {}: {e:#}", self.path.display()),
        }
    }

    /// Remove the cache file if present.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!("Could not remove update cache {}: {e}", self.path.display());
            }
            _ => {}
        }
    }
}

/// Parse a version string with or without a leading `v`.
#[must_use]
pub fn parse_version(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim();
    semver::Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok()
}

/// Whether `candidate` is a newer release than `current`.
///
/// `None` when either side is not a semantic version.
#[must_use]
pub fn is_newer(current: &str, candidate: &str) -> Option<bool> {
    Some(parse_version(candidate)? > parse_version(current)?)
}

/// Check for a newer release and publish the result to `notifier`.
///
/// A fresh cache entry short-circuits the network. Errors are logged at debug
/// level only; this runs behind every command and must never be noticed.
pub async fn background_check(
    fetcher: Arc<dyn ReleaseFetcher>,
    cache: UpdateCache,
    current_version: String,
    notifier: Notifier,
) {
    if let Some(entry) = cache.load().filter(UpdateCacheEntry::is_valid) {
        debug!("Using cached update check from {}", entry.checked_at);
        let update_available =
            is_newer(&current_version, &entry.latest_version).unwrap_or(entry.update_available);
        notifier.set(UpdateNotice {
            current_version,
            latest_version: entry.latest_version,
            update_available,
        });
        return;
    }

    let release = match fetcher.fetch_latest().await {
        Ok(release) => release,
        Err(e) => {
            debug!("Background update check failed: {e}");
            return;
        }
    };

    let update_available = is_newer(&current_version, &release.tag).unwrap_or(false);
    cache.save(&UpdateCacheEntry::new(release.tag.clone(), update_available));
    notifier.set(UpdateNotice {
        current_version,
        latest_version: release.tag,
        update_available,
    });
}

/// Run [`background_check`] as a detached task.
pub fn spawn_background_check(
    fetcher: Arc<dyn ReleaseFetcher>,
    cache: UpdateCache,
    current_version: String,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(background_check(fetcher, cache, current_version, notifier))
}
