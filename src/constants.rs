//! Global constants used throughout the validator CLI.
//!
//! Timeouts, size limits and well-known file names that several modules share.
//! Keeping them here makes the operational envelope of the tool easy to audit.

use std::time::Duration;

/// Name of the CLI binary and the archive entry prefix for self-updates.
pub const CLI_BINARY_NAME: &str = "push-validator";

/// Name of the chain daemon binary and its archive entry prefix.
pub const DAEMON_BINARY_NAME: &str = "pchaind";

/// User-Agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("push-validator/", env!("CARGO_PKG_VERSION"));

/// Deadline for release metadata and checksum manifest requests (15 seconds).
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Deadline for the remote peer list request (30 seconds).
pub const PEER_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time to wait for any single chunk of a download body.
pub const DOWNLOAD_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum spacing between two download progress callbacks (20 Hz).
pub const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Default ceiling for a downloaded archive (500 MB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Allowed drift between declared and transferred asset size, in percent.
pub const SIZE_SLACK_PERCENT: u64 = 1;

/// How long a cached update check stays valid (10 minutes).
pub const UPDATE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// How long a finished command waits for a pending background update check.
pub const UPDATE_CHECK_GRACE: Duration = Duration::from_millis(300);

/// Deadline for running the installed binary with `version`.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between stopping and starting the daemon during a peer refresh.
pub const RESTART_DELAY: Duration = Duration::from_secs(2);

/// How long `stop` waits for the daemon to exit after SIGTERM.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on the number of peers written to the node config.
pub const DEFAULT_MAX_PEERS: usize = 20;

/// Number of changelog lines shown before pointing at the full release notes.
pub const CHANGELOG_PREVIEW_LINES: usize = 10;

/// Extra attempts for transient failures while resolving release metadata.
pub const RELEASE_FETCH_RETRIES: usize = 2;

/// Starting delay for exponential backoff (200ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 200;

/// Maximum backoff delay for exponential backoff (2s).
pub const MAX_BACKOFF_DELAY_MS: u64 = 2_000;

/// Timeout for acquiring the install lock.
pub const INSTALL_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// File names probed, case-insensitively, for a checksum manifest among release assets.
pub const CHECKSUM_MANIFEST_NAMES: &[&str] = &["checksums.txt", "sha256sums", "sha256sums.txt"];

/// Manifest name appended to the derived download URL when no asset carries one.
pub const DEFAULT_MANIFEST_NAME: &str = "checksums.txt";
