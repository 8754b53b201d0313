use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_DOWNLOAD_BYTES, METADATA_TIMEOUT};

/// Settings that control how releases are downloaded, verified and announced.
///
/// Lives under the `[update]` table of the CLI config file:
///
/// ```toml
/// [update]
/// max_download_mb = 500
/// strict_checksum = false
/// check_on_startup = true
/// metadata_timeout_secs = 15
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Hard ceiling for a downloaded archive, in megabytes.
    #[serde(default = "default_max_download_mb")]
    pub max_download_mb: u64,

    /// Fail the update when no checksum manifest entry exists for the asset.
    ///
    /// When `false` a missing manifest only produces a warning.
    #[serde(default)]
    pub strict_checksum: bool,

    /// Run the background update check before ordinary commands.
    #[serde(default = "default_check_on_startup")]
    pub check_on_startup: bool,

    /// Deadline for release metadata requests, in seconds.
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            max_download_mb: default_max_download_mb(),
            strict_checksum: false,
            check_on_startup: default_check_on_startup(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
        }
    }
}

impl UpgradeConfig {
    /// Download ceiling in bytes.
    #[must_use]
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb.saturating_mul(1024 * 1024)
    }

    /// Metadata request deadline.
    #[must_use]
    pub fn metadata_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.metadata_timeout_secs)
    }
}

fn default_max_download_mb() -> u64 {
    DEFAULT_MAX_DOWNLOAD_BYTES / (1024 * 1024)
}

fn default_check_on_startup() -> bool {
    true
}

fn default_metadata_timeout_secs() -> u64 {
    METADATA_TIMEOUT.as_secs()
}
