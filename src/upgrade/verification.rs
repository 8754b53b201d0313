//! SHA-256 verification of downloaded release archives.
//!
//! Releases publish a checksum manifest: plain text, one `<hex-digest>  <asset-name>`
//! pair per line. The manifest is optional. A missing manifest or a missing entry
//! is reported as [`Verification::NotAvailable`] and the caller decides whether
//! that is acceptable; a digest that is present but wrong is always an error.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_MANIFEST_NAME, METADATA_TIMEOUT};
use crate::core::UpdateError;
use crate::upgrade::fetcher::build_client;
use crate::upgrade::release::Release;

/// Result of a verification attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The archive matches the published digest.
    Verified {
        digest: String,
    },
    /// No digest could be found for the asset.
    NotAvailable {
        reason: String,
    },
}

impl Verification {
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Checks archive bytes against a release's published digests.
#[async_trait]
pub trait ReleaseVerifier: Send + Sync {
    /// Fails only with [`UpdateError::ChecksumMismatch`]; every other problem
    /// (no manifest, unreachable manifest, unlisted asset) is `NotAvailable`.
    async fn verify(
        &self,
        bytes: &[u8],
        release: &Release,
        asset_name: &str,
    ) -> Result<Verification, UpdateError>;
}

/// Parsed checksum manifest, keyed by asset name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: HashMap<String, String>,
}

impl ChecksumManifest {
    /// Parse manifest text.
    ///
    /// Lines that are blank, comments, or whose digest is not 64 hex characters
    /// are skipped. A leading `*` on the name (binary mode marker) is dropped.
    /// Digests are stored lowercase.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (Some(digest), Some(name), None) = (parts.next(), parts.next(), parts.next())
            else {
                debug!("Skipping malformed checksum line: {line}");
                continue;
            };

            if !is_sha256_hex(digest) {
                debug!("Skipping checksum line with invalid digest: {line}");
                continue;
            }

            let name = name.strip_prefix('*').unwrap_or(name);
            entries.insert(name.to_string(), digest.to_ascii_lowercase());
        }

        Self {
            entries,
        }
    }

    /// Digest recorded for `asset_name`.
    #[must_use]
    pub fn digest_for(&self, asset_name: &str) -> Option<&str> {
        self.entries.get(asset_name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compare `bytes` against the entry for `asset_name`.
    pub fn check(&self, bytes: &[u8], asset_name: &str) -> Result<Verification, UpdateError> {
        let Some(expected) = self.digest_for(asset_name) else {
            return Ok(Verification::NotAvailable {
                reason: format!("{asset_name} is not listed in the checksum manifest"),
            });
        };

        let actual = compute_sha256(bytes);
        if actual != expected {
            return Err(UpdateError::ChecksumMismatch {
                asset: asset_name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        Ok(Verification::Verified {
            digest: actual,
        })
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn compute_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Where the manifest for `release` lives.
///
/// A manifest published as a release asset wins. Otherwise the URL is derived
/// from the landing page: `.../releases/tag/<tag>` becomes
/// `.../releases/download/<tag>/checksums.txt`. Returns `None` when neither
/// applies.
#[must_use]
pub fn manifest_url(release: &Release) -> Option<String> {
    if let Some(asset) = release.manifest_asset() {
        return Some(asset.download_url.clone());
    }

    let landing = release.landing_url.trim_end_matches('/');
    if !landing.contains("/releases/tag/") {
        return None;
    }
    let base = landing.replacen("/releases/tag/", "/releases/download/", 1);
    Some(format!("{base}/{DEFAULT_MANIFEST_NAME}"))
}

/// [`ReleaseVerifier`] fetching the manifest over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpVerifier {
    pub fn new() -> Result<Self, UpdateError> {
        Ok(Self {
            client: build_client()?,
            timeout: METADATA_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Download manifest text; any failure is reported as the reason it is unavailable.
    async fn fetch_manifest(&self, url: &str) -> Result<String, String> {
        debug!("Fetching checksums from: {url}");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("failed to fetch checksum manifest: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("checksum manifest returned HTTP {}", response.status()));
        }

        response.text().await.map_err(|e| format!("failed to read checksum manifest: {e}"))
    }
}

#[async_trait]
impl ReleaseVerifier for HttpVerifier {
    async fn verify(
        &self,
        bytes: &[u8],
        release: &Release,
        asset_name: &str,
    ) -> Result<Verification, UpdateError> {
        let Some(url) = manifest_url(release) else {
            return Ok(Verification::NotAvailable {
                reason: format!("release {} publishes no checksum manifest", release.tag),
            });
        };

        let content = match self.fetch_manifest(&url).await {
            Ok(content) => content,
            Err(reason) => {
                warn!("{reason}");
                return Ok(Verification::NotAvailable {
                    reason,
                });
            }
        };

        let manifest = ChecksumManifest::parse(&content);
        let verification = manifest.check(bytes, asset_name)?;
        match &verification {
            Verification::Verified {
                ..
            } => info!("Checksum verified for {asset_name}"),
            Verification::NotAvailable {
                reason,
            } => warn!("{reason}"),
        }
        Ok(verification)
    }
}
