//! Release metadata model.
//!
//! [`Release`] and [`Asset`] are the normalized records every other stage of the
//! update pipeline works with. They are built once from the release-hosting
//! provider's JSON ([`RawRelease`]) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::constants::{CHECKSUM_MANIFEST_NAMES, CLI_BINARY_NAME, DAEMON_BINARY_NAME};
use crate::core::UpdateError;

/// Which executable a release carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    /// The operator CLI itself.
    Cli,
    /// The chain daemon.
    Daemon,
}

impl BinaryKind {
    /// Executable name, also the archive entry prefix.
    #[must_use]
    pub const fn binary_name(self) -> &'static str {
        match self {
            Self::Cli => CLI_BINARY_NAME,
            Self::Daemon => DAEMON_BINARY_NAME,
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// One downloadable artifact inside a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Asset {
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    pub download_url: String,
}

/// A named, immutable versioned bundle of assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    /// Tag such as `v1.2.0`. Never empty.
    pub tag: String,
    /// Changelog text; may be empty.
    pub changelog: String,
    /// Human landing page for the release.
    pub landing_url: String,
    /// Never empty; names are unique.
    pub assets: Vec<Asset>,
}

/// Release record as served by the provider API.
#[derive(Debug, Deserialize)]
pub struct RawRelease {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
pub struct RawAsset {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    pub browser_download_url: String,
}

impl Release {
    /// Normalize a provider record, enforcing the release invariants.
    ///
    /// `source_url` is only used to label errors.
    pub fn from_raw(raw: RawRelease, source_url: &str) -> Result<Self, UpdateError> {
        let protocol = |reason: String| UpdateError::Protocol {
            url: source_url.to_string(),
            reason,
        };

        let tag = raw.tag_name.trim().to_string();
        if tag.is_empty() {
            return Err(protocol("release has an empty tag_name".to_string()));
        }
        if raw.assets.is_empty() {
            return Err(protocol(format!("release {tag} has no assets")));
        }

        let mut seen = HashSet::new();
        let mut assets = Vec::with_capacity(raw.assets.len());
        for asset in raw.assets {
            if asset.size < 0 {
                return Err(protocol(format!("asset {} has negative size", asset.name)));
            }
            if !seen.insert(asset.name.clone()) {
                return Err(protocol(format!("duplicate asset name {}", asset.name)));
            }
            assets.push(Asset {
                name: asset.name,
                size: asset.size.unsigned_abs(),
                download_url: asset.browser_download_url,
            });
        }

        Ok(Self {
            tag,
            changelog: raw.body.unwrap_or_default(),
            landing_url: raw.html_url,
            assets,
        })
    }

    /// Tag without a leading `v`.
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag.strip_prefix('v').unwrap_or(&self.tag)
    }

    /// Asset carrying the release's checksum manifest, if any.
    #[must_use]
    pub fn manifest_asset(&self) -> Option<&Asset> {
        self.assets.iter().find(|a| is_manifest_name(&a.name))
    }

    /// Pick the archive for `platform`.
    ///
    /// Only gzip-tar archives whose names mention both the OS and the
    /// architecture qualify. Several qualifying archives are reported as
    /// ambiguous instead of guessing.
    pub fn select_asset(&self, platform: &Platform) -> Result<&Asset, UpdateError> {
        let mut matches: Vec<&Asset> = self
            .assets
            .iter()
            .filter(|a| is_tar_gz(&a.name) && platform.matches(&a.name))
            .collect();

        match matches.len() {
            0 => Err(UpdateError::PlatformNotSupported {
                platform: platform.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => {
                let mut candidates: Vec<String> = matches.iter().map(|a| a.name.clone()).collect();
                candidates.sort();
                Err(UpdateError::AmbiguousArchive {
                    what: format!("release assets for {platform}"),
                    candidates,
                })
            }
        }
    }
}

fn is_manifest_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CHECKSUM_MANIFEST_NAMES.iter().any(|m| lower == *m)
}

fn is_tar_gz(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tar.gz") || lower.ends_with(".tgz")
}

/// Operating system and CPU architecture, normalized to release naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `linux`, `darwin` or `windows`; other values pass through.
    pub os: String,
    /// `amd64` or `arm64`; other values pass through.
    pub arch: String,
}

impl Platform {
    /// Build from either Rust (`macos`, `x86_64`) or release (`darwin`, `amd64`) spellings.
    pub fn new(os: &str, arch: &str) -> Self {
        let os = match os.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => "darwin".to_string(),
            other => other.to_string(),
        };
        let arch = match arch.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => "amd64".to_string(),
            "aarch64" | "arm64" => "arm64".to_string(),
            other => other.to_string(),
        };
        Self {
            os,
            arch,
        }
    }

    /// The platform this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn os_aliases(&self) -> Vec<&str> {
        match self.os.as_str() {
            "darwin" => vec!["darwin", "macos", "apple"],
            other => vec![other],
        }
    }

    fn arch_aliases(&self) -> Vec<&str> {
        match self.arch.as_str() {
            "amd64" => vec!["amd64", "x86_64", "x64"],
            "arm64" => vec!["arm64", "aarch64"],
            other => vec![other],
        }
    }

    /// Whether an asset name encodes this OS and architecture.
    #[must_use]
    pub fn matches(&self, asset_name: &str) -> bool {
        let lower = asset_name.to_ascii_lowercase();
        self.os_aliases().iter().any(|os| lower.contains(os))
            && self.arch_aliases().iter().any(|arch| lower.contains(arch))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
