//! Release acquisition and update notification.
//!
//! One pipeline serves both the CLI self-update and the chain daemon install:
//!
//! ```text
//! ReleaseFetcher ── Release ──► select asset for Platform
//!        │
//!        ▼
//! AssetDownloader ── bytes ──► ReleaseVerifier ──► BinaryExtractor ──► BinaryInstaller
//!                                                                          │
//!                                            InstalledProbe ◄──────────────┘
//!                                                  │ fails
//!                                                  ▼
//!                                             rollback()
//! ```
//!
//! Every stage is a trait so [`UpdateOrchestrator`] can be driven by fakes in
//! tests. The HTTP and filesystem implementations are [`GithubFetcher`],
//! [`HttpDownloader`], [`HttpVerifier`], [`TarGzExtractor`] and
//! [`AtomicInstaller`].
//!
//! Alongside the pipeline, [`version_check`] keeps the ten-minute
//! [`UpdateCache`] and runs the background check whose result the
//! [`Notifier`] turns into a post-command banner.

pub mod config;
pub mod download;
pub mod extract;
pub mod fetcher;
pub mod installer;
pub mod notifier;
pub mod orchestrator;
pub mod release;
pub mod verification;
pub mod version_check;

pub use config::UpgradeConfig;
pub use download::{AssetDownloader, HttpDownloader, ProgressFn, within_size_slack};
pub use extract::{BinaryExtractor, TarGzExtractor};
pub use fetcher::{GithubFetcher, ReleaseFetcher};
pub use installer::{AtomicInstaller, BinaryInstaller};
pub use notifier::{Notifier, UpdateNotice};
pub use orchestrator::{
    CommandProbe, InstalledProbe, Prompt, StdinPrompt, UpdateOptions, UpdateOrchestrator,
    UpdateOutcome, UpdateStatus,
};
pub use release::{Asset, BinaryKind, Platform, Release};
pub use verification::{ChecksumManifest, HttpVerifier, ReleaseVerifier, Verification};
pub use version_check::{UpdateCache, UpdateCacheEntry, is_newer, spawn_background_check};
