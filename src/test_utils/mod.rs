//! Test utilities for the validator CLI.
//!
//! Shared by unit tests and the `integration` test target (through the
//! `test-utils` feature):
//!
//! - [`fixtures`] - in-memory archives, release records, shell-script binaries
//! - [`fakes`] - deterministic implementations of the update and supervisor traits
//! - [`http`] - a tiny HTTP server serving canned responses on localhost
//!
//! # Example
//!
//! ```rust,no_run
//! use push_validator_cli::test_utils::{build_tar_gz, script_binary};
//!
//! let archive = build_tar_gz(&[("pchaind", &script_binary("2.0.0"), 0o755)]);
//! assert!(!archive.is_empty());
//! ```

pub mod fakes;
pub mod fixtures;
pub mod http;

pub use fakes::{
    FailingRollbackInstaller, FakeDownloader, FakeFetcher, FakeSupervisor, ManifestVerifier,
    ScriptedPrompt, StaticProbe,
};
pub use fixtures::{
    archive_name, build_tar_gz, failing_binary, release_for, script_binary, write_executable,
};
pub use http::TestServer;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
