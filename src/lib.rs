//! Push Chain validator operator CLI.
//!
//! The library behind the `push-validator` binary. Three subsystems do the
//! actual work:
//!
//! - [`upgrade`] - resolves, downloads, verifies, extracts and atomically
//!   installs release binaries (the CLI itself and the `pchaind` daemon), with
//!   one-step rollback and a cached background update check.
//! - [`peers`] - refreshes the daemon's `persistent_peers` from a remote list
//!   and restarts the node when the peer set changed.
//! - [`cli`] - the thin command surface wiring both together.
//!
//! Supporting modules:
//!
//! - [`config`] - global flags and the optional TOML config file
//! - [`core`] - the [`core::UpdateError`] taxonomy and exit codes
//! - [`node`] - node home layout and daemon sentinels
//! - [`utils`] - atomic file writes and progress display
//! - [`constants`] - timeouts, limits and well-known names
//!
//! # Example
//!
//! ```rust,no_run
//! use push_validator_cli::upgrade::{ChecksumManifest, Verification};
//!
//! let manifest = ChecksumManifest::parse(
//!     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824  hello.tar.gz\n",
//! );
//! let result = manifest.check(b"hello", "hello.tar.gz")?;
//! assert!(matches!(result, Verification::Verified { .. }));
//! # Ok::<(), push_validator_cli::core::UpdateError>(())
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod node;
pub mod peers;
pub mod upgrade;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
