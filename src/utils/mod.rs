//! Utility modules shared across the crate.
//!
//! - [`fs`] - atomic writes, append-only log lines, executable bits
//! - [`progress`] - download progress bar

pub mod fs;
pub mod progress;

pub use fs::{append_line, atomic_write, ensure_dir, set_executable, sibling_with_suffix};
pub use progress::DownloadProgress;
