//! Download progress reporting.
//!
//! Wraps `indicatif` so the orchestrator only deals with a `(downloaded, total)`
//! callback. When status output is disabled (quiet or structured output) the bar
//! is hidden and every update is a no-op.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// A byte-oriented progress bar for a single asset download.
#[derive(Clone)]
pub struct DownloadProgress {
    inner: IndicatifBar,
}

impl DownloadProgress {
    /// Create a bar sized to the asset's declared length.
    pub fn new(total: u64, visible: bool) -> Self {
        let bar = if visible {
            let bar = IndicatifBar::new(total);
            bar.set_style(download_style());
            bar.set_prefix("Downloading");
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner: bar,
        }
    }

    /// Hidden bar, for tests and structured output.
    pub fn hidden() -> Self {
        Self::new(0, false)
    }

    /// Record progress. `total` is the declared size and may change the bar length.
    pub fn update(&self, downloaded: u64, total: u64) {
        if self.inner.length() != Some(total) {
            self.inner.set_length(total);
        }
        self.inner.set_position(downloaded);
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}
