//! Update notification slot and banner.
//!
//! The background check writes an [`UpdateNotice`] into a [`Notifier`]; after
//! the command finishes the dispatcher reads it back and renders a banner at
//! most once. The handle is cloned into the command context rather than kept in
//! a global.

use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::config::OutputMode;
use crate::constants::CLI_BINARY_NAME;

/// Commands whose first word never shows a banner.
pub const SUPPRESSED_COMMANDS: &[&str] =
    &["update", "version", "help", "init", "start", "sync", "snapshot", "chain"];

/// Result of an update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateNotice {
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
}

#[derive(Debug, Default)]
struct Slot {
    notice: Option<UpdateNotice>,
    rendered: bool,
}

/// Single-slot, mutex-protected notice shared between the background check
/// and the post-run hook.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    slot: Arc<Mutex<Slot>>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, notice: UpdateNotice) {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.notice = Some(notice);
    }

    #[must_use]
    pub fn get(&self) -> Option<UpdateNotice> {
        let slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.notice.clone()
    }

    /// Take the notice for rendering if an update is available and no banner
    /// was shown yet in this process.
    fn claim_banner(&self) -> Option<UpdateNotice> {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.rendered {
            return None;
        }
        let notice = slot.notice.clone().filter(|n| n.update_available)?;
        slot.rendered = true;
        Some(notice)
    }

    /// Write the banner to `out` unless suppressed. Returns whether anything was written.
    pub fn render_to(
        &self,
        out: &mut impl Write,
        command_path: &[&str],
        output: OutputMode,
        quiet: bool,
    ) -> std::io::Result<bool> {
        if is_suppressed(command_path, output, quiet) {
            return Ok(false);
        }
        let Some(notice) = self.claim_banner() else {
            return Ok(false);
        };
        out.write_all(banner_text(&notice).as_bytes())?;
        out.flush()?;
        Ok(true)
    }

    /// [`Self::render_to`] on stdout; write errors are ignored.
    pub fn render(&self, command_path: &[&str], output: OutputMode, quiet: bool) {
        let mut stdout = std::io::stdout();
        let _ = self.render_to(&mut stdout, command_path, output, quiet);
    }
}

/// Whether the banner must stay hidden for this invocation.
#[must_use]
pub fn is_suppressed(command_path: &[&str], output: OutputMode, quiet: bool) -> bool {
    quiet
        || output.is_structured()
        || command_path.first().is_none_or(|cmd| SUPPRESSED_COMMANDS.contains(cmd))
}

/// Banner text, ending with a newline.
#[must_use]
pub fn banner_text(notice: &UpdateNotice) -> String {
    let rule = "━".repeat(52);
    format!(
        "\n{rule}\n  Update available: {} → {}\n  Run {} to upgrade\n{rule}\n",
        notice.current_version.yellow(),
        notice.latest_version.green().bold(),
        format!("{CLI_BINARY_NAME} update").cyan().bold(),
        rule = rule.bright_cyan(),
    )
}
