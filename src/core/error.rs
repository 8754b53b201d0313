//! Error handling for the validator CLI.
//!
//! The release acquisition engine surfaces strongly-typed [`UpdateError`]s; the
//! command layer wraps them in `anyhow` with extra context. At the very top,
//! [`user_friendly_error`] turns whatever came back into an [`ErrorContext`] with
//! a suggestion, and [`exit_code_for`] picks the process exit code operators rely
//! on for automation.
//!
//! # Exit codes
//!
//! | Code | Category     | Variants |
//! |------|--------------|----------|
//! | 0    | success      | - |
//! | 1    | generic      | [`UpdateError::Cancelled`], [`UpdateError::Io`], untyped errors |
//! | 10   | network      | [`UpdateError::Network`] |
//! | 20   | validation   | protocol, checksum, archive and size errors |
//! | 30   | precondition | platform, rollback and configuration errors |
//! | 40   | process      | [`UpdateError::Install`], [`UpdateError::VerificationFailed`] |

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failures without a more specific category.
pub const EXIT_GENERIC: i32 = 1;
/// Exit code for network failures.
pub const EXIT_NETWORK: i32 = 10;
/// Exit code for validation failures (bad data from the remote side).
pub const EXIT_VALIDATION: i32 = 20;
/// Exit code for unmet preconditions on the local machine.
pub const EXIT_PRECONDITION: i32 = 30;
/// Exit code for process and filesystem failures while installing.
pub const EXIT_PROCESS: i32 = 40;

/// Outcome of the rollback attempted after a failed post-install verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    /// The previous binary is back in place.
    RolledBack,
    /// First install: no previous binary existed, so the new one was deleted.
    Removed,
    /// Rollback itself failed; the detail explains why.
    Failed(String),
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RolledBack => write!(f, "rolled back to previous binary"),
            Self::Removed => write!(f, "no previous binary to restore; removed the new one"),
            Self::Failed(detail) => write!(f, "rollback failed: {detail}"),
        }
    }
}

/// Errors produced by the release acquisition engine.
///
/// Leaf services (fetcher, downloader, verifier, extractor, installer) return
/// these unchanged; the orchestrator adds user-facing context on top.
#[derive(Error, Debug, Clone)]
pub enum UpdateError {
    /// Unreachable host, non-2xx response or failed body read.
    #[error("network error for {url}: {reason}")]
    Network {
        /// URL that was being requested.
        url: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// What went wrong.
        reason: String,
    },

    /// The remote answered but the payload did not match the expected schema.
    #[error("unexpected response from {url}: {reason}")]
    Protocol {
        url: String,
        reason: String,
    },

    /// Declared and actual digests disagree.
    #[error("checksum verification failed for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    /// No manifest, or the asset is not listed, and strict mode was requested.
    #[error("checksum unavailable for {asset}: {reason}")]
    ChecksumUnavailable {
        asset: String,
        reason: String,
    },

    #[error("malformed archive: {reason}")]
    MalformedArchive {
        reason: String,
    },

    #[error("no '{binary}' executable found in archive")]
    BinaryNotFound {
        binary: String,
    },

    /// More than one candidate matched; nothing is picked silently.
    #[error("ambiguous {what}: multiple candidates match ({})", candidates.join(", "))]
    AmbiguousArchive {
        what: String,
        candidates: Vec<String>,
    },

    /// Filesystem write or rename failed while installing.
    #[error("install failed at {path}: {reason}")]
    Install {
        path: String,
        reason: String,
        /// True once the previous binary was moved to `.old`.
        half_installed: bool,
    },

    /// The freshly installed binary could not run.
    #[error("post-install verification failed: {reason}; {rollback}")]
    VerificationFailed {
        reason: String,
        rollback: RollbackStatus,
    },

    #[error("no release asset for platform {platform}")]
    PlatformNotSupported {
        platform: String,
    },

    #[error("download of {asset} exceeds the {limit}-byte limit")]
    SizeExceeded {
        asset: String,
        limit: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("nothing to roll back: {path} does not exist")]
    NothingToRollback {
        path: String,
    },

    #[error("configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
    },
}

impl UpdateError {
    /// Builds a [`UpdateError::Network`] from a transport error.
    pub fn network(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            status: err.status().map(|s| s.as_u16()),
            reason: err.to_string(),
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Network {
                ..
            } => EXIT_NETWORK,
            Self::Protocol {
                ..
            }
            | Self::ChecksumMismatch {
                ..
            }
            | Self::ChecksumUnavailable {
                ..
            }
            | Self::MalformedArchive {
                ..
            }
            | Self::BinaryNotFound {
                ..
            }
            | Self::AmbiguousArchive {
                ..
            }
            | Self::SizeExceeded {
                ..
            } => EXIT_VALIDATION,
            Self::PlatformNotSupported {
                ..
            }
            | Self::NothingToRollback {
                ..
            }
            | Self::Config {
                ..
            } => EXIT_PRECONDITION,
            Self::Install {
                ..
            }
            | Self::VerificationFailed {
                ..
            } => EXIT_PROCESS,
            Self::Cancelled
            | Self::Io {
                ..
            } => EXIT_GENERIC,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Client errors (4xx) are permanent; connection failures and 5xx are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network {
                status,
                ..
            } => !matches!(status, Some(code) if (400..500).contains(code)),
            _ => false,
        }
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// An error paired with optional details and an actionable suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// Primary message shown after `error:`.
    pub message: String,
    pub suggestion: Option<String>,
    pub details: Option<String>,
    /// Exit code the process should terminate with.
    pub exit_code: i32,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
            exit_code,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Finds the first [`UpdateError`] anywhere in an `anyhow` chain.
#[must_use]
pub fn find_update_error(error: &anyhow::Error) -> Option<&UpdateError> {
    error.chain().find_map(|cause| cause.downcast_ref::<UpdateError>())
}

/// Exit code for an arbitrary command failure.
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    find_update_error(error).map_or(EXIT_GENERIC, UpdateError::exit_code)
}

/// Convert any error into a displayable context with a suggestion.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let exit_code = exit_code_for(&error);

    // Keep the outermost context as the headline and the typed cause as details
    // when they differ, so "checksum verification failed" is never hidden.
    let headline = error.to_string();
    let mut ctx = match find_update_error(&error) {
        Some(update_err) => {
            let typed = update_err.to_string();
            let ctx = ErrorContext::new(typed.clone(), exit_code);
            if headline == typed {
                ctx
            } else {
                ctx.with_details(headline)
            }
        }
        None => {
            let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
            let ctx = ErrorContext::new(headline, exit_code);
            if chain.is_empty() {
                ctx
            } else {
                ctx.with_details(chain.join(": "))
            }
        }
    };

    if let Some(update_err) = find_update_error(&error) {
        if let Some(suggestion) = suggestion_for(update_err) {
            ctx = ctx.with_suggestion(suggestion);
        }
    }

    ctx
}

fn suggestion_for(error: &UpdateError) -> Option<&'static str> {
    match error {
        UpdateError::Network {
            ..
        } => Some("Check your network connection and try again"),
        UpdateError::ChecksumMismatch {
            ..
        } => Some("The download may be corrupted or tampered with; retry later or report it"),
        UpdateError::ChecksumUnavailable {
            ..
        } => Some("Re-run without --strict to install with an integrity warning"),
        UpdateError::PlatformNotSupported {
            ..
        } => Some("Build from source or download a binary for your platform manually"),
        UpdateError::NothingToRollback {
            ..
        } => Some("A rollback is only possible right after an update"),
        UpdateError::Install {
            ..
        } => Some("Check write permissions on the installation directory"),
        UpdateError::VerificationFailed {
            rollback: RollbackStatus::Failed(_),
            ..
        } => Some("Reinstall the binary manually; the installation path may be unusable"),
        UpdateError::SizeExceeded {
            ..
        } => Some("Raise [update] max_download_mb in the config if this asset is expected"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_by_category() {
        let network = UpdateError::Network {
            url: "https://example.com".into(),
            status: Some(502),
            reason: "bad gateway".into(),
        };
        assert_eq!(network.exit_code(), EXIT_NETWORK);

        let mismatch = UpdateError::ChecksumMismatch {
            asset: "a.tar.gz".into(),
            expected: "00".into(),
            actual: "01".into(),
        };
        assert_eq!(mismatch.exit_code(), EXIT_VALIDATION);

        let platform = UpdateError::PlatformNotSupported {
            platform: "plan9/mips".into(),
        };
        assert_eq!(platform.exit_code(), EXIT_PRECONDITION);

        let verification = UpdateError::VerificationFailed {
            reason: "exit status 1".into(),
            rollback: RollbackStatus::RolledBack,
        };
        assert_eq!(verification.exit_code(), EXIT_PROCESS);
        assert_eq!(UpdateError::Cancelled.exit_code(), EXIT_GENERIC);
    }

    #[test]
    fn test_verification_failed_message_mentions_rollback() {
        let err = UpdateError::VerificationFailed {
            reason: "exit status 1".into(),
            rollback: RollbackStatus::RolledBack,
        };
        let msg = err.to_string();
        assert!(msg.contains("verification failed"));
        assert!(msg.contains("rolled back"));

        let err = UpdateError::VerificationFailed {
            reason: "exit status 1".into(),
            rollback: RollbackStatus::Failed("permission denied".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("rollback failed"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_transient_classification() {
        let not_found = UpdateError::Network {
            url: "u".into(),
            status: Some(404),
            reason: "not found".into(),
        };
        assert!(!not_found.is_transient());

        let refused = UpdateError::Network {
            url: "u".into(),
            status: None,
            reason: "connection refused".into(),
        };
        assert!(refused.is_transient());
        assert!(!UpdateError::Cancelled.is_transient());
    }

    #[test]
    fn test_exit_code_found_through_context() {
        let err: anyhow::Result<()> = Err(UpdateError::ChecksumMismatch {
            asset: "x".into(),
            expected: "a".into(),
            actual: "b".into(),
        })
        .context("Update failed");
        let err = err.unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_VALIDATION);

        let ctx = user_friendly_error(err);
        assert!(ctx.message.contains("checksum verification failed"));
        assert_eq!(ctx.details.as_deref(), Some("Update failed"));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_untyped_error_is_generic() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&err), EXIT_GENERIC);
        let ctx = user_friendly_error(err);
        assert_eq!(ctx.message, "something else");
        assert!(ctx.details.is_none());
    }
}
