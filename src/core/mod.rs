//! Core types shared by every subsystem.
//!
//! Currently this is the error taxonomy: [`UpdateError`] for typed failures of
//! the release acquisition engine, [`ErrorContext`] for user-facing rendering,
//! and the exit code mapping operators script against.

pub mod error;

pub use error::{
    EXIT_GENERIC, EXIT_NETWORK, EXIT_PRECONDITION, EXIT_PROCESS, EXIT_SUCCESS, EXIT_VALIDATION,
    ErrorContext, RollbackStatus, UpdateError, exit_code_for, find_update_error,
    user_friendly_error,
};
