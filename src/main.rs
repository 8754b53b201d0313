//! `push-validator` entry point.
//!
//! Parses arguments, installs logging, runs the command and maps failures to
//! the documented exit codes:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | generic failure |
//! | 10 | network |
//! | 20 | validation (checksum, archive, metadata) |
//! | 30 | precondition (platform, rollback, configuration) |
//! | 40 | process (install, post-install verification) |

use clap::Parser;
use push_validator_cli::cli::Cli;
use push_validator_cli::core::user_friendly_error;
use tracing_subscriber::EnvFilter;

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        let error_ctx = user_friendly_error(e);
        error_ctx.display();
        std::process::exit(error_ctx.exit_code);
    }
}
