//! `version` - print the CLI version.

use anyhow::Result;
use clap::Args;

use super::common::CommandContext;

#[derive(Args, Debug, Clone, Default)]
pub struct VersionArgs {}

impl VersionArgs {
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        if ctx.output().is_structured() {
            return ctx.print_structured(&serde_json::json!({ "version": version }));
        }
        println!("{} {version}", crate::constants::CLI_BINARY_NAME);
        Ok(())
    }
}
