use anyhow::Result;
use clap::Args;

use super::CmdContext;

#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Start at a location such as `type=page&post=12` instead of the saved one.
    #[arg(long, value_name = "QUERY")]
    pub at: Option<String>,
}

/// Execute `cull review`: open the full-screen review UI.
///
/// # Errors
///
/// Returns an error if the review screen cannot start.
pub async fn run_review(args: &ReviewArgs, ctx: &CmdContext) -> Result<()> {
    crate::tui::run_review(args.at.as_deref(), ctx).await
}
