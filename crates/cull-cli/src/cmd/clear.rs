use anyhow::{Context as _, Result, bail};
use clap::Args;
use cull_core::ContentDirectory;
use serde::Serialize;
use std::io::Write;

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Confirm deletion of every recorded decision and the imported metrics.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct ClearReport {
    backend: &'static str,
    removed: usize,
}

/// Execute `cull clear`: wipe the active backend's decisions and the stored
/// metrics table (admin only).
///
/// # Errors
///
/// Returns an error without touching the store if `--yes` is missing, the
/// operator is not an admin, or the delete fails.
pub async fn run_clear(args: &ClearArgs, ctx: &CmdContext) -> Result<()> {
    if !args.yes {
        bail!("refusing to clear triage data without --yes");
    }
    let directory = ctx.open_operator()?;
    let removed = directory
        .clear_all_triage_data()
        .await
        .context("clear triage data")?;
    tracing::info!(removed, operator = %directory.operator().name, "triage data cleared");

    let report = ClearReport {
        backend: directory.backend_name(),
        removed,
    };
    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}\t{}", r.backend, r.removed),
        |r, w| {
            writeln!(w, "✓ Cleared triage data")?;
            pretty_kv(w, "Backend", r.backend)?;
            pretty_kv(w, "Removed", r.removed.to_string())
        },
    )
}
