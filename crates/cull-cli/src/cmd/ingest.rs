use anyhow::{Context as _, Result};
use clap::Args;
use cull_core::store::ContentSnapshot;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::CmdContext;
use crate::output::render;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// JSON content snapshot to load; `-` reads stdin.
    #[arg(long, short)]
    pub file: PathBuf,
}

fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("read snapshot from stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))
}

/// Execute `cull ingest`: load groups and items from a content snapshot.
///
/// Re-ingesting updates items in place; decisions are kept.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the snapshot is invalid, or
/// the store write fails.
pub fn run_ingest(args: &IngestArgs, ctx: &CmdContext) -> Result<()> {
    let raw = read_source(&args.file)?;
    let snapshot = ContentSnapshot::from_json(&raw)
        .with_context(|| format!("parse snapshot {}", args.file.display()))?;

    let directory = ctx.open_viewer()?;
    let report = directory.ingest(&snapshot).context("ingest snapshot")?;

    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render(ctx.output, &report, |r, w| {
        writeln!(
            w,
            "✓ Ingested {} groups, {} items ({} no longer present, marked trashed)",
            r.groups, r.items, r.trashed
        )
    })
}
