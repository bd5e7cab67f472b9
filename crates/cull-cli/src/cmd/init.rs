use anyhow::{Context as _, Result};
use clap::Args;
use cull_core::db;
use serde::Serialize;
use std::io::Write;

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config template even if `.cull/` already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[persistence]\n\
    backend = \"durable\"\n\
    mirror_keep_cache = false\n\
    \n\
    [operator]\n\
    role = \"editor\"\n\
    \n\
    [metrics]\n\
    high_traffic_sessions = 75\n\
    sessions_column = \"sessions\"\n";

const GITIGNORE: &str = "cull.sqlite3*\ncull.log\nsession\nkeep-cache.json\n";

#[derive(Debug, Serialize)]
struct InitReport {
    state_dir: String,
    database: String,
    config: String,
}

/// Execute `cull init`. Creates the project skeleton:
///
/// ```text
/// .cull/
///   cull.sqlite3    (content store, migrated to the latest schema)
///   config.toml     (default project config template)
///   .gitignore      (database, log, session and keep cache)
/// ```
///
/// # Errors
///
/// Returns an error if `.cull/` already exists and `--force` is not set, or
/// if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, ctx: &CmdContext) -> Result<()> {
    let state_dir = ctx.paths.state_dir();
    if state_dir.exists() && !args.force {
        anyhow::bail!(".cull/ already exists. Use `cull init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let config_path = ctx.paths.config();
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = state_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    // Opening migrates an existing store in place; decisions survive --force.
    let database = ctx.paths.database();
    drop(db::open_store(&database)?);
    tracing::info!(path = %database.display(), "store initialized");

    let report = InitReport {
        state_dir: state_dir.display().to_string(),
        database: database.display().to_string(),
        config: config_path.display().to_string(),
    };
    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}", r.state_dir),
        |r, w| {
            writeln!(w, "✓ Initialized .cull/ project structure.")?;
            writeln!(w)?;
            pretty_kv(w, "Store", &r.database)?;
            pretty_kv(w, "Config", &r.config)?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  Set your operator identity (required for decisions):")?;
            writeln!(w, "    export CULL_OPERATOR=your-name")?;
            writeln!(w)?;
            writeln!(w, "  Load content and start reviewing:")?;
            writeln!(w, "    cull ingest --file snapshot.json")?;
            writeln!(w, "    cull review")
        },
    )
}
