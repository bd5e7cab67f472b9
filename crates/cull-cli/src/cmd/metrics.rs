use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use cull_core::ContentDirectory;
use cull_core::TriageError;
use cull_core::metrics::{MetricRow, export_csv, normalize_key};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct MetricsArgs {
    #[command(subcommand)]
    pub command: MetricsCommand,
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommand {
    /// Import a metrics CSV, replacing the stored table (admin only).
    Import {
        /// CSV file to read.
        file: PathBuf,

        /// Name recorded with the import. Defaults to the file name.
        #[arg(long)]
        source: Option<String>,
    },

    /// Write the stored CSV back out, marking removed pages.
    Export {
        /// Destination file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the metrics row for one page.
    Show {
        /// Slug, path or full URL.
        key: String,
    },
}

#[derive(Debug, Serialize)]
struct ImportReport {
    source: String,
    rows: usize,
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExportReport {
    path: PathBuf,
    rows: usize,
    marked: usize,
}

#[derive(Debug, Serialize)]
struct ShowReport {
    key: String,
    metrics: MetricRow,
}

fn source_name(file: &Path, explicit: Option<&str>) -> String {
    explicit.map_or_else(
        || {
            file.file_name()
                .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned())
        },
        str::to_string,
    )
}

/// Execute `cull metrics <subcommand>`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the operator lacks the
/// admin role for an import, the CSV is malformed, or nothing is stored to
/// export or show.
pub async fn run_metrics(args: &MetricsArgs, ctx: &CmdContext) -> Result<()> {
    match &args.command {
        MetricsCommand::Import { file, source } => run_import(file, source.as_deref(), ctx).await,
        MetricsCommand::Export { output } => run_export(output.as_deref(), ctx).await,
        MetricsCommand::Show { key } => run_show(key, ctx).await,
    }
}

async fn run_import(file: &Path, source: Option<&str>, ctx: &CmdContext) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read metrics CSV {}", file.display()))?;
    let directory = ctx.open_operator()?;
    let source = source_name(file, source);
    let table = directory
        .import_metrics_csv(&source, &raw)
        .await
        .with_context(|| format!("import metrics from {}", file.display()))?;

    let report = ImportReport {
        source,
        rows: table.rows.len(),
        columns: table.columns,
    };
    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}\t{}", r.source, r.rows),
        |r, w| {
            writeln!(w, "✓ Imported {} rows from {}", r.rows, r.source)?;
            pretty_kv(w, "Columns", r.columns.join(", "))
        },
    )
}

async fn run_export(output: Option<&Path>, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let table = directory.get_metrics().await.context("load metrics")?;
    if table.is_empty() {
        bail!("no metrics imported yet. Run `cull metrics import <file>` first");
    }
    let removed = directory
        .list_removed_keys()
        .await
        .context("list removed pages")?;
    let csv = export_csv(&table, &removed);

    let Some(path) = output else {
        std::io::stdout().lock().write_all(csv.as_bytes())?;
        return Ok(());
    };

    std::fs::write(path, &csv).with_context(|| format!("write {}", path.display()))?;
    let marked = table
        .raw_records
        .iter()
        .filter(|record| removed.contains(&record.key))
        .count();
    let report = ExportReport {
        path: path.to_path_buf(),
        rows: table.raw_records.len(),
        marked,
    };
    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}\t{}\t{}", r.path.display(), r.rows, r.marked),
        |r, w| {
            writeln!(w, "✓ Exported {} rows to {}", r.rows, r.path.display())?;
            pretty_kv(w, "Marked", format!("{} for removal", r.marked))
        },
    )
}

async fn run_show(key: &str, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let table = directory.get_metrics().await.context("load metrics")?;
    let normalized = normalize_key(key);
    let Some(row) = table.row_for(key) else {
        return Err(TriageError::NotFound {
            kind: "metrics row",
            id: normalized,
        }
        .into());
    };

    let report = ShowReport {
        key: normalized,
        metrics: row.clone(),
    };
    render_mode(
        ctx.output,
        &report,
        |r, w| {
            for (column, value) in &r.metrics {
                writeln!(w, "{column}\t{value}")?;
            }
            Ok(())
        },
        |r, w| {
            writeln!(w, "{}", r.key)?;
            for (column, value) in &r.metrics {
                pretty_kv(w, column, value.to_string())?;
            }
            Ok(())
        },
    )
}
