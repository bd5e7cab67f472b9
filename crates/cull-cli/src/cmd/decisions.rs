use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use cull_core::ContentDirectory;
use cull_core::model::{DispositionRecord, GroupId};
use serde::Serialize;
use std::io::{self, Write};

use super::CmdContext;
use crate::output::{Renderable, render_list};

#[derive(Args, Debug)]
pub struct DecisionsArgs {
    /// Only decisions for items of this group.
    #[arg(long, short)]
    pub group: Option<GroupId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRow {
    pub item: i64,
    pub outcome: String,
    pub decided_at: DateTime<Utc>,
    pub decided_by: String,
}

impl From<&DispositionRecord> for DecisionRow {
    fn from(record: &DispositionRecord) -> Self {
        Self {
            item: record.item_id.0,
            outcome: record.outcome.to_string(),
            decided_at: record.decided_at,
            decided_by: record.decided_by.clone(),
        }
    }
}

impl Renderable for DecisionRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "#{:<6} {:<7} by {:<12} at {}",
            self.item,
            self.outcome,
            self.decided_by,
            self.decided_at.format("%Y-%m-%d %H:%M")
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            self.item,
            self.outcome,
            self.decided_by,
            self.decided_at.to_rfc3339()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ITEM", "OUTCOME", "DECIDED_BY", "DECIDED_AT"]
    }
}

/// Execute `cull decisions`: the decision log of the active backend, newest
/// first.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub async fn run_decisions(args: &DecisionsArgs, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let mut records = directory
        .list_decisions(args.group.as_ref())
        .await
        .context("list decisions")?;
    records.sort_by(|a, b| {
        b.decided_at
            .cmp(&a.decided_at)
            .then(a.item_id.cmp(&b.item_id))
    });

    let rows: Vec<DecisionRow> = records.iter().map(DecisionRow::from).collect();
    render_list(&rows, ctx.output)?;
    Ok(())
}
