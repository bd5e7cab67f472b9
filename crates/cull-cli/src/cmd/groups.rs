use anyhow::{Context as _, Result};
use cull_core::ContentDirectory;
use cull_core::model::Group;
use serde::Serialize;
use std::io::{self, Write};

use super::CmdContext;
use crate::output::{Renderable, pretty_rule, render_list};

#[derive(Debug, Clone, Serialize)]
pub struct GroupRow {
    pub id: String,
    pub label: String,
    pub total: u32,
    pub triaged: u32,
    pub remaining: u32,
}

impl From<&Group> for GroupRow {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id.to_string(),
            label: group.label.clone(),
            total: group.total_count,
            triaged: group.triaged_count,
            remaining: group.remaining(),
        }
    }
}

impl Renderable for GroupRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:<16} {:<24} {:>4}/{:<4} {} left",
            self.id, self.label, self.triaged, self.total, self.remaining
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            self.id, self.label, self.total, self.triaged, self.remaining
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "LABEL", "TOTAL", "TRIAGED", "REMAINING"]
    }
}

/// Execute `cull groups`: every group with its progress counters.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub async fn run_groups(ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let groups = directory.list_groups().await.context("list groups")?;
    let rows: Vec<GroupRow> = groups.iter().map(GroupRow::from).collect();

    if ctx.output == crate::output::OutputMode::Pretty {
        let total: u32 = rows.iter().map(|r| r.remaining).sum();
        let mut out = io::stdout().lock();
        writeln!(out, "{} groups, {total} items left", rows.len())?;
        pretty_rule(&mut out)?;
    }
    render_list(&rows, ctx.output)?;
    Ok(())
}
