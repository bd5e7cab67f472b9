use anyhow::{Context as _, Result};
use clap::Args;
use cull_core::ContentDirectory;
use cull_core::model::{ItemId, Outcome};
use cull_triage::TriageSession;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

use super::CmdContext;
use crate::output::{pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct DecideArgs {
    /// Item id.
    pub item: ItemId,

    /// `keep` or `remove` (`unpublish` is accepted for remove).
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
struct DecideReport {
    item: ItemId,
    title: String,
    group: String,
    outcome: Outcome,
    newly_decided: bool,
    status: String,
    triaged: u32,
    total: u32,
}

/// Execute `cull decide`: record one decision through the triage session, so
/// remove also moves the item to draft and counters follow the same rules as
/// the review screen.
///
/// # Errors
///
/// Returns an error if no operator resolves, the item is unknown, or the
/// write fails (including a partial write for remove).
pub async fn run_decide(args: &DecideArgs, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_operator()?;
    let detail = directory
        .get_item_detail(args.item)
        .await
        .with_context(|| format!("look up item {}", args.item))?;

    let mut session = TriageSession::open(Arc::clone(&directory) as Arc<dyn ContentDirectory>)
        .await
        .context("open triage session")?;
    session
        .load_group(&detail.group_id, Some(args.item))
        .await
        .with_context(|| format!("load group {}", detail.group_id))?;
    let applied = session
        .decide_in_place(args.item, args.outcome)
        .await
        .with_context(|| format!("{} item {}", args.outcome, args.item))?;

    let group = session
        .groups()
        .iter()
        .find(|g| g.id == detail.group_id)
        .cloned();
    let status = if args.outcome == Outcome::Remove {
        "draft".to_string()
    } else {
        detail.publication_status.to_string()
    };
    let report = DecideReport {
        item: applied.item,
        title: detail.title,
        group: detail.group_id.to_string(),
        outcome: applied.outcome,
        newly_decided: applied.newly_decided,
        status,
        triaged: group.as_ref().map_or(0, |g| g.triaged_count),
        total: group.as_ref().map_or(0, |g| g.total_count),
    };

    if ctx.quiet && !ctx.output.is_json() {
        return Ok(());
    }
    render_mode(
        ctx.output,
        &report,
        |r, w| writeln!(w, "{}\t{}\t{}", r.item, r.outcome, r.status),
        |r, w| {
            writeln!(w, "✓ {} #{} {}", r.outcome, r.item, r.title)?;
            pretty_kv(w, "Group", format!("{} ({}/{} triaged)", r.group, r.triaged, r.total))?;
            pretty_kv(w, "Status", &r.status)?;
            if !r.newly_decided {
                writeln!(w, "  (item was already decided; counters unchanged)")?;
            }
            Ok(())
        },
    )
}
