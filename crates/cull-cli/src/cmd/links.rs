use anyhow::{Context as _, Result};
use clap::Args;
use cull_core::ContentDirectory;
use cull_core::model::ItemId;
use serde::Serialize;
use std::io::Write;

use super::CmdContext;
use crate::output::{pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct LinksArgs {
    /// Item id.
    pub item: ItemId,
}

#[derive(Debug, Serialize)]
struct LinkedItem {
    id: ItemId,
    title: String,
}

#[derive(Debug, Serialize)]
struct LinksReport {
    item: ItemId,
    title: String,
    inbound: Vec<LinkedItem>,
    outbound: Vec<LinkedItem>,
}

async fn describe(directory: &dyn ContentDirectory, ids: &[ItemId]) -> Vec<LinkedItem> {
    let mut out = Vec::with_capacity(ids.len());
    for &id in ids {
        let title = directory
            .get_item_detail(id)
            .await
            .map_or_else(|_| String::from("(unknown)"), |detail| detail.title);
        out.push(LinkedItem { id, title });
    }
    out
}

fn write_side(w: &mut dyn Write, heading: &str, items: &[LinkedItem]) -> std::io::Result<()> {
    pretty_section(w, &format!("{heading} ({})", items.len()))?;
    if items.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for linked in items {
        writeln!(w, "  #{:<6} {}", linked.id, linked.title)?;
    }
    Ok(())
}

/// Execute `cull links`: which items link to an item and which it links to.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the item is unknown.
pub async fn run_links(args: &LinksArgs, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let detail = directory
        .get_item_detail(args.item)
        .await
        .with_context(|| format!("look up item {}", args.item))?;
    let graph = directory.get_link_graph().await.context("build link graph")?;

    let report = LinksReport {
        item: args.item,
        title: detail.title,
        inbound: describe(directory.as_ref(), graph.inbound_of(args.item)).await,
        outbound: describe(directory.as_ref(), graph.outbound_of(args.item)).await,
    };

    render_mode(
        ctx.output,
        &report,
        |r, w| {
            for linked in &r.inbound {
                writeln!(w, "in\t{}\t{}", linked.id, linked.title)?;
            }
            for linked in &r.outbound {
                writeln!(w, "out\t{}\t{}", linked.id, linked.title)?;
            }
            Ok(())
        },
        |r, w| {
            writeln!(w, "#{} {}", r.item, r.title)?;
            writeln!(w)?;
            write_side(w, "Linked from", &r.inbound)?;
            writeln!(w)?;
            write_side(w, "Links to", &r.outbound)
        },
    )
}
