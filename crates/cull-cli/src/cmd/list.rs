use anyhow::{Context as _, Result};
use clap::Args;
use cull_core::ContentDirectory;
use cull_core::model::{Disposition, GroupId, Item};
use serde::Serialize;
use std::io::{self, Write};

use super::CmdContext;
use crate::output::{Renderable, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Group key, e.g. `page` or `post`.
    #[arg(long, short)]
    pub group: GroupId,

    /// Only items with this disposition (`keep`, `remove`, `undecided`).
    #[arg(long, short)]
    pub disposition: Option<Disposition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub id: i64,
    pub title: String,
    pub status: String,
    pub disposition: String,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.0,
            title: item.title.clone(),
            status: item.publication_status.to_string(),
            disposition: item.disposition.to_string(),
        }
    }
}

fn disposition_marker(disposition: &str) -> &'static str {
    match disposition {
        "keep" => "✓",
        "remove" => "✗",
        _ => "·",
    }
}

impl Renderable for ItemRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{} {:>6}  {:<10} {}",
            disposition_marker(&self.disposition),
            self.id,
            self.status,
            self.title
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}\t{}\t{}", self.id, self.disposition, self.status, self.title)
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "DISPOSITION", "STATUS", "TITLE"]
    }
}

/// Keep only items with the requested disposition.
fn filter_items(items: Vec<Item>, disposition: Option<Disposition>) -> Vec<Item> {
    match disposition {
        Some(wanted) => items.into_iter().filter(|item| item.disposition == wanted).collect(),
        None => items,
    }
}

/// Execute `cull list`: the items of one group in worklist order.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the group is unknown.
pub async fn run_list(args: &ListArgs, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_viewer()?;
    let items = directory
        .list_items(&args.group)
        .await
        .with_context(|| format!("list items of {}", args.group))?;
    let rows: Vec<ItemRow> = filter_items(items, args.disposition)
        .iter()
        .map(ItemRow::from)
        .collect();

    render_list(&rows, ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cull_core::model::{ItemId, PublicationStatus};

    fn item(id: i64, disposition: Disposition) -> Item {
        Item {
            id: ItemId(id),
            title: format!("Item {id}"),
            publication_status: PublicationStatus::Published,
            disposition,
        }
    }

    #[test]
    fn disposition_filter_keeps_matching_items() {
        let items = vec![
            item(1, Disposition::Keep),
            item(2, Disposition::Undecided),
            item(3, Disposition::Remove),
        ];
        let kept = filter_items(items.clone(), Some(Disposition::Undecided));
        assert_eq!(kept.iter().map(|i| i.id.0).collect::<Vec<_>>(), vec![2]);
        assert_eq!(filter_items(items, None).len(), 3);
    }

    #[test]
    fn human_row_shows_marker() {
        let mut buf = Vec::new();
        ItemRow::from(&item(3, Disposition::Remove))
            .render_human(&mut buf)
            .expect("render");
        assert!(String::from_utf8(buf).expect("utf8").starts_with("✗"));
    }
}
