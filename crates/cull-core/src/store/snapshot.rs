//! Content snapshots: the JSON form in which the content repository hands its
//! groups and items to the store.

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use crate::error::{Result, TriageError};
use crate::model::{GroupId, ItemId, PublicationStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSnapshot {
    #[serde(default)]
    pub groups: Vec<SnapshotGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotGroup {
    pub id: GroupId,
    pub label: String,
    #[serde(default)]
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub id: ItemId,
    pub title: String,
    #[serde(default = "default_status")]
    pub status: PublicationStatus,
    #[serde(default)]
    pub canonical_url: String,
    #[serde(default)]
    pub edit_url: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Item body as HTML, scanned for internal links.
    #[serde(default)]
    pub content: String,
}

const fn default_status() -> PublicationStatus {
    PublicationStatus::Published
}

impl ContentSnapshot {
    /// Parse a snapshot from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the JSON is malformed or carries invalid
    /// keys.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| TriageError::validation("snapshot", err.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let mut groups = HashSet::new();
        let mut items = HashSet::new();
        for group in &self.groups {
            if !groups.insert(group.id.as_str()) {
                return Err(TriageError::validation(
                    "snapshot",
                    format!("group '{}' appears twice", group.id),
                ));
            }
            for item in &group.items {
                if item.id.0 <= 0 {
                    return Err(TriageError::validation(
                        "item id",
                        format!("'{}' is not a positive integer", item.id),
                    ));
                }
                if !items.insert(item.id) {
                    return Err(TriageError::validation(
                        "snapshot",
                        format!("item {} appears twice", item.id),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// What an ingest changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub groups: usize,
    pub items: usize,
    /// Previously known items of the ingested groups that the snapshot no
    /// longer contains. They are marked trashed, decisions are kept.
    pub trashed: usize,
}

/// Load a snapshot into the store in one transaction.
///
/// Existing rows are updated in place so decisions survive re-ingest.
pub(crate) fn ingest(conn: &mut Connection, snapshot: &ContentSnapshot) -> Result<IngestReport> {
    snapshot.validate()?;

    let now = Utc::now().timestamp_micros();
    let tx = conn.transaction()?;
    let mut report = IngestReport::default();

    for (position, group) in snapshot.groups.iter().enumerate() {
        tx.execute(
            "INSERT INTO groups (group_id, label, position) VALUES (?1, ?2, ?3)
             ON CONFLICT(group_id) DO UPDATE SET label = excluded.label, position = excluded.position",
            params![group.id.as_str(), group.label, i64::try_from(position).unwrap_or(i64::MAX)],
        )?;
        report.groups += 1;

        for (item_position, item) in group.items.iter().enumerate() {
            tx.execute(
                "INSERT INTO items
                    (item_id, group_id, title, status, canonical_url, edit_url, content, position, updated_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(item_id) DO UPDATE SET
                    group_id = excluded.group_id,
                    title = excluded.title,
                    status = excluded.status,
                    canonical_url = excluded.canonical_url,
                    edit_url = excluded.edit_url,
                    content = excluded.content,
                    position = excluded.position,
                    updated_at_us = excluded.updated_at_us",
                params![
                    item.id.0,
                    group.id.as_str(),
                    item.title,
                    item.status.as_str(),
                    item.canonical_url,
                    item.edit_url,
                    item.content,
                    i64::try_from(item_position).unwrap_or(i64::MAX),
                    now,
                ],
            )?;

            tx.execute("DELETE FROM item_terms WHERE item_id = ?1", [item.id.0])?;
            for (taxonomy, terms) in [("category", &item.categories), ("tag", &item.tags)] {
                for term in terms.iter().filter(|t| !t.trim().is_empty()) {
                    tx.execute(
                        "INSERT OR IGNORE INTO item_terms (item_id, taxonomy, term) VALUES (?1, ?2, ?3)",
                        params![item.id.0, taxonomy, term.trim()],
                    )?;
                }
            }
            report.items += 1;
        }

        let present: Vec<i64> = group.items.iter().map(|item| item.id.0).collect();
        let present_json = serde_json::to_string(&present)?;
        report.trashed += tx.execute(
            "UPDATE items SET status = 'trashed', updated_at_us = ?3
             WHERE group_id = ?1
               AND status != 'trashed'
               AND item_id NOT IN (SELECT value FROM json_each(?2))",
            params![group.id.as_str(), present_json, now],
        )?;
        debug!(group = %group.id, items = group.items.len(), "ingested group");
    }

    tx.commit()?;
    info!(
        groups = report.groups,
        items = report.items,
        trashed = report.trashed,
        "snapshot ingested"
    );
    Ok(report)
}
