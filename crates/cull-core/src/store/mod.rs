//! SQLite-backed content directory.

mod snapshot;

pub use snapshot::{ContentSnapshot, IngestReport, SnapshotGroup, SnapshotItem};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::backend::{DispositionBackend, backend_for};
use crate::config::{Operator, ProjectConfig, ProjectPaths};
use crate::db;
use crate::directory::ContentDirectory;
use crate::error::{Result, TriageError};
use crate::links::{LinkGraph, LinkSource, build_link_graph};
use crate::metrics::{MetricsTable, normalize_key, parse_csv};
use crate::model::{
    Disposition, DispositionAck, DispositionRecord, Group, GroupId, Item, ItemDetail, ItemId,
    Outcome, PublicationStatus, StatusAck,
};

/// The default content directory: content, decisions and metrics in one
/// SQLite file under `.cull/`.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
    backend: Box<dyn DispositionBackend>,
    operator: Operator,
}

impl std::fmt::Debug for SqliteDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDirectory")
            .field("backend", &self.backend.name())
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

impl SqliteDirectory {
    /// Open the project store with the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(
        paths: &ProjectPaths,
        config: &ProjectConfig,
        operator: Operator,
    ) -> anyhow::Result<Self> {
        let conn = db::open_store(&paths.database())
            .with_context(|| format!("open content store in {}", paths.state_dir().display()))?;
        let backend = backend_for(&config.persistence, paths);
        debug!(backend = backend.name(), operator = %operator.name, "content store opened");
        Ok(Self::from_connection(conn, backend, operator))
    }

    #[must_use]
    pub fn from_connection(
        conn: Connection,
        backend: Box<dyn DispositionBackend>,
        operator: Operator,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            backend,
            operator,
        }
    }

    #[must_use]
    pub const fn operator(&self) -> &Operator {
        &self.operator
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TriageError::Transient("content store lock poisoned".into()))
    }

    fn require_admin(&self, action: &str) -> Result<()> {
        if self.operator.role.can_administer() {
            Ok(())
        } else {
            warn!(operator = %self.operator.name, action, "permission denied");
            Err(TriageError::PermissionDenied(format!(
                "{action} needs an admin operator ({} is {})",
                self.operator.name, self.operator.role
            )))
        }
    }

    /// Load a content snapshot.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an inconsistent snapshot, or a transient
    /// error if the write fails. Nothing is written on error.
    pub fn ingest(&self, snapshot: &ContentSnapshot) -> Result<IngestReport> {
        let mut conn = self.lock()?;
        snapshot::ingest(&mut conn, snapshot)
    }

    fn group_exists(conn: &Connection, group: &GroupId) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM groups WHERE group_id = ?1",
                [group.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn item_exists(conn: &Connection, item: ItemId) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM items WHERE item_id = ?1", [item.0], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn dispositions_for(&self, conn: &Connection, ids: &[ItemId]) -> Result<HashMap<ItemId, Outcome>> {
        self.backend.lookup(conn, ids)
    }
}

fn parse_status(raw: &str) -> rusqlite::Result<PublicationStatus> {
    raw.parse().map_err(|err: TriageError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn parse_group(raw: String) -> rusqlite::Result<GroupId> {
    GroupId::new(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn to_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[async_trait]
impl ContentDirectory for SqliteDirectory {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT group_id, label FROM groups ORDER BY position, group_id")?;
        let listed = stmt
            .query_map([], |row| Ok((parse_group(row.get(0)?)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt =
            conn.prepare("SELECT item_id, group_id FROM items WHERE status != 'trashed'")?;
        let members = stmt
            .query_map([], |row| Ok((ItemId(row.get(0)?), row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let ids: Vec<ItemId> = members.iter().map(|(id, _)| *id).collect();
        let decided = self.dispositions_for(&conn, &ids)?;

        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (id, group) in &members {
            let entry = counts.entry(group.as_str()).or_default();
            entry.0 += 1;
            if decided.contains_key(id) {
                entry.1 += 1;
            }
        }

        Ok(listed
            .into_iter()
            .map(|(id, label)| {
                let (total, triaged) = counts.get(id.as_str()).copied().unwrap_or_default();
                Group {
                    id,
                    label,
                    total_count: to_u32(total),
                    triaged_count: to_u32(triaged),
                }
            })
            .collect())
    }

    async fn list_items(&self, group: &GroupId) -> Result<Vec<Item>> {
        let conn = self.lock()?;
        if !Self::group_exists(&conn, group)? {
            return Err(TriageError::group_not_found(group));
        }

        let mut stmt = conn.prepare(
            "SELECT item_id, title, status
             FROM items
             WHERE group_id = ?1 AND status != 'trashed'
             ORDER BY title COLLATE NOCASE, position, item_id",
        )?;
        let mut items = stmt
            .query_map([group.as_str()], |row| {
                Ok(Item {
                    id: ItemId(row.get(0)?),
                    title: row.get(1)?,
                    publication_status: parse_status(&row.get::<_, String>(2)?)?,
                    disposition: Disposition::Undecided,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let ids: Vec<ItemId> = items.iter().map(|item| item.id).collect();
        let decided = self.dispositions_for(&conn, &ids)?;
        for item in &mut items {
            if let Some(outcome) = decided.get(&item.id) {
                item.disposition = Disposition::from(*outcome);
            }
        }

        debug!(group = %group, items = items.len(), "listed items");
        Ok(items)
    }

    async fn get_item_detail(&self, item: ItemId) -> Result<ItemDetail> {
        let conn = self.lock()?;
        let detail = conn
            .query_row(
                "SELECT item_id, title, group_id, status, canonical_url, edit_url
                 FROM items WHERE item_id = ?1",
                [item.0],
                |row| {
                    Ok(ItemDetail {
                        id: ItemId(row.get(0)?),
                        title: row.get(1)?,
                        group_id: parse_group(row.get(2)?)?,
                        publication_status: parse_status(&row.get::<_, String>(3)?)?,
                        categories: BTreeSet::new(),
                        tags: BTreeSet::new(),
                        canonical_url: row.get(4)?,
                        edit_url: row.get(5)?,
                    })
                },
            )
            .optional()?;
        let Some(mut detail) = detail else {
            return Err(TriageError::item_not_found(item));
        };

        let mut stmt = conn.prepare_cached(
            "SELECT taxonomy, term FROM item_terms WHERE item_id = ?1 ORDER BY taxonomy, term",
        )?;
        let terms = stmt
            .query_map([item.0], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (taxonomy, term) in terms {
            if taxonomy == "category" {
                detail.categories.insert(term);
            } else {
                detail.tags.insert(term);
            }
        }

        Ok(detail)
    }

    async fn record_disposition(&self, item: ItemId, outcome: Outcome) -> Result<DispositionAck> {
        let conn = self.lock()?;
        if !Self::item_exists(&conn, item)? {
            return Err(TriageError::item_not_found(item));
        }

        let record = DispositionRecord {
            item_id: item,
            outcome,
            decided_at: Utc::now(),
            decided_by: self.operator.name.clone(),
        };
        self.backend.record(&conn, &record)?;
        info!(item = %item, outcome = %outcome, operator = %self.operator.name, "disposition recorded");

        Ok(DispositionAck {
            item_id: item,
            outcome,
            remembered: self.backend.remembers(outcome),
        })
    }

    async fn transition_to_draft(&self, item: ItemId) -> Result<StatusAck> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE items SET status = 'draft', updated_at_us = ?2 WHERE item_id = ?1",
            params![item.0, Utc::now().timestamp_micros()],
        )?;
        if updated == 0 {
            return Err(TriageError::item_not_found(item));
        }
        info!(item = %item, "moved to draft");

        Ok(StatusAck {
            item_id: item,
            new_status: PublicationStatus::Draft,
        })
    }

    async fn get_link_graph(&self) -> Result<LinkGraph> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, canonical_url, content FROM items
             WHERE status != 'trashed' ORDER BY item_id",
        )?;
        let sources = stmt
            .query_map([], |row| {
                Ok(LinkSource {
                    id: ItemId(row.get(0)?),
                    canonical_url: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        Ok(build_link_graph(&sources))
    }

    async fn get_metrics(&self) -> Result<MetricsTable> {
        let conn = self.lock()?;
        let document: Option<String> = conn
            .query_row("SELECT document FROM metrics_imports WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match document {
            Some(document) => Ok(serde_json::from_str(&document)?),
            None => Ok(MetricsTable::default()),
        }
    }

    async fn import_metrics_csv(&self, source_name: &str, raw: &str) -> Result<MetricsTable> {
        self.require_admin("metrics import")?;
        let now = Utc::now();
        let table = parse_csv(raw)?.with_source(source_name, now);
        let document = serde_json::to_string(&table)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO metrics_imports (id, source_name, imported_at_us, document)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                source_name = excluded.source_name,
                imported_at_us = excluded.imported_at_us,
                document = excluded.document",
            params![source_name, now.timestamp_micros(), document],
        )?;
        info!(source = source_name, rows = table.rows.len(), columns = table.columns.len(), "metrics imported");
        Ok(table)
    }

    async fn clear_all_triage_data(&self) -> Result<usize> {
        self.require_admin("clear")?;
        let conn = self.lock()?;
        let cleared = self.backend.clear(&conn)?;
        conn.execute("DELETE FROM metrics_imports", [])?;
        info!(cleared, operator = %self.operator.name, "triage data cleared");
        Ok(cleared)
    }

    async fn list_removed_keys(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let removed = self.backend.removed_ids(&conn)?;
        let mut stmt = conn.prepare_cached("SELECT canonical_url FROM items WHERE item_id = ?1")?;

        let mut keys = BTreeSet::new();
        for id in removed {
            let url: Option<String> = stmt.query_row([id.0], |row| row.get(0)).optional()?;
            match url {
                Some(url) if !url.trim().is_empty() => {
                    keys.insert(normalize_key(&url));
                }
                _ => debug!(item = %id, "removed item has no canonical url"),
            }
        }
        Ok(keys)
    }

    async fn list_decisions(&self, group: Option<&GroupId>) -> Result<Vec<DispositionRecord>> {
        let conn = self.lock()?;
        let records = self.backend.decisions(&conn)?;
        let Some(group) = group else {
            return Ok(records);
        };

        let mut stmt = conn.prepare("SELECT item_id, group_id FROM items")?;
        let owners: BTreeMap<ItemId, String> = stmt
            .query_map([], |row| Ok((ItemId(row.get(0)?), row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(records
            .into_iter()
            .filter(|record| owners.get(&record.item_id).map(String::as_str) == Some(group.as_str()))
            .collect())
    }
}
