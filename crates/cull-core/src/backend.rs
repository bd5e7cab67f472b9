//! Disposition persistence strategies.
//!
//! The store asks a [`DispositionBackend`] to remember decisions and to
//! project them back onto items. Which backend is active comes from
//! `[persistence]` in the project config; the triage loop never knows.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{BackendKind, PersistenceConfig, ProjectPaths};
use crate::error::{Result, TriageError};
use crate::model::{DispositionRecord, ItemId, Outcome};

/// Where decisions live.
///
/// Every method receives the store connection; backends that keep their state
/// elsewhere ignore it.
pub trait DispositionBackend: Send + Sync {
    /// Short name for logs and `cull groups --json`.
    fn name(&self) -> &'static str;

    /// Remember a decision, replacing any earlier one for the same item.
    fn record(&self, conn: &Connection, record: &DispositionRecord) -> Result<()>;

    /// Whether a recorded `outcome` is kept and counted afterwards.
    fn remembers(&self, _outcome: Outcome) -> bool {
        true
    }

    /// Known outcomes for the given items. Undecided items are absent.
    fn lookup(&self, conn: &Connection, ids: &[ItemId]) -> Result<HashMap<ItemId, Outcome>>;

    /// Forget everything. Returns the number of decisions dropped.
    fn clear(&self, conn: &Connection) -> Result<usize>;

    /// Items whose remembered outcome is remove.
    fn removed_ids(&self, conn: &Connection) -> Result<Vec<ItemId>>;

    /// Every remembered decision.
    fn decisions(&self, conn: &Connection) -> Result<Vec<DispositionRecord>>;
}

/// Build the backend selected by the project config.
#[must_use]
pub fn backend_for(config: &PersistenceConfig, paths: &ProjectPaths) -> Box<dyn DispositionBackend> {
    match config.backend {
        BackendKind::KeepCache => Box::new(KeepCache::new(paths.keep_cache())),
        BackendKind::Durable if config.mirror_keep_cache => Box::new(Mirrored::new(
            DurableDispositions,
            KeepCache::new(paths.keep_cache()),
        )),
        BackendKind::Durable => Box::new(DurableDispositions),
    }
}

// ---------------------------------------------------------------------------
// Durable
// ---------------------------------------------------------------------------

/// One row per decided item in the `dispositions` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurableDispositions;

fn outcome_from_sql(raw: &str) -> rusqlite::Result<Outcome> {
    raw.parse().map_err(|err: TriageError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn timestamp_from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or_default()
}

impl DispositionBackend for DurableDispositions {
    fn name(&self) -> &'static str {
        "durable"
    }

    fn record(&self, conn: &Connection, record: &DispositionRecord) -> Result<()> {
        let changed = conn.execute(
            "INSERT INTO dispositions (item_id, status, decided_at_us, decided_by)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(item_id) DO UPDATE SET
                status = excluded.status,
                decided_at_us = excluded.decided_at_us,
                decided_by = excluded.decided_by",
            params![
                record.item_id.0,
                record.outcome.as_str(),
                record.decided_at.timestamp_micros(),
                record.decided_by,
            ],
        )?;
        debug!(item = %record.item_id, outcome = %record.outcome, changed, "disposition upserted");
        Ok(())
    }

    fn lookup(&self, conn: &Connection, ids: &[ItemId]) -> Result<HashMap<ItemId, Outcome>> {
        let mut stmt = conn.prepare_cached("SELECT status FROM dispositions WHERE item_id = ?1")?;
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let status: Option<String> = stmt
                .query_row([id.0], |row| row.get(0))
                .optional()?;
            if let Some(status) = status {
                found.insert(*id, outcome_from_sql(&status)?);
            }
        }
        Ok(found)
    }

    fn clear(&self, conn: &Connection) -> Result<usize> {
        Ok(conn.execute("DELETE FROM dispositions", [])?)
    }

    fn removed_ids(&self, conn: &Connection) -> Result<Vec<ItemId>> {
        let mut stmt = conn
            .prepare("SELECT item_id FROM dispositions WHERE status = 'remove' ORDER BY item_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(ItemId))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn decisions(&self, conn: &Connection) -> Result<Vec<DispositionRecord>> {
        let mut stmt = conn.prepare(
            "SELECT item_id, status, decided_at_us, decided_by
             FROM dispositions
             ORDER BY decided_at_us, item_id",
        )?;
        let records = stmt
            .query_map([], |row| {
                let status: String = row.get(1)?;
                Ok(DispositionRecord {
                    item_id: ItemId(row.get(0)?),
                    outcome: outcome_from_sql(&status)?,
                    decided_at: timestamp_from_micros(row.get(2)?),
                    decided_by: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Keep cache
// ---------------------------------------------------------------------------

/// Legacy local cache: a JSON array of kept item ids.
///
/// Only keeps are remembered. A remove is acknowledged and drops the id from
/// the set, but nothing records that the item was removed.
#[derive(Debug)]
pub struct KeepCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KeepCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| TriageError::Transient("keep cache lock poisoned".into()))
    }

    fn read_ids(&self) -> Result<BTreeSet<ItemId>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        Ok(serde_json::from_str::<BTreeSet<ItemId>>(&raw)?)
    }

    fn write_ids(&self, ids: &BTreeSet<ItemId>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(ids)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// All cached keeps.
    ///
    /// # Errors
    ///
    /// Returns a transient error if the cache file cannot be read or parsed.
    pub fn kept(&self) -> Result<BTreeSet<ItemId>> {
        let _guard = self.guard()?;
        self.read_ids()
    }

    fn apply(&self, item: ItemId, outcome: Outcome) -> Result<()> {
        let _guard = self.guard()?;
        let mut ids = self.read_ids()?;
        let changed = match outcome {
            Outcome::Keep => ids.insert(item),
            Outcome::Remove => ids.remove(&item),
        };
        if changed {
            self.write_ids(&ids)?;
        }
        Ok(())
    }

    fn modified_at(&self) -> DateTime<Utc> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_default()
    }
}

impl DispositionBackend for KeepCache {
    fn name(&self) -> &'static str {
        "keep-cache"
    }

    fn record(&self, _conn: &Connection, record: &DispositionRecord) -> Result<()> {
        self.apply(record.item_id, record.outcome)
    }

    fn remembers(&self, outcome: Outcome) -> bool {
        outcome == Outcome::Keep
    }

    fn lookup(&self, _conn: &Connection, ids: &[ItemId]) -> Result<HashMap<ItemId, Outcome>> {
        let kept = self.kept()?;
        Ok(ids
            .iter()
            .filter(|id| kept.contains(id))
            .map(|id| (*id, Outcome::Keep))
            .collect())
    }

    fn clear(&self, _conn: &Connection) -> Result<usize> {
        let _guard = self.guard()?;
        let count = self.read_ids()?.len();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(count)
    }

    fn removed_ids(&self, _conn: &Connection) -> Result<Vec<ItemId>> {
        Ok(Vec::new())
    }

    fn decisions(&self, _conn: &Connection) -> Result<Vec<DispositionRecord>> {
        let decided_at = self.modified_at();
        Ok(self
            .kept()?
            .into_iter()
            .map(|item_id| DispositionRecord {
                item_id,
                outcome: Outcome::Keep,
                decided_at,
                decided_by: "keep-cache".to_string(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Mirrored
// ---------------------------------------------------------------------------

/// Durable records plus a keep cache that mirrors every decision.
///
/// The durable side is authoritative. Cache failures are logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct Mirrored {
    durable: DurableDispositions,
    cache: KeepCache,
}

impl Mirrored {
    #[must_use]
    pub const fn new(durable: DurableDispositions, cache: KeepCache) -> Self {
        Self { durable, cache }
    }
}

impl DispositionBackend for Mirrored {
    fn name(&self) -> &'static str {
        "durable+keep-cache"
    }

    fn record(&self, conn: &Connection, record: &DispositionRecord) -> Result<()> {
        self.durable.record(conn, record)?;
        if let Err(err) = self.cache.record(conn, record) {
            warn!(item = %record.item_id, error = %err, "keep cache mirror failed");
        }
        Ok(())
    }

    fn lookup(&self, conn: &Connection, ids: &[ItemId]) -> Result<HashMap<ItemId, Outcome>> {
        self.durable.lookup(conn, ids)
    }

    fn clear(&self, conn: &Connection) -> Result<usize> {
        let cleared = self.durable.clear(conn)?;
        if let Err(err) = self.cache.clear(conn) {
            warn!(error = %err, "keep cache clear failed");
        }
        Ok(cleared)
    }

    fn removed_ids(&self, conn: &Connection) -> Result<Vec<ItemId>> {
        self.durable.removed_ids(conn)
    }

    fn decisions(&self, conn: &Connection) -> Result<Vec<DispositionRecord>> {
        self.durable.decisions(conn)
    }
}
