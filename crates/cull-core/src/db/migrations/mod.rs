//! SQLite schema migrations for the content store.

use super::schema;
use rusqlite::{Connection, types::Type};
use tracing::info;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "content tables and disposition map",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "metrics imports",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// The store's `PRAGMA user_version`.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or is negative.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`], one transaction per step.
///
/// Steps at or below the current `user_version` are skipped, so calling this
/// on an up-to-date store is a no-op. Returns the resulting version.
///
/// # Errors
///
/// Returns an error if any step fails; earlier steps stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let mut current = start;

    for step in MIGRATIONS.iter().filter(move |m| m.version > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        info!(version = step.version, migration = step.name, "store migrated");
        current = step.version;
    }

    Ok(current)
}
