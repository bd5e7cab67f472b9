//! Canonical SQLite schema for the cull content store.
//!
//! - `groups` and `items` mirror the external content repository
//! - `item_terms` holds categories and tags
//! - `dispositions` is the durable disposition map (one row per decided item)
//! - `metrics_imports` stores the last imported metrics document
//! - `store_meta` tracks the schema version alongside `PRAGMA user_version`

/// Migration v1: content tables, disposition map, store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS groups (
    group_id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    position INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    item_id INTEGER PRIMARY KEY CHECK (item_id > 0),
    group_id TEXT NOT NULL REFERENCES groups(group_id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    status TEXT NOT NULL
        CHECK (status IN ('published', 'draft', 'pending', 'private', 'trashed')),
    canonical_url TEXT NOT NULL DEFAULT '',
    edit_url TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS item_terms (
    item_id INTEGER NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    taxonomy TEXT NOT NULL CHECK (taxonomy IN ('category', 'tag')),
    term TEXT NOT NULL CHECK (length(trim(term)) > 0),
    PRIMARY KEY (item_id, taxonomy, term)
);

CREATE TABLE IF NOT EXISTS dispositions (
    item_id INTEGER PRIMARY KEY REFERENCES items(item_id) ON DELETE CASCADE,
    status TEXT NOT NULL CHECK (status IN ('keep', 'remove')),
    decided_at_us INTEGER NOT NULL,
    decided_by TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 0);

CREATE INDEX IF NOT EXISTS idx_items_group_title ON items (group_id, title);
CREATE INDEX IF NOT EXISTS idx_items_status ON items (status);
CREATE INDEX IF NOT EXISTS idx_item_terms_term ON item_terms (taxonomy, term);
CREATE INDEX IF NOT EXISTS idx_dispositions_status ON dispositions (status);
";

/// Migration v2: persisted metrics import.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS metrics_imports (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    source_name TEXT NOT NULL,
    imported_at_us INTEGER NOT NULL,
    document TEXT NOT NULL
);
";

/// Indexes every migrated database must carry.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_items_group_title",
    "idx_items_status",
    "idx_item_terms_term",
    "idx_dispositions_status",
];
