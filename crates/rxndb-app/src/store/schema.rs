//! Store opener and schema migration.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use crate::store::StoreError;

/// Name recorded in `schema_migrations` once the initial schema is applied.
pub const MIGRATION_INIT: &str = "001_init";

// No AFTER DELETE trigger on `reactions`: the rebuild clears the index with
// `delete-all` before deleting reactions, and nothing else deletes reactions.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS reactions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  table_no INTEGER NOT NULL,
  table_category TEXT NOT NULL,
  buxton_reaction_number TEXT,
  reaction_name TEXT,
  formula_latex TEXT NOT NULL,
  formula_canonical TEXT NOT NULL,
  reactants TEXT NOT NULL,
  products TEXT NOT NULL,
  reactant_species TEXT,
  product_species TEXT,
  notes TEXT,
  validated INTEGER NOT NULL DEFAULT 0,
  validated_by TEXT,
  validated_at TEXT,
  source_path TEXT,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS reactions_table_canonical
  ON reactions(table_no, formula_canonical);
CREATE INDEX IF NOT EXISTS reactions_source ON reactions(source_path);

CREATE TABLE IF NOT EXISTS references_map (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  buxton_code TEXT UNIQUE,
  citation_text TEXT,
  doi TEXT UNIQUE,
  doi_status TEXT NOT NULL DEFAULT 'unknown',
  notes TEXT,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS measurements (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reaction_id INTEGER NOT NULL REFERENCES reactions(id) ON DELETE CASCADE,
  pH TEXT,
  temperature_C REAL,
  rate_value TEXT NOT NULL,
  rate_value_num REAL,
  rate_units TEXT,
  method TEXT,
  conditions TEXT,
  reference_id INTEGER REFERENCES references_map(id) ON DELETE SET NULL,
  source_path TEXT,
  page_info TEXT,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS measurements_source ON measurements(source_path);

CREATE VIRTUAL TABLE IF NOT EXISTS reactions_fts USING fts5(
  reaction_name, formula_canonical, notes, content='reactions', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS reactions_ai AFTER INSERT ON reactions BEGIN
  INSERT INTO reactions_fts(rowid, reaction_name, formula_canonical, notes)
  VALUES (new.id, new.reaction_name, new.formula_canonical, new.notes);
END;

CREATE TRIGGER IF NOT EXISTS reactions_au AFTER UPDATE OF reaction_name, formula_canonical, notes ON reactions BEGIN
  INSERT INTO reactions_fts(reactions_fts, rowid, reaction_name, formula_canonical, notes)
  VALUES ('delete', old.id, old.reaction_name, old.formula_canonical, old.notes);
  INSERT INTO reactions_fts(rowid, reaction_name, formula_canonical, notes)
  VALUES (new.id, new.reaction_name, new.formula_canonical, new.notes);
END;
"#;

/// Open a connection with foreign keys on and WAL journaling requested.
pub fn connect(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::trace!(path = %path.display(), journal_mode = %mode, "store connection opened");
    Ok(conn)
}

/// Open the store at `path`, creating it and its schema when absent.
pub fn open_or_create(path: &Path) -> Result<Connection, StoreError> {
    let mut conn = connect(path)?;
    ensure_schema(&mut conn)?;
    Ok(conn)
}

/// Open the store and set a bounded busy wait for lock contention.
pub fn open_with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    let mut conn = connect(path)?;
    conn.busy_timeout(busy_timeout)?;
    ensure_schema(&mut conn)?;
    Ok(conn)
}

/// Apply the initial migration unless it is already recorded.
pub fn ensure_schema(conn: &mut Connection) -> Result<(), StoreError> {
    let has_migrations: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if has_migrations.is_some() {
        let applied: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE name = ?1",
                params![MIGRATION_INIT],
                |row| row.get(0),
            )
            .optional()?;
        if applied.is_some() {
            return Ok(());
        }
    }

    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           name TEXT NOT NULL UNIQUE,
           applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )?;
    tx.execute_batch(SCHEMA_SQL)?;
    tx.execute(
        "INSERT INTO schema_migrations(name) VALUES (?1)",
        params![MIGRATION_INIT],
    )?;
    tx.commit()?;
    tracing::debug!(migration = MIGRATION_INIT, "applied store schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_or_create_applies_schema_once() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("reactions.db");
        {
            let _conn = open_or_create(&path).expect("first open");
        }
        let conn = open_or_create(&path).expect("second open");
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count migrations");
        assert_eq!(applied, 1);
    }

    #[test]
    fn store_uses_wal_journal() {
        let temp = TempDir::new().expect("temp dir");
        let conn = open_or_create(&temp.path().join("reactions.db")).expect("open");
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal mode");
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
