//! `arborsync-store` — local SQLite inventory store.
//!
//! One store API for both transaction scopes: the row operations take a
//! `&Connection`, and `rusqlite::Transaction` derefs to one, so the same
//! functions run standalone or inside [`TreeStore::with_transaction`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use thiserror::Error;

use arborsync_core::{BatchId, ImportBatch, Tree, TreeId, TreeImport};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    area TEXT NOT NULL,
    tree_number TEXT NOT NULL,
    species TEXT NOT NULL DEFAULT '',
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    planting_year INTEGER NOT NULL,
    street TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    imported_by TEXT NOT NULL,
    raw_payload TEXT NOT NULL,
    checksum TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS import_trees (
    import_id INTEGER NOT NULL REFERENCES imports(id),
    tree_id INTEGER NOT NULL,
    PRIMARY KEY (import_id, tree_id)
);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored timestamp '{0}' is not RFC 3339")]
    Timestamp(String),

    #[error("update queue contains a record without an id")]
    MissingId,
}

/// Handle to the local inventory database.
pub struct TreeStore {
    conn: Connection,
}

impl TreeStore {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Full inventory snapshot, ordered by id.
    pub fn list_all(&self) -> Result<Vec<Tree>, StoreError> {
        list_all(&self.conn)
    }

    /// Run `f` inside one transaction. Commits on `Ok`; any other exit
    /// path rolls back when the transaction handle drops.
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Write the audit batch and its affected-id set in one transaction.
    pub fn record_batch(
        &mut self,
        batch: &ImportBatch,
        tree_ids: &[TreeId],
    ) -> Result<BatchId, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO imports (created_at, imported_by, raw_payload, checksum)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                batch.imported_by,
                batch.raw_payload,
                batch.checksum
            ],
        )?;
        let batch_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO import_trees (import_id, tree_id) VALUES (?1, ?2)",
            )?;
            for tree_id in tree_ids {
                stmt.execute(params![batch_id, tree_id])?;
            }
        }
        tx.commit()?;
        Ok(batch_id)
    }

    /// Tree ids a recorded batch touched, ordered. Mostly for tests and
    /// operator inspection.
    pub fn batch_tree_ids(&self, batch_id: BatchId) -> Result<Vec<TreeId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tree_id FROM import_trees WHERE import_id = ?1 ORDER BY tree_id")?;
        let ids = stmt
            .query_map(params![batch_id], |row| row.get(0))?
            .collect::<Result<Vec<TreeId>, _>>()?;
        Ok(ids)
    }

    pub fn batch_count(&self) -> Result<i64, StoreError> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM imports", [], |row| row.get(0))?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Row operations (standalone or transaction scope)
// ---------------------------------------------------------------------------

pub fn list_all(conn: &Connection) -> Result<Vec<Tree>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, updated_at, area, tree_number, species,
                latitude, longitude, planting_year, street
         FROM trees ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, TreeId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, f64>(6)?,
            row.get::<_, f64>(7)?,
            row.get::<_, i32>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut trees = Vec::new();
    for row in rows {
        let (id, created_at, updated_at, area, number, species, latitude, longitude, planting_year, street) =
            row?;
        trees.push(Tree {
            id,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            area,
            number,
            species,
            latitude,
            longitude,
            planting_year,
            street,
        });
    }
    Ok(trees)
}

/// Insert every record; returns the assigned ids in input order.
/// No-op on an empty slice.
pub fn create_trees(conn: &Connection, records: &[TreeImport]) -> Result<Vec<TreeId>, StoreError> {
    let mut ids = Vec::with_capacity(records.len());
    if records.is_empty() {
        return Ok(ids);
    }
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT INTO trees (created_at, updated_at, area, tree_number, species,
                            latitude, longitude, planting_year, street)
         VALUES (?1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for rec in records {
        stmt.execute(params![
            now,
            rec.area,
            rec.number,
            rec.species,
            rec.latitude,
            rec.longitude,
            rec.planting_year,
            rec.street
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

/// Rewrite every matched record; each must carry the id the differ
/// resolved. No-op on an empty slice.
pub fn update_trees(conn: &Connection, records: &[TreeImport]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    let now = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "UPDATE trees SET updated_at = ?1, area = ?2, tree_number = ?3, species = ?4,
                          latitude = ?5, longitude = ?6, planting_year = ?7, street = ?8
         WHERE id = ?9",
    )?;
    for rec in records {
        let id = rec.id.ok_or(StoreError::MissingId)?;
        stmt.execute(params![
            now,
            rec.area,
            rec.number,
            rec.species,
            rec.latitude,
            rec.longitude,
            rec.planting_year,
            rec.street,
            id
        ])?;
    }
    Ok(())
}

/// No-op on an empty slice.
pub fn delete_trees_by_id(conn: &Connection, ids: &[TreeId]) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("DELETE FROM trees WHERE id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(s.to_string()))
}
