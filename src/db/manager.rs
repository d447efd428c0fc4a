//! Database Connection Owner and Row Materialization
//!
//! One embedded SQLite connection is shared by every session. The engine
//! is single-writer and the connection itself is not `Sync`, so all
//! statement use goes through a `Mutex`: a session locks, prepares,
//! drains, releases, and unlocks before the next session runs. Session
//! loops never hold the lock across an `await`.
//!
//! ## Cursor Discipline
//!
//! Raw cursors never escape this module. `query_rows` drains every
//! cursor into a `Vec<Row>` of fixed-arity, heterogeneously typed rows
//! before returning, registering and releasing the cursor through the
//! [`ResourceTracker`]. When the tracker reports that the last live
//! cursor on a statement is gone, the cached statement is discarded so
//! the engine-side handle is finalized instead of lingering in the
//! statement cache.

use crate::db::tracker::ResourceTracker;
use rusqlite::types::Value;
use rusqlite::{CachedStatement, Connection, Params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Errors produced by the database layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Engine-level failure (statement preparation, execution, open).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No user row matched.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// No file row matched.
    #[error("unknown file: {0}")]
    UnknownFile(String),

    /// A user with this name already exists.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// A row cell did not hold the type the caller expected.
    #[error("unexpected type in column {index}: expected {expected}")]
    UnexpectedType { index: usize, expected: &'static str },
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// One fully materialized result row: a fixed-arity list of typed cells.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    fn from_sqlite(row: &rusqlite::Row<'_>) -> DbResult<Self> {
        let arity = row.as_ref().column_count();
        let mut values = Vec::with_capacity(arity);
        for index in 0..arity {
            values.push(row.get::<_, Value>(index)?);
        }
        Ok(Self { values })
    }

    /// Number of cells in this row.
    pub fn arity(&self) -> usize {
        self.values.len()
    }

    /// The cell at `index` as an integer.
    pub fn i64(&self, index: usize) -> DbResult<i64> {
        match self.values.get(index) {
            Some(Value::Integer(n)) => Ok(*n),
            _ => Err(DbError::UnexpectedType {
                index,
                expected: "integer",
            }),
        }
    }

    /// The cell at `index` as an integer, with NULL mapped to `None`
    /// (aggregates like `SUM` return NULL over an empty set).
    pub fn opt_i64(&self, index: usize) -> DbResult<Option<i64>> {
        match self.values.get(index) {
            Some(Value::Integer(n)) => Ok(Some(*n)),
            Some(Value::Null) => Ok(None),
            _ => Err(DbError::UnexpectedType {
                index,
                expected: "integer or null",
            }),
        }
    }

    /// The cell at `index` as text.
    pub fn text(&self, index: usize) -> DbResult<&str> {
        match self.values.get(index) {
            Some(Value::Text(s)) => Ok(s),
            _ => Err(DbError::UnexpectedType {
                index,
                expected: "text",
            }),
        }
    }

    /// The cell at `index` as a blob.
    pub fn blob(&self, index: usize) -> DbResult<&[u8]> {
        match self.values.get(index) {
            Some(Value::Blob(b)) => Ok(b),
            _ => Err(DbError::UnexpectedType {
                index,
                expected: "blob",
            }),
        }
    }
}

/// The shared database: one connection, one tracker, used by every
/// session through `Arc<Db>`.
pub struct Db {
    conn: Mutex<Connection>,
    tracker: ResourceTracker,
}

impl Db {
    /// Opens (or creates) the database file and bootstraps the schema.
    ///
    /// A failure here is fatal at startup: the caller is expected to
    /// abort the process.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "database opened");
        Self::bootstrap(conn)
    }

    /// Opens an in-memory database. Used by tests.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS Users (
                 id   INTEGER PRIMARY KEY,
                 name TEXT NOT NULL UNIQUE,
                 pass BLOB NOT NULL,
                 salt BLOB NOT NULL
             );
             CREATE TABLE IF NOT EXISTS Files (
                 identifier TEXT PRIMARY KEY,
                 owner      INTEGER NOT NULL
                            REFERENCES Users(id) ON DELETE CASCADE,
                 size       INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            tracker: ResourceTracker::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    /// Runs a query and materializes every result row before returning.
    ///
    /// The cursor is registered with the tracker for the duration of the
    /// drain and released exactly once; callers only ever see completed
    /// rows or a typed error.
    pub fn query_rows<P: Params>(&self, sql: &str, params: P) -> DbResult<Vec<Row>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        let cursor = self.tracker.register(sql);
        let result = Self::drain(&mut stmt, params);
        if self.tracker.release(cursor) {
            // Last cursor on this statement: finalize the engine handle
            // instead of returning it to the cache.
            stmt.discard();
        }
        result
    }

    fn drain<P: Params>(stmt: &mut CachedStatement<'_>, params: P) -> DbResult<Vec<Row>> {
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Row::from_sqlite(row)?);
        }
        Ok(out)
    }

    /// Runs a mutating statement and returns the number of affected
    /// rows. The connection lock serializes writers.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        Ok(stmt.execute(params)?)
    }

    /// Runs an INSERT and returns the new rowid.
    pub fn insert<P: Params>(&self, sql: &str, params: P) -> DbResult<i64> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute(params)?;
        Ok(conn.last_insert_rowid())
    }

    /// The tracker guarding this database's cursors.
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Shutdown hook: force-releases anything still registered so no
    /// engine handle outlives the process.
    pub fn close(&self) {
        let leaked = self.tracker.force_release_all();
        debug!(leaked, "database closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_bootstrap_creates_schema() {
        let db = Db::open_in_memory().unwrap();
        let rows = db
            .query_rows(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;",
                [],
            )
            .unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.text(0).unwrap()).collect();
        assert_eq!(names, vec!["Files", "Users"]);
    }

    #[test]
    fn test_query_rows_materializes_and_releases() {
        let db = Db::open_in_memory().unwrap();
        db.execute(
            "INSERT INTO Users (name, pass, salt) VALUES (?1, ?2, ?3);",
            params!["alice", vec![1u8; 64], vec![2u8; 32]],
        )
        .unwrap();

        let rows = db
            .query_rows("SELECT id, name, pass FROM Users;", [])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].arity(), 3);
        assert_eq!(rows[0].i64(0).unwrap(), 1);
        assert_eq!(rows[0].text(1).unwrap(), "alice");
        assert_eq!(rows[0].blob(2).unwrap(), &[1u8; 64][..]);

        // No cursor survives a completed query.
        assert_eq!(db.tracker().live_cursors(), 0);
        assert_eq!(db.tracker().live_statements(), 0);
    }

    #[test]
    fn test_query_rows_releases_on_error() {
        let db = Db::open_in_memory().unwrap();
        let result = db.query_rows("SELECT nonsense FROM nowhere;", []);
        assert!(result.is_err());
        assert_eq!(db.tracker().live_cursors(), 0);
    }

    #[test]
    fn test_row_type_mismatch() {
        let db = Db::open_in_memory().unwrap();
        let rows = db.query_rows("SELECT 'text';", []).unwrap();
        assert!(matches!(
            rows[0].i64(0),
            Err(DbError::UnexpectedType { index: 0, .. })
        ));
    }

    #[test]
    fn test_opt_i64_handles_null_aggregate() {
        let db = Db::open_in_memory().unwrap();
        let rows = db
            .query_rows("SELECT SUM(size) FROM Files WHERE owner = 99;", [])
            .unwrap();
        assert_eq!(rows[0].opt_i64(0).unwrap(), None);
    }

    #[test]
    fn test_insert_returns_rowid() {
        let db = Db::open_in_memory().unwrap();
        let id = db
            .insert(
                "INSERT INTO Users (name, pass, salt) VALUES (?1, ?2, ?3);",
                params!["bob", vec![0u8; 64], vec![0u8; 32]],
            )
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_foreign_key_cascade() {
        let db = Db::open_in_memory().unwrap();
        let uid = db
            .insert(
                "INSERT INTO Users (name, pass, salt) VALUES (?1, ?2, ?3);",
                params!["carol", vec![0u8; 64], vec![0u8; 32]],
            )
            .unwrap();
        db.execute(
            "INSERT INTO Files (identifier, owner, size) VALUES (?1, ?2, ?3);",
            params!["blob-1", uid, 100],
        )
        .unwrap();

        db.execute("DELETE FROM Users WHERE id = ?1;", params![uid])
            .unwrap();
        let rows = db.query_rows("SELECT * FROM Files;", []).unwrap();
        assert!(rows.is_empty());
    }
}
