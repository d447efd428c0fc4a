//! File Table Queries
//!
//! Helpers for the `Files` table. Each row is a descriptor for one
//! stored blob: the opaque identifier that also names the on-disk blob,
//! the owning user, and the plaintext size used for quota accounting.

use crate::db::manager::{Db, DbError, DbResult, Row};
use rusqlite::params;

/// One stored file's descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Opaque unique identifier; also names the on-disk blob.
    pub identifier: String,
    /// Owning user's id.
    pub owner: i64,
    /// Plaintext size in bytes.
    pub size: i64,
}

impl FileRecord {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            identifier: row.text(0)?.to_owned(),
            owner: row.i64(1)?,
            size: row.i64(2)?,
        })
    }
}

impl Db {
    /// The descriptor for the given identifier.
    pub fn descriptor(&self, identifier: &str) -> DbResult<FileRecord> {
        let rows = self.query_rows(
            "SELECT identifier, owner, size FROM Files WHERE identifier = ?1;",
            params![identifier],
        )?;
        match rows.first() {
            Some(row) => FileRecord::from_row(row),
            None => Err(DbError::UnknownFile(identifier.to_owned())),
        }
    }

    /// All descriptors owned by the given user.
    pub fn owned_files(&self, owner: i64) -> DbResult<Vec<FileRecord>> {
        let rows = self.query_rows(
            "SELECT identifier, owner, size FROM Files WHERE owner = ?1;",
            params![owner],
        )?;
        rows.iter().map(FileRecord::from_row).collect()
    }

    /// Whether a descriptor with this identifier exists.
    pub fn has_descriptor(&self, identifier: &str) -> DbResult<bool> {
        let rows = self.query_rows(
            "SELECT owner FROM Files WHERE identifier = ?1;",
            params![identifier],
        )?;
        Ok(!rows.is_empty())
    }

    /// Inserts a descriptor. Returns false if the identifier is taken.
    pub fn add_descriptor(&self, record: &FileRecord) -> DbResult<bool> {
        if self.has_descriptor(&record.identifier)? {
            return Ok(false);
        }
        let changed = self.execute(
            "INSERT INTO Files (identifier, owner, size) VALUES (?1, ?2, ?3);",
            params![record.identifier, record.owner, record.size],
        )?;
        Ok(changed > 0)
    }

    /// Deletes a descriptor. Returns false if it did not exist.
    pub fn delete_descriptor(&self, identifier: &str) -> DbResult<bool> {
        Ok(self.execute(
            "DELETE FROM Files WHERE identifier = ?1;",
            params![identifier],
        )? > 0)
    }

    /// Total bytes currently stored for the given user. A user with no
    /// files uses zero bytes (the NULL aggregate maps to 0).
    pub fn total_space_for_user(&self, owner: i64) -> DbResult<i64> {
        let rows = self.query_rows(
            "SELECT SUM(size) FROM Files WHERE owner = ?1;",
            params![owner],
        )?;
        match rows.first() {
            Some(row) => Ok(row.opt_i64(0)?.unwrap_or(0)),
            None => Ok(0),
        }
    }
}
