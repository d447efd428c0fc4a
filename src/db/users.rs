//! User Table Queries
//!
//! Helpers for the `Users` table: lookup, authentication material, and
//! account lifecycle. Passwords are never stored; each user row carries
//! a random 32-byte salt and the SHA3-512 digest of password||salt.

use crate::db::manager::{Db, DbError, DbResult};
use rand::RngCore;
use rusqlite::params;
use sha3::{Digest, Sha3_512};
use tracing::info;

/// Length of the per-user random salt in bytes.
pub const SALT_LEN: usize = 32;

/// Length of the stored salted hash in bytes (SHA3-512).
pub const HASH_LEN: usize = 64;

/// SHA3-512 over password||salt.
pub fn salted_hash(pass: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_512::new();
    hasher.update(pass);
    hasher.update(salt);
    hasher.finalize().to_vec()
}

fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

impl Db {
    /// The id of the user with the given name.
    pub fn user_id(&self, name: &str) -> DbResult<i64> {
        let rows = self.query_rows("SELECT id FROM Users WHERE name = ?1;", params![name])?;
        match rows.first() {
            Some(row) => row.i64(0),
            None => Err(DbError::UnknownUser(name.to_owned())),
        }
    }

    /// All known user names. This feeds the per-user bookkeeping that
    /// collaborators (blob store, SFTP bridge) seed at startup.
    pub fn user_names(&self) -> DbResult<Vec<String>> {
        let rows = self.query_rows("SELECT name FROM Users;", [])?;
        rows.iter()
            .map(|row| row.text(0).map(str::to_owned))
            .collect()
    }

    /// The stored salted hash for the given user id.
    pub fn stored_pass(&self, id: i64) -> DbResult<Vec<u8>> {
        let rows = self.query_rows("SELECT pass FROM Users WHERE id = ?1;", params![id])?;
        match rows.first() {
            Some(row) => Ok(row.blob(0)?.to_vec()),
            None => Err(DbError::UnknownUser(id.to_string())),
        }
    }

    /// Salts and hashes `pass` with the salt stored for `id`, producing
    /// a digest comparable against [`Db::stored_pass`].
    pub fn salt_pass(&self, id: i64, pass: &[u8]) -> DbResult<Vec<u8>> {
        let rows = self.query_rows("SELECT salt FROM Users WHERE id = ?1;", params![id])?;
        match rows.first() {
            Some(row) => Ok(salted_hash(pass, row.blob(0)?)),
            None => Err(DbError::UnknownUser(id.to_string())),
        }
    }

    /// Whether a user with this name exists.
    pub fn account_exists(&self, name: &str) -> DbResult<bool> {
        let rows = self.query_rows("SELECT id FROM Users WHERE name = ?1;", params![name])?;
        Ok(!rows.is_empty())
    }

    /// Creates a user row with a fresh random salt, returning its id.
    pub fn create_account(&self, name: &str, pass: &[u8]) -> DbResult<i64> {
        if self.account_exists(name)? {
            return Err(DbError::UserExists(name.to_owned()));
        }
        let salt = generate_salt();
        let hashed = salted_hash(pass, &salt);
        let id = self.insert(
            "INSERT INTO Users (name, pass, salt) VALUES (?1, ?2, ?3);",
            params![name, hashed, salt.to_vec()],
        )?;
        info!(user = name, id, "account created");
        Ok(id)
    }

    /// Deletes the account with this id. File rows cascade via the
    /// foreign key; blobs are the caller's responsibility.
    pub fn delete_account(&self, id: i64) -> DbResult<bool> {
        Ok(self.execute("DELETE FROM Users WHERE id = ?1;", params![id])? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let db = Db::open_in_memory().unwrap();
        let id = db.create_account("Alice", b"pw1").unwrap();
        assert_eq!(db.user_id("Alice").unwrap(), id);
        assert!(db.account_exists("Alice").unwrap());
        assert!(!db.account_exists("Bob").unwrap());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let db = Db::open_in_memory().unwrap();
        db.create_account("Alice", b"pw1").unwrap();
        assert!(matches!(
            db.create_account("Alice", b"other"),
            Err(DbError::UserExists(_))
        ));
    }

    #[test]
    fn test_unknown_user_is_typed_error() {
        let db = Db::open_in_memory().unwrap();
        assert!(matches!(
            db.user_id("nobody"),
            Err(DbError::UnknownUser(_))
        ));
    }

    #[test]
    fn test_password_verification_roundtrip() {
        let db = Db::open_in_memory().unwrap();
        let id = db.create_account("Alice", b"pw1").unwrap();

        let stored = db.stored_pass(id).unwrap();
        assert_eq!(stored.len(), HASH_LEN);
        assert_eq!(db.salt_pass(id, b"pw1").unwrap(), stored);
        assert_ne!(db.salt_pass(id, b"wrong").unwrap(), stored);
    }

    #[test]
    fn test_salts_are_unique_per_user() {
        let db = Db::open_in_memory().unwrap();
        let a = db.create_account("Alice", b"same").unwrap();
        let b = db.create_account("Bob", b"same").unwrap();
        // Same password, different salt, different stored hash.
        assert_ne!(db.stored_pass(a).unwrap(), db.stored_pass(b).unwrap());
    }

    #[test]
    fn test_user_names() {
        let db = Db::open_in_memory().unwrap();
        db.create_account("Alice", b"x").unwrap();
        db.create_account("Bob", b"y").unwrap();
        let mut names = db.user_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_delete_account() {
        let db = Db::open_in_memory().unwrap();
        let id = db.create_account("Alice", b"pw1").unwrap();
        assert!(db.delete_account(id).unwrap());
        assert!(!db.delete_account(id).unwrap());
        assert!(!db.account_exists("Alice").unwrap());
    }
}
