//! On-Disk Blob Store
//!
//! Persists encrypted blobs under a root directory, keyed by the opaque
//! identifier recorded in the Files table. Blobs live flat under
//! `<root>/<identifier>`; per-user subdirectories under `<root>/users/`
//! are pre-seeded from the user list for the external SFTP bridge.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Filesystem-backed blob storage shared by all sessions.
#[derive(Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens (or creates) the store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join("users"))?;
        info!(root = %root.display(), "blob store opened");
        Ok(Self { root })
    }

    /// A fresh opaque identifier for a new blob. Identifiers travel
    /// inside dash-delimited commands, so the dashless hex form is used.
    pub fn new_identifier(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn blob_path(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Writes a blob under the given identifier.
    pub fn save(&self, identifier: &str, data: &[u8]) -> io::Result<()> {
        let path = self.blob_path(identifier);
        fs::write(&path, data)?;
        debug!(identifier, bytes = data.len(), "blob saved");
        Ok(())
    }

    /// Reads the blob stored under the given identifier.
    pub fn load(&self, identifier: &str) -> io::Result<Vec<u8>> {
        fs::read(self.blob_path(identifier))
    }

    /// Removes a blob. Missing blobs are not an error: the descriptor
    /// row is authoritative and removal must be repeatable.
    pub fn remove(&self, identifier: &str) -> io::Result<()> {
        match fs::remove_file(self.blob_path(identifier)) {
            Ok(()) => {
                debug!(identifier, "blob removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether a blob exists under the given identifier.
    pub fn contains(&self, identifier: &str) -> bool {
        self.blob_path(identifier).is_file()
    }

    /// Pre-seeds the per-user directory consumed by the SFTP bridge.
    /// Called for every known user at startup and on account creation.
    pub fn register_user(&self, name: &str) -> io::Result<()> {
        fs::create_dir_all(self.root.join("users").join(name))
    }
}
