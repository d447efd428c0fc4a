//! # Vaultd - A Multi-User File Storage Server
//!
//! Vaultd is a single-process file storage server speaking a compact
//! binary framing protocol over TCP. Clients authenticate per
//! connection, upload and download files, and manage their accounts;
//! the server keeps account and file metadata in an embedded SQLite
//! database and stores file contents as encrypted blobs on disk.
//!
//! ## Features
//!
//! - **Compact framing**: every message is a 6-byte bit-packed header
//!   plus payload, four frame types, 30-bit payload lengths
//! - **Per-session authentication**: identity lives inside the session
//!   task and dies with the connection
//! - **Compound commands**: `;`-separated batches run in order with one
//!   aggregate answer
//! - **Async I/O**: built on Tokio, one task per connection
//! - **Graceful shutdown**: a `stop` command or Ctrl+C stops accepting,
//!   drains live sessions, and closes the database cleanly
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                             Vaultd                                │
//! │                                                                   │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐            │
//! │  │ TCP Server  │───>│   Session   │───>│  Command    │            │
//! │  │ (Listener)  │    │   Handler   │    │  Handler    │            │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘            │
//! │         │                  ▲                  │                   │
//! │         ▼                  │           ┌──────┴──────┐            │
//! │  ┌─────────────┐    ┌──────┴──────┐    ▼             ▼            │
//! │  │  Shutdown   │    │Frame Codec  │ ┌────────┐  ┌──────────┐      │
//! │  │flag + bcast │    │ 6-byte hdr  │ │   Db   │  │BlobStore │      │
//! │  └─────────────┘    └─────────────┘ │ SQLite │  │ + Crypto │      │
//! │                                     │+tracker│  │  on disk │      │
//! │                                     └────────┘  └──────────┘      │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! Commands are dash-delimited text in a single-command frame, or a
//! `;`-separated batch in a compound frame:
//!
//! - `create-<name>-<pass>`: create an account and log in
//! - `login-<name>-<pass>` / `logout`
//! - `user`: name of the logged-in account
//! - `checkUser-<name>` / `checkFile-<id>` / `checkUpload-<name>-<size>`
//! - `download-<id>` / `deleteFile-<name>-<id>` / `deleteUser-<name>`
//! - `stop-<password>`: shut the server down
//! - `test`: connectivity probe
//!
//! File uploads arrive as file-transfer frames; the answer carries the
//! identifier assigned to the stored file.
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame types, header codec, async frame I/O
//! - [`db`]: embedded SQLite access, cursor tracking, users and files
//! - [`commands`]: command parsing and execution
//! - [`connection`]: per-session handling
//! - [`storage`]: encrypted blob store on the filesystem
//! - [`crypto`]: the encryption seam
//! - [`server`]: listener lifecycle and graceful shutdown

pub mod commands;
pub mod connection;
pub mod crypto;
pub mod db;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, SessionState};
pub use connection::{handle_connection, ConnectionStats};
pub use crypto::{Crypto, NullCrypto};
pub use db::Db;
pub use protocol::{read_frame, write_frame, Frame, FrameType};
pub use server::{Server, Shutdown};
pub use storage::BlobStore;

/// The default port vaultd listens on
pub const DEFAULT_PORT: u16 = 7878;

/// The default host vaultd binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Largest accepted file: 50 MiB.
pub const MAX_FILE_SIZE: i64 = 52_428_800;

/// Per-user storage quota: five maximum-size files.
pub const MAX_USER_QUOTA: i64 = MAX_FILE_SIZE * 5;

/// Version of vaultd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upload size limits, adjustable for tests.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_file_size: i64,
    pub max_user_quota: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_user_quota: MAX_USER_QUOTA,
        }
    }
}
