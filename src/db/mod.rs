//! Database Layer
//!
//! One embedded SQLite connection shared by all sessions, wrapped so
//! that raw cursors never escape and every cursor/statement pair is
//! released exactly once.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Db                                │
//! │  ┌──────────────────┐        ┌──────────────────────────┐   │
//! │  │ Mutex<Connection>│        │     ResourceTracker      │   │
//! │  │  (single writer) │        │ cursor -> statement refs │   │
//! │  └──────────────────┘        └──────────────────────────┘   │
//! │        ▲                                ▲                   │
//! │        │ prepare / drain / release      │ register/release  │
//! │  ┌─────┴────────────────────────────────┴─────┐             │
//! │  │    query_rows / execute / insert           │             │
//! │  └────────────────────────────────────────────┘             │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                          ▲
//!   users.rs helpers           files.rs helpers
//! ```
//!
//! ## Modules
//!
//! - `tracker`: reference-counted cursor/statement release
//! - `manager`: connection owner, row materialization, schema
//! - `users`: Users-table queries and password hashing
//! - `files`: Files-table queries and quota accounting

pub mod files;
pub mod manager;
pub mod tracker;
pub mod users;

// Re-export commonly used types
pub use files::FileRecord;
pub use manager::{Db, DbError, DbResult, Row};
pub use tracker::{CursorId, ResourceTracker};
pub use users::{salted_hash, HASH_LEN, SALT_LEN};
