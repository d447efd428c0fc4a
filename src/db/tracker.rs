//! Cursor/Statement Resource Tracker
//!
//! The embedded engine allocates a handle for every prepared statement,
//! and a statement may back more than one open cursor at a time. Leaked
//! handles eventually exhaust the engine and make unrelated commands
//! fail, so release has to be deterministic rather than left to drop
//! order scattered across call sites.
//!
//! The tracker keeps an explicit reference count of live cursors per
//! statement:
//!
//! - [`ResourceTracker::register`] records a new cursor against a
//!   statement key and returns its id.
//! - [`ResourceTracker::release`] is idempotent; releasing a cursor that
//!   was already released (or never registered) is a no-op. It returns
//!   `true` exactly when the released cursor was the last one alive on
//!   its statement, which tells the caller to finalize the statement.
//! - [`ResourceTracker::force_release_all`] drops all bookkeeping at
//!   shutdown so nothing outlives the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Identifies one live cursor. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(u64);

/// Identifies the statement a cursor was produced by. Statements are
/// keyed by their SQL text: the engine-side handle is the prepared form
/// of exactly that text.
type StatementKey = String;

#[derive(Default)]
struct TrackerInner {
    /// cursor -> owning statement
    cursors: HashMap<CursorId, StatementKey>,
    /// statement -> number of live cursors
    statements: HashMap<StatementKey, usize>,
}

/// Tracks open cursors and their owning statements, guaranteeing
/// exactly-once, leak-free release. Safe to share across sessions.
#[derive(Default)]
pub struct ResourceTracker {
    inner: Mutex<TrackerInner>,
    next_id: AtomicU64,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a cursor produced by the statement with the given key.
    pub fn register(&self, statement: &str) -> CursorId {
        let id = CursorId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        inner.cursors.insert(id, statement.to_owned());
        *inner.statements.entry(statement.to_owned()).or_insert(0) += 1;
        id
    }

    /// Releases a cursor. Returns `true` when no other live cursor
    /// references the same statement, meaning the statement handle must
    /// be finalized by the caller.
    ///
    /// Releasing an unknown or already-released cursor is a no-op.
    pub fn release(&self, cursor: CursorId) -> bool {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let Some(statement) = inner.cursors.remove(&cursor) else {
            return false;
        };
        match inner.statements.get_mut(&statement) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                inner.statements.remove(&statement);
                true
            }
        }
    }

    /// Drops every remaining registration. Called once at shutdown;
    /// anything still live at that point is a leak worth logging.
    pub fn force_release_all(&self) -> usize {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let leaked = inner.cursors.len();
        if leaked > 0 {
            warn!(
                cursors = leaked,
                statements = inner.statements.len(),
                "force-releasing resources still registered at shutdown"
            );
        }
        inner.cursors.clear();
        inner.statements.clear();
        leaked
    }

    /// Number of currently live cursors.
    pub fn live_cursors(&self) -> usize {
        self.inner.lock().expect("tracker lock poisoned").cursors.len()
    }

    /// Number of statements with at least one live cursor.
    pub fn live_statements(&self) -> usize {
        self.inner
            .lock()
            .expect("tracker lock poisoned")
            .statements
            .len()
    }
}
