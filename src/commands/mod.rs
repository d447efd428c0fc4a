//! Command parsing and execution.
//!
//! `registry` turns wire payloads into typed commands; `handler`
//! executes them against the database and the blob store.

pub mod handler;
pub mod registry;

pub use handler::{AuthUser, CommandHandler, CommandOutcome, SessionState};
pub use registry::{Command, CommandKind, RegistryError};
