//! Per-connection session handling.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionStats, SessionHandler};
