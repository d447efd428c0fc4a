//! Server Lifecycle
//!
//! The server owns the TCP listener and a shared [`Shutdown`] handle.
//! Accepting runs inside a `select!` against the shutdown signal, so a
//! `stop` command (or Ctrl+C) halts accepting immediately instead of
//! waiting on another inbound connection. Sessions already running get
//! the same signal through their own broadcast receivers and are then
//! drained before the process exits.
//!
//! ```text
//!            ┌───────────────┐
//!            │  accept loop  │◄── select! ──┐
//!            └──────┬────────┘              │
//!                   │ spawn                 │
//!            ┌──────▼────────┐      ┌───────┴───────┐
//!            │ session tasks │◄─────│   Shutdown    │
//!            └──────┬────────┘      │ flag + bcast  │
//!                   │ join          └───────▲───────┘
//!            ┌──────▼────────┐              │
//!            │  drain + db   │        stop command,
//!            │    close      │        Ctrl+C
//!            └───────────────┘
//! ```

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::db::Db;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Shared shutdown handle. Triggering is idempotent: the first call
/// flips the flag and notifies every subscriber, later calls are no-ops.
pub struct Shutdown {
    stopped: AtomicBool,
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(16);
        Self {
            stopped: AtomicBool::new(false),
            notify,
        }
    }

    /// Begins shutdown. Safe to call from any task, any number of times.
    pub fn trigger(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            // Send fails only when nobody is subscribed, which is fine.
            let _ = self.notify.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// A receiver that resolves once shutdown has been triggered.
    ///
    /// Subscribe before checking [`is_triggered`](Self::is_triggered) to
    /// avoid missing a trigger that lands in between.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// The listening server: accepts connections until shutdown, then
/// drains live sessions and closes the database.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    db: Arc<Db>,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<Shutdown>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        handler: CommandHandler,
        db: Arc<Db>,
        shutdown: Arc<Shutdown>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr, "listening");
        Ok(Self {
            listener,
            handler,
            db,
            stats: Arc::new(ConnectionStats::new()),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until shutdown is triggered, then drains sessions.
    pub async fn run(self) {
        let mut sessions = JoinSet::new();
        let mut stopping = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let handler = self.handler.clone();
                            let stats = Arc::clone(&self.stats);
                            let shutdown = Arc::clone(&self.shutdown);
                            sessions.spawn(async move {
                                handle_connection(stream, addr, handler, stats, shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = stopping.recv() => {
                    break;
                }
            }
        }

        // Stop accepting, then wait for every live session to write its
        // final answer and hang up.
        drop(self.listener);
        info!(active = sessions.len(), "draining sessions");
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "session task panicked");
            }
        }

        self.db.close();
        info!("shutdown complete");
    }
}
