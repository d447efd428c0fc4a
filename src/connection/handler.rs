//! Session Handling
//!
//! One session per accepted socket. Each session task runs in a loop,
//! reading frames and writing answers.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. SessionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ select! frame/shutdown  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch by frame type  │ │
//!    │  │  command → execute      │ │
//!    │  │  file    → store       │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send answer frame(s)    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Peer EOF / terminating answer / shutdown
//!        │
//!        ▼
//! 5. Session task ends, identity dropped with it
//! ```
//!
//! Authentication lives entirely inside the task: the identity is a
//! local `SessionState`, so it dies with the connection and can never
//! leak into another session.

use crate::commands::{CommandHandler, CommandOutcome, SessionState};
use crate::protocol::{read_frame, write_frame, CodecError, Frame, FrameType};
use crate::server::Shutdown;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::BufWriter;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Statistics shared across all sessions.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total frames processed
    pub frames_processed: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client session.
pub struct SessionHandler {
    /// The TCP stream, buffered on the write side
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Shared command handler
    commands: CommandHandler,

    /// Per-session authentication state
    session: SessionState,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Server-wide shutdown handle
    shutdown: Arc<Shutdown>,
}

impl SessionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            commands,
            session: SessionState::new(),
            stats,
            shutdown,
        }
    }

    /// Runs the session to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "session closed"),
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "session error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The read-dispatch-answer loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut stopping = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            return self.send_final_answer().await;
        }

        loop {
            let frame = tokio::select! {
                read = read_frame(&mut self.stream) => match read {
                    Ok(frame) => frame,
                    Err(CodecError::Disconnected) => return Ok(()),
                    Err(e) => return Err(e.into()),
                },
                _ = stopping.recv() => {
                    return self.send_final_answer().await;
                }
            };

            self.stats.frame_processed();
            trace!(
                client = %self.addr,
                frame_type = ?frame.frame_type,
                len = frame.payload.len(),
                "frame received"
            );

            let outcome = match frame.frame_type {
                FrameType::SingleCommand => {
                    let payload = frame.payload_text();
                    Some(self.commands.execute(&payload, &mut self.session))
                }
                FrameType::CompoundCommand => {
                    let payload = frame.payload_text();
                    Some(self.commands.execute_compound(&payload, &mut self.session))
                }
                FrameType::FileTransfer => {
                    Some(self.commands.store_upload(&frame.payload, &self.session))
                }
                FrameType::Answer => {
                    // Clients have no business answering; note it and move on.
                    debug!(client = %self.addr, "ignoring answer frame from client");
                    None
                }
                FrameType::Invalid => {
                    warn!(
                        client = %self.addr,
                        skipped = %frame.payload_text(),
                        "frame with bad magic skipped"
                    );
                    None
                }
            };

            if let Some(outcome) = outcome {
                let terminate = self.send_outcome(outcome).await?;
                if terminate {
                    return Ok(());
                }
            }
        }
    }

    /// Writes the answer frame, plus a file-transfer frame when the
    /// command produced bytes. Returns whether the session should end.
    async fn send_outcome(&mut self, outcome: CommandOutcome) -> Result<bool, ConnectionError> {
        let written = write_frame(&mut self.stream, &Frame::answer(&outcome.text)).await?;
        self.stats.bytes_written(written);

        if let Some(data) = outcome.data {
            let written = write_frame(&mut self.stream, &Frame::file(data)).await?;
            self.stats.bytes_written(written);
        }

        Ok(outcome.terminate)
    }

    /// Tells the peer the server is going away, then ends the session.
    async fn send_final_answer(&mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "closing session for shutdown");
        let written = write_frame(&mut self.stream, &Frame::answer("stop")).await?;
        self.stats.bytes_written(written);
        Ok(())
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame codec error
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Runs a session to completion, swallowing routine disconnect errors.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<Shutdown>,
) {
    let handler = SessionHandler::new(stream, addr, commands, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "session ended with error");
            }
        }
    }
}
