//! Vaultd - A Multi-User File Storage Server
//!
//! This is the main entry point for the vaultd server.
//! It sets up logging, the database, the blob store, and the TCP
//! listener, then runs until a `stop` command or Ctrl+C.

use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vaultd::commands::CommandHandler;
use vaultd::crypto::NullCrypto;
use vaultd::db::Db;
use vaultd::server::{Server, Shutdown};
use vaultd::storage::BlobStore;
use vaultd::Limits;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// SQLite database file
    db_path: String,
    /// Blob store root directory
    storage_path: String,
    /// Password accepted by the `stop` command
    stop_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: vaultd::DEFAULT_HOST.to_string(),
            port: vaultd::DEFAULT_PORT,
            db_path: "vaultd.db".to_string(),
            storage_path: "storage".to_string(),
            stop_secret: "reallyactuallystop".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = take_value(&args, i, "--host");
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = take_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--db" => {
                    config.db_path = take_value(&args, i, "--db");
                    i += 2;
                }
                "--storage" => {
                    config.storage_path = take_value(&args, i, "--storage");
                    i += 2;
                }
                "--stop-secret" => {
                    config.stop_secret = take_value(&args, i, "--stop-secret");
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("vaultd version {}", vaultd::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
vaultd - A Multi-User File Storage Server

USAGE:
    vaultd [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 7878)
        --db <PATH>            SQLite database file (default: vaultd.db)
        --storage <DIR>        Blob store directory (default: storage)
        --stop-secret <PASS>   Password for the stop command
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    vaultd                             # Start on 127.0.0.1:7878
    vaultd --port 9000                 # Start on port 9000
    vaultd --host 0.0.0.0 --db /srv/vault.db
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
                      ████   █████        █████
                     ░░███  ░░███        ░░███
 █████ █████  ██████  ░███  ███████      ░███████
░░███ ░░███  ░░░░░███ ░███ ░░░███░       ░███░░███
 ░███  ░███   ███████ ░███   ░███        ░███ ░███
 ░░███ ███   ███░░███ ░███   ░███ ███    ░███ ░███
  ░░█████   ░░████████ █████  ░░█████    ████ █████
   ░░░░░     ░░░░░░░░ ░░░░░    ░░░░░    ░░░░ ░░░░░

vaultd v{} - Multi-User File Storage Server
──────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C or the stop command to shutdown gracefully.
"#,
        vaultd::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Open the database and the blob store (shared across all sessions)
    let db = Arc::new(Db::open(&config.db_path)?);
    let store = Arc::new(BlobStore::open(&config.storage_path)?);
    info!(db = %config.db_path, storage = %config.storage_path, "storage initialized");

    // Make sure every known account has its directory on disk
    for name in db.user_names()? {
        store.register_user(&name)?;
    }

    let shutdown = Arc::new(Shutdown::new());
    let handler = CommandHandler::new(
        Arc::clone(&db),
        store,
        Arc::new(NullCrypto),
        Limits::default(),
        config.stop_secret.clone(),
        Arc::clone(&shutdown),
    );

    let server = Server::bind(&config.bind_address(), handler, db, Arc::clone(&shutdown)).await?;
    info!("listening on {}", config.bind_address());

    // Ctrl+C feeds the same shutdown path as the stop command
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, stopping server...");
            signal_shutdown.trigger();
        }
    });

    server.run().await;

    info!("server shutdown complete");
    Ok(())
}
