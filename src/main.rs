//! CLI entry point for the lending protocol indexer.
//!
//! # Architecture Flow
//!
//! This binary delegates to the CLI module, which orchestrates all layers:
//!
//! ```text
//! main.rs (Runtime Initialization)
//!     ↓
//! CLI Layer (src/cli.rs)
//!     ↓
//! 1. Config Layer (src/config.rs)        → Load environment variables
//! 2. DB Layer (src/db/)                  → Open store, run migrations
//! 3. RPC Layer (src/rpc.rs)              → Connect to the node
//! 4. Listener (src/supervisor.rs)        → Subscribe, ingest, dispatch
//! 5. Reconciler (src/reconcile.rs)       → Mirror events into the store
//! 6. API Layer (src/api/)                → Serve the mirrored state
//! ```
//!
//! All errors bubble up with context via `IndexerResult<T>`.

use lending_indexer::{cli, observability};
use tracing::error;

/// Entry point for the lending protocol indexer.
///
/// Initializes the Tokio runtime and structured logging, then delegates to
/// the CLI module for all business logic.
#[tokio::main]
async fn main() {
    // Logging configuration comes from the environment:
    // - RUST_LOG: log level (e.g., "debug", "lending_indexer=trace,sqlx=warn")
    // - LOG_JSON: JSON console output ("true" or "false")
    // - LOG_FILE: write logs to file with daily rotation
    let log_level = std::env::var("RUST_LOG").ok();
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if let Err(e) = observability::init_tracing(log_level, log_file, json_output) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
