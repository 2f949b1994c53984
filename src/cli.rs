//! Command-line interface for the lending protocol indexer.
//!
//! # Commands
//!
//! - `serve`: run the indexer (event listener + REST API)
//! - `check`: validate configuration and connectivity, then exit
//!
//! # Example
//!
//! ```bash
//! # Run the full service
//! lending-indexer serve
//!
//! # Verify the environment before deploying
//! lending-indexer check
//! ```

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::config::Config;
use crate::db;
use crate::db::repository::Repository;
use crate::error::{IndexerError, IndexerResult};
use crate::locks::EntityLocks;
use crate::reconcile::{register_handlers, Reconciler};
use crate::resolver::{ChainReader, ContractReader};
use crate::router::EventRouter;
use crate::rpc;
use crate::supervisor::EventListener;

/// Lending Protocol Indexer
#[derive(Parser, Debug)]
#[command(name = "lending-indexer")]
#[command(about = "Off-chain mirror of lending protocol pools, loans, and allow-listed tokens", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the indexer: event listener plus REST API
    Serve {
        /// Override the API port from the environment
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration and connectivity, then exit
    Check,
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if configuration loading, database setup, or command
/// execution fails.
pub async fn run() -> IndexerResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => run_serve_command(port).await,
        Commands::Check => run_check_command().await,
    }
}

/// Execute the serve command: wire every component and run until ctrl-c.
async fn run_serve_command(port_override: Option<u16>) -> IndexerResult<()> {
    let config = Config::from_env()?;

    let pool = db::create_pool(config.database_url()).await?;
    let repository = Repository::new(pool);

    let reader = build_chain_reader(&config).await;
    let locks = Arc::new(EntityLocks::new());

    // The listener only starts when the node connection is configured; in
    // degraded mode the REST surface still serves the existing store.
    let mut listener = match (config.listener(), reader.as_ref()) {
        (Some(listener_config), Some(reader)) => {
            let reconciler = Arc::new(Reconciler::new(
                repository.clone(),
                Arc::clone(reader),
                locks,
            ));
            let mut router = EventRouter::new();
            register_handlers(&mut router, reconciler)?;

            match EventListener::open(
                listener_config,
                Arc::new(router),
                config.event_queue_capacity(),
            )
            .await
            {
                Ok(listener) => Some(listener),
                Err(e) => {
                    error!(error = %e, "Event listener failed to start");
                    println!(
                        "{} {}",
                        "⚠️  Listener offline:".yellow().bold(),
                        "serving API only".yellow()
                    );
                    None
                }
            }
        }
        _ => {
            warn!("Listener not configured, running in degraded mode");
            println!(
                "{}",
                "⚠️  No node connection configured, serving API only".yellow()
            );
            None
        }
    };

    let mut state = AppState::new(repository, reader);
    if let Some(ref listener) = listener {
        state.ws_connected = listener.connection_flag();
    }

    let port = port_override.unwrap_or_else(|| config.api_port());
    println!(
        "{} {}",
        "🚀 Lending indexer listening on port".cyan().bold(),
        port.to_string().cyan().bold()
    );

    let rate_limit_rpm = config.rate_limit_rpm();
    let cors_origins = config.cors_origins().to_vec();
    let server = tokio::spawn(async move {
        if let Err(e) = crate::api::server::run_server(state, port, rate_limit_rpm, cors_origins)
            .await
        {
            error!(error = %e, "API server stopped");
        }
    });

    tokio::signal::ctrl_c().await.map_err(|e| {
        IndexerError::config("Failed to install ctrl-c handler", Some(Box::new(e)))
    })?;

    info!("Shutdown signal received, cleaning up");
    println!();
    println!("{}", "🛑 Shutting down gracefully...".yellow().bold());

    if let Some(ref mut listener) = listener {
        listener.close().await;
    }
    server.abort();

    println!("{}", "👋 Shutdown complete".green().bold());
    info!("Shutdown complete");
    Ok(())
}

/// Execute the check command: probe each configured collaborator.
async fn run_check_command() -> IndexerResult<()> {
    println!("{}", "🔎 Checking configuration...".cyan().bold());

    let config = Config::from_env()?;
    println!("{} Configuration loaded", "✅".green());

    let pool = db::create_pool(config.database_url()).await?;
    db::verify_database(&pool).await?;
    println!(
        "{} Database ready at {}",
        "✅".green(),
        config.database_url()
    );

    match config.listener() {
        Some(listener_config) => {
            listener_config
                .protocol_address
                .parse::<Address>()
                .map_err(|e| {
                    IndexerError::config(
                        format!(
                            "Invalid protocol address: {}",
                            listener_config.protocol_address
                        ),
                        Some(Box::new(e)),
                    )
                })?;
            println!(
                "{} Protocol address {}",
                "✅".green(),
                listener_config.protocol_address
            );

            rpc::connect(&listener_config.http_url).await?;
            println!("{} HTTP node reachable", "✅".green());

            rpc::connect(&listener_config.ws_url).await?;
            println!("{} WebSocket node reachable", "✅".green());
        }
        None => {
            println!(
                "{} Listener not configured, the service would run in degraded mode",
                "⚠️".yellow()
            );
        }
    }

    println!("{}", "✅ All checks passed".green().bold());
    Ok(())
}

/// Build the contract reader when the node connection is configured.
async fn build_chain_reader(config: &Config) -> Option<Arc<dyn ChainReader>> {
    let listener_config = config.listener()?;

    let protocol_address: Address = match listener_config.protocol_address.parse() {
        Ok(address) => address,
        Err(e) => {
            error!(
                address = %listener_config.protocol_address,
                error = %e,
                "Invalid protocol address"
            );
            return None;
        }
    };

    match rpc::connect(&listener_config.http_url).await {
        Ok(provider) => Some(Arc::new(ContractReader::new(
            provider,
            protocol_address,
            Duration::from_secs(config.read_timeout_secs()),
        ))),
        Err(e) => {
            error!(error = %e, "HTTP provider unavailable, on-chain reads disabled");
            None
        }
    }
}
