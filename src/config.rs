//! Configuration management for the lending-protocol indexer.
//!
//! This module handles loading and validating configuration from environment
//! variables using the `dotenvy` crate. All operations return
//! [`IndexerResult`] for comprehensive error handling.
//!
//! ## Environment Variables
//!
//! Listener (all three required for event ingestion; when any is absent the
//! process runs in degraded mode, serving the REST surface only):
//! - `RPC_WS_URL`: WebSocket endpoint of the blockchain node
//! - `RPC_HTTP_URL`: HTTP endpoint used for read-through contract queries
//! - `PROTOCOL_ADDRESS`: lending protocol contract address
//!
//! Optional (with defaults):
//! - `DATABASE_URL`: SQLite connection string (default: "sqlite:./indexer.db")
//! - `API_PORT`: REST API port (default: 3000)
//! - `RATE_LIMIT_RPM`: API rate limit, requests per minute (default: 120)
//! - `CORS_ORIGINS`: comma-separated allowed origins (default: "*")
//! - `READ_TIMEOUT_SECS`: read-through call timeout (default: 10)
//! - `EVENT_QUEUE_CAPACITY`: bounded event channel size (default: 256)
//!
//! ## Example
//!
//! ```no_run
//! use lending_indexer::config::Config;
//! use lending_indexer::error::IndexerResult;
//!
//! # fn main() -> IndexerResult<()> {
//! let config = Config::from_env()?;
//! println!("Database: {}", config.database_url());
//! # Ok(())
//! # }
//! ```

use crate::error::{IndexerError, IndexerResult};
use std::env;

/// Connection parameters for the event listener.
///
/// Grouped separately because all three must be present for the listener to
/// start; a partially configured listener is treated as unconfigured.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// WebSocket endpoint for the log subscription
    pub ws_url: String,
    /// HTTP endpoint for read-through contract calls
    pub http_url: String,
    /// Lending protocol contract address (0x + 40 hex chars)
    pub protocol_address: String,
}

/// Main configuration struct for the indexer.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string
    database_url: String,

    /// Listener connection parameters, when fully configured
    listener: Option<ListenerConfig>,

    /// REST API port
    api_port: u16,

    /// API rate limit (requests per minute)
    rate_limit_rpm: u32,

    /// Allowed CORS origins
    cors_origins: Vec<String>,

    /// Read-through call timeout in seconds
    read_timeout_secs: u64,

    /// Bounded event channel capacity
    event_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This function:
    /// 1. Loads `.env` using `dotenvy` (if present)
    /// 2. Reads and validates all environment variables
    /// 3. Applies defaults for optional variables
    ///
    /// Missing listener variables are not an error here: the listener
    /// parameters come back as `None` and [`crate::supervisor::EventListener::open`]
    /// reports the `ConfigError`, so the process can still serve the API.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable that is present has an invalid value
    /// (non-numeric port, malformed contract address, and so on).
    pub fn from_env() -> IndexerResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./indexer.db".to_string());

        let ws_url = env::var("RPC_WS_URL").ok().filter(|v| !v.is_empty());
        let http_url = env::var("RPC_HTTP_URL").ok().filter(|v| !v.is_empty());
        let protocol_address = env::var("PROTOCOL_ADDRESS").ok().filter(|v| !v.is_empty());

        if let Some(ref addr) = protocol_address {
            if !addr.starts_with("0x") || addr.len() != 42 {
                return Err(IndexerError::config(
                    format!(
                        "PROTOCOL_ADDRESS must be a valid contract address (0x + 40 hex chars), got: {addr}"
                    ),
                    None,
                ));
            }
        }

        if let Some(ref url) = ws_url {
            if !url.starts_with("ws") {
                return Err(IndexerError::config(
                    format!("RPC_WS_URL must be a ws:// or wss:// URL, got: {url}"),
                    None,
                ));
            }
        }

        let listener = match (ws_url, http_url, protocol_address) {
            (Some(ws_url), Some(http_url), Some(protocol_address)) => Some(ListenerConfig {
                ws_url,
                http_url,
                protocol_address,
            }),
            _ => None,
        };

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| {
                IndexerError::config("API_PORT must be a valid port number", Some(Box::new(e)))
            })?;

        let rate_limit_rpm = env::var("RATE_LIMIT_RPM")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u32>()
            .map_err(|e| {
                IndexerError::config("RATE_LIMIT_RPM must be a valid number", Some(Box::new(e)))
            })?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let read_timeout_secs = env::var("READ_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|e| {
                IndexerError::config(
                    "READ_TIMEOUT_SECS must be a valid number of seconds",
                    Some(Box::new(e)),
                )
            })?;

        let event_queue_capacity = env::var("EVENT_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "256".to_string())
            .parse::<usize>()
            .map_err(|e| {
                IndexerError::config(
                    "EVENT_QUEUE_CAPACITY must be a valid number",
                    Some(Box::new(e)),
                )
            })?;

        if event_queue_capacity == 0 {
            return Err(IndexerError::config(
                "EVENT_QUEUE_CAPACITY must be greater than zero",
                None,
            ));
        }

        Ok(Self {
            database_url,
            listener,
            api_port,
            rate_limit_rpm,
            cors_origins,
            read_timeout_secs,
            event_queue_capacity,
        })
    }

    /// Get the SQLite connection string.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Get the listener connection parameters, if fully configured.
    #[must_use]
    pub const fn listener(&self) -> Option<&ListenerConfig> {
        self.listener.as_ref()
    }

    /// Get the REST API port.
    #[must_use]
    pub const fn api_port(&self) -> u16 {
        self.api_port
    }

    /// Get the API rate limit in requests per minute.
    #[must_use]
    pub const fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    /// Get the allowed CORS origins.
    #[must_use]
    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }

    /// Get the read-through call timeout in seconds.
    #[must_use]
    pub const fn read_timeout_secs(&self) -> u64 {
        self.read_timeout_secs
    }

    /// Get the bounded event channel capacity.
    #[must_use]
    pub const fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    // Environment variables are process-wide and the test harness is
    // parallel, so every test holds this lock while it reads or mutates them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_and_clear_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        for var in [
            "DATABASE_URL",
            "RPC_WS_URL",
            "RPC_HTTP_URL",
            "PROTOCOL_ADDRESS",
            "API_PORT",
            "RATE_LIMIT_RPM",
            "CORS_ORIGINS",
            "READ_TIMEOUT_SECS",
            "EVENT_QUEUE_CAPACITY",
        ] {
            env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_defaults_without_listener_vars() {
        let _guard = lock_and_clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url(), "sqlite:./indexer.db");
        assert!(config.listener().is_none());
        assert_eq!(config.api_port(), 3000);
        assert_eq!(config.read_timeout_secs(), 10);
        assert_eq!(config.event_queue_capacity(), 256);
    }

    #[test]
    fn test_invalid_protocol_address() {
        let _guard = lock_and_clear_env();
        env::set_var("PROTOCOL_ADDRESS", "not_an_address");

        let result = Config::from_env();
        assert!(result.is_err());

        env::remove_var("PROTOCOL_ADDRESS");
    }

    #[test]
    fn test_partial_listener_config_is_degraded() {
        let _guard = lock_and_clear_env();
        // WS URL alone is not enough to start the listener
        env::set_var("RPC_WS_URL", "wss://example.com/ws");

        let config = Config::from_env().unwrap();
        assert!(config.listener().is_none());

        env::remove_var("RPC_WS_URL");
    }

    #[test]
    fn test_full_listener_config() {
        let _guard = lock_and_clear_env();
        env::set_var("RPC_WS_URL", "wss://example.com/ws");
        env::set_var("RPC_HTTP_URL", "https://example.com/rpc");
        env::set_var(
            "PROTOCOL_ADDRESS",
            "0x0000000000000000000000000000000000000001",
        );

        let config = Config::from_env().unwrap();
        let listener = config.listener().unwrap();
        assert_eq!(listener.ws_url, "wss://example.com/ws");
        assert_eq!(
            listener.protocol_address,
            "0x0000000000000000000000000000000000000001"
        );

        env::remove_var("RPC_WS_URL");
        env::remove_var("RPC_HTTP_URL");
        env::remove_var("PROTOCOL_ADDRESS");
    }

    #[test]
    fn test_non_ws_url_rejected() {
        let _guard = lock_and_clear_env();
        env::set_var("RPC_WS_URL", "https://example.com/rpc");

        let result = Config::from_env();
        assert!(result.is_err());

        env::remove_var("RPC_WS_URL");
    }
}
