//! Shared application state for the API server.

use std::sync::{atomic::AtomicBool, Arc};
use std::time::SystemTime;

use crate::db::repository::Repository;
use crate::resolver::ChainReader;

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository for database access.
    pub repository: Arc<Repository>,
    /// Chain reader for on-chain metadata lookups; absent when the process
    /// runs without a node connection.
    pub reader: Option<Arc<dyn ChainReader>>,
    /// WebSocket connection status flag.
    pub ws_connected: Arc<AtomicBool>,
    /// Application start time for uptime tracking.
    pub start_time: SystemTime,
}

impl AppState {
    /// Create a new AppState instance.
    #[must_use]
    pub fn new(repository: Repository, reader: Option<Arc<dyn ChainReader>>) -> Self {
        Self {
            repository: Arc::new(repository),
            reader,
            ws_connected: Arc::new(AtomicBool::new(false)),
            start_time: SystemTime::now(),
        }
    }
}
