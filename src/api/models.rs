//! API request and response models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::AllowedTokenRecord;

/// Overall or per-component health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components operational
    Healthy,
    /// Serving requests but the event stream is down
    Degraded,
    /// Database unavailable
    Unhealthy,
}

/// API response for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Aggregate service status
    pub status: HealthStatus,
    /// Crate version
    pub version: String,
    /// Seconds since process start
    pub uptime_seconds: u64,
    /// Database component status
    pub database_status: HealthStatus,
    /// Event stream component status
    pub websocket_status: HealthStatus,
}

/// An allow-listed token as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// Token contract address (hex string with 0x prefix)
    pub token_address: String,
    /// Token name
    pub token_name: String,
    /// Token symbol
    pub token_symbol: String,
    /// Token decimal places
    pub token_decimals: i64,
    /// Whether the token is currently allowed
    pub is_allowed: bool,
    /// Unix timestamp of the last allow-list change
    pub updated_at: i64,
}

impl From<AllowedTokenRecord> for TokenResponse {
    fn from(record: AllowedTokenRecord) -> Self {
        Self {
            token_address: record.token_address,
            token_name: record.token_name,
            token_symbol: record.token_symbol,
            token_decimals: record.token_decimals,
            is_allowed: record.is_allowed,
            updated_at: record.updated_at,
        }
    }
}

/// Request body for adding an allowed token.
///
/// Name, symbol, and decimals are fetched on-chain, not supplied by the
/// caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTokenRequest {
    /// Token contract address (hex string with 0x prefix)
    pub token_address: String,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
