//! RPC provider management for blockchain node connections.
//!
//! Two connections are held per process: an HTTP(S) provider for read-through
//! contract queries and a WebSocket provider for the log subscription. Both
//! are built through Alloy's `ProviderBuilder` and are owned by explicit
//! handle values ([`crate::resolver::ContractReader`] and
//! [`crate::supervisor::EventListener`]); there is no ambient global state.

use crate::error::{IndexerError, IndexerResult};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::BoxTransport;
use tracing::{error, info, instrument};

/// Provider type shared by the read and subscription sides.
pub type Provider = RootProvider<BoxTransport>;

/// Scrub the endpoint URL for logging (keys are commonly path segments).
fn log_host(url: &str) -> &str {
    url.split("/v2/").next().unwrap_or("unknown")
}

/// Connect a provider to the given endpoint.
///
/// Accepts `http(s)://` and `ws(s)://` URLs; the transport is selected from
/// the scheme.
///
/// # Errors
///
/// Returns [`IndexerError::TransportError`] if the URL is invalid or the
/// connection cannot be established. Authentication failures (401) are
/// distinguishable via [`IndexerError::is_auth_failure`].
#[instrument(skip(url), fields(host = tracing::field::Empty, duration_ms = tracing::field::Empty))]
pub async fn connect(url: &str) -> IndexerResult<Provider> {
    let host = log_host(url);
    tracing::Span::current().record("host", host);

    info!(host, "Connecting RPC provider");

    let start = std::time::Instant::now();

    let provider = ProviderBuilder::new().on_builtin(url).await.map_err(|e| {
        error!(error = %e, host, "Provider connection failed");
        IndexerError::transport(format!("connection to {host} failed: {e}"), Some(Box::new(e)))
    })?;

    let duration = start.elapsed();
    tracing::Span::current().record("duration_ms", duration.as_millis() as u64);

    info!(host, duration_ms = duration.as_millis(), "Provider connected");

    Ok(provider)
}
