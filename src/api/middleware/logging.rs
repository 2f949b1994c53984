//! Request logging middleware using tracing.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{info, warn};

/// Logs each request with its route template, status, and latency.
///
/// The route template (`/api/v1/tokens/:address`) is logged rather than the
/// raw path, so every token address does not become its own log key.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = route_template(&request);
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        warn!(
            method = %method,
            route,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    } else {
        info!(
            method = %method,
            route,
            status = status.as_u16(),
            duration_ms,
            "Request completed"
        );
    }

    response
}

/// Matched route template when axum recorded one, raw path otherwise
/// (requests that hit no route, like unknown paths).
fn route_template(request: &Request) -> String {
    request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_string(),
        |matched| matched.as_str().to_string(),
    )
}
