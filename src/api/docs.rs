//! OpenAPI documentation for the REST API.

use utoipa::OpenApi;

use crate::api::handlers;

/// OpenAPI documentation for the REST API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::tokens::list_tokens,
        handlers::tokens::get_token,
        handlers::tokens::create_token,
        handlers::tokens::delete_token,
    ),
    components(schemas(
        crate::api::models::HealthResponse,
        crate::api::models::HealthStatus,
        crate::api::models::TokenResponse,
        crate::api::models::CreateTokenRequest,
        crate::api::models::ErrorResponse,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Tokens", description = "Allow-listed token management"),
    ),
    info(
        title = "Lending Indexer API",
        version = "0.1.0",
        description = "Off-chain mirror of lending protocol pools, loans, and allow-listed tokens",
    )
)]
pub struct ApiDoc;
