//! Allow-listed token endpoints.
//!
//! These write to the same store the reconciler mirrors events into; an
//! operator-added token looks identical to one picked up from the stream.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};

use crate::api::middleware::error::ApiError;
use crate::api::models::{CreateTokenRequest, TokenResponse};
use crate::app_state::AppState;
use crate::db::models::AllowedTokenRecord;

#[utoipa::path(
    get,
    path = "/api/v1/tokens",
    responses(
        (status = 200, description = "All allow-listed tokens", body = Vec<TokenResponse>)
    ),
    tag = "Tokens"
)]
/// Lists all allow-listed tokens, most recently updated first.
#[instrument(skip(state))]
pub async fn list_tokens(
    State(state): State<AppState>,
) -> Result<Json<Vec<TokenResponse>>, ApiError> {
    let tokens = state.repository.list_tokens().await?;
    Ok(Json(tokens.into_iter().map(TokenResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/tokens/{address}",
    params(("address" = String, Path, description = "Token contract address")),
    responses(
        (status = 200, description = "Token record", body = TokenResponse),
        (status = 404, description = "No record for this address")
    ),
    tag = "Tokens"
)]
/// Returns a single token record by address.
#[instrument(skip(state))]
pub async fn get_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<TokenResponse>, ApiError> {
    let address = normalize_address(&address)?;
    let token = state
        .repository
        .get_token(&address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No token record for {address}")))?;
    Ok(Json(token.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token added", body = TokenResponse),
        (status = 400, description = "Invalid address or on-chain lookup failed"),
        (status = 409, description = "Token already exists"),
        (status = 503, description = "No node connection configured")
    ),
    tag = "Tokens"
)]
/// Adds an allowed token, fetching its metadata on-chain.
#[instrument(skip(state, request), fields(token_address = %request.token_address))]
pub async fn create_token(
    State(state): State<AppState>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let address = normalize_address(&request.token_address)?;

    let reader = state
        .reader
        .as_ref()
        .ok_or(ApiError::ChainReaderUnavailable)?;

    if state.repository.get_token(&address).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Token {address} is already registered"
        )));
    }

    let metadata = reader.token_metadata(address.clone()).await?;
    let record = AllowedTokenRecord::new(
        &address,
        &metadata,
        true,
        chrono::Utc::now().timestamp(),
    );
    state.repository.insert_token(&record).await?;

    info!(token_address = %address, symbol = %record.token_symbol, "Token added via API");
    Ok((StatusCode::CREATED, Json(record.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/tokens/{address}",
    params(("address" = String, Path, description = "Token contract address")),
    responses(
        (status = 204, description = "Token removed"),
        (status = 404, description = "No record for this address")
    ),
    tag = "Tokens"
)]
/// Deletes a token record.
#[instrument(skip(state))]
pub async fn delete_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<StatusCode, ApiError> {
    let address = normalize_address(&address)?;
    if !state.repository.delete_token(&address).await? {
        return Err(ApiError::NotFound(format!("No token record for {address}")));
    }

    info!(token_address = %address, "Token removed via API");
    Ok(StatusCode::NO_CONTENT)
}

/// Addresses are stored lowercased with a 0x prefix; reject anything that
/// is not 20 hex bytes.
fn normalize_address(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.len() != 42
        || !trimmed.starts_with("0x")
        || !trimmed[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ApiError::BadRequest(format!(
            "Invalid token address: {trimmed}"
        )));
    }
    Ok(trimmed.to_lowercase())
}
