//! Integration tests for the token endpoints.
//!
//! Handlers are invoked directly with their extractors against an in-memory
//! store, the same store the reconciler writes, so an operator-added token
//! and a stream-discovered one go through identical persistence.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use lending_indexer::api::handlers::tokens::{
    create_token, delete_token, get_token, list_tokens,
};
use lending_indexer::api::middleware::error::ApiError;
use lending_indexer::api::models::CreateTokenRequest;
use lending_indexer::app_state::AppState;
use lending_indexer::db::create_pool;
use lending_indexer::db::repository::Repository;
use lending_indexer::error::{IndexerError, IndexerResult};
use lending_indexer::resolver::{ChainReader, LoanSnapshot, PoolSnapshot, TokenMetadata};

const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

/// Serves one scripted token; pool and loan reads are never expected here.
struct MetadataOnlyReader {
    address: String,
    metadata: TokenMetadata,
}

impl ChainReader for MetadataOnlyReader {
    fn pool_snapshot(&self, pool_id: String) -> BoxFuture<'_, IndexerResult<PoolSnapshot>> {
        async move {
            Err(IndexerError::contract_read(
                format!("unexpected pool read {pool_id}"),
                None,
            ))
        }
        .boxed()
    }

    fn loan_snapshot(&self, loan_id: String) -> BoxFuture<'_, IndexerResult<LoanSnapshot>> {
        async move {
            Err(IndexerError::contract_read(
                format!("unexpected loan read {loan_id}"),
                None,
            ))
        }
        .boxed()
    }

    fn token_metadata(&self, address: String) -> BoxFuture<'_, IndexerResult<TokenMetadata>> {
        async move {
            if address == self.address {
                Ok(self.metadata.clone())
            } else {
                Err(IndexerError::contract_read(
                    format!("no scripted token {address}"),
                    None,
                ))
            }
        }
        .boxed()
    }
}

async fn state_with_reader(reader: Option<Arc<dyn ChainReader>>) -> AppState {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    AppState::new(Repository::new(pool), reader)
}

fn usdc_reader() -> Arc<dyn ChainReader> {
    Arc::new(MetadataOnlyReader {
        address: USDC.to_string(),
        metadata: TokenMetadata {
            name: "USD Coin".to_string(),
            symbol: "usdc".to_string(),
            decimals: 6,
        },
    })
}

#[tokio::test]
async fn test_token_crud_round_trip() {
    let state = state_with_reader(Some(usdc_reader())).await;

    let (status, Json(created)) = create_token(
        State(state.clone()),
        Json(CreateTokenRequest {
            token_address: USDC.to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.token_symbol, "USDC");
    assert_eq!(created.token_decimals, 6);
    assert!(created.is_allowed);

    let Json(fetched) = get_token(State(state.clone()), Path(USDC.to_string()))
        .await
        .unwrap();
    assert_eq!(fetched.token_address, USDC);
    assert_eq!(fetched.token_name, "USD Coin");

    let Json(listed) = list_tokens(State(state.clone())).await.unwrap();
    assert_eq!(listed.len(), 1);

    let status = delete_token(State(state.clone()), Path(USDC.to_string()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let Json(listed) = list_tokens(State(state)).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_create_token_uppercase_address_is_normalized() {
    let state = state_with_reader(Some(usdc_reader())).await;

    let (_, Json(created)) = create_token(
        State(state.clone()),
        Json(CreateTokenRequest {
            token_address: USDC.to_uppercase().replace("0X", "0x"),
        }),
    )
    .await
    .unwrap();
    assert_eq!(created.token_address, USDC);

    // Mixed-case lookups resolve to the same record.
    let fetched = get_token(State(state), Path(USDC.to_uppercase().replace("0X", "0x"))).await;
    assert!(fetched.is_ok());
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let state = state_with_reader(Some(usdc_reader())).await;

    let request = || {
        Json(CreateTokenRequest {
            token_address: USDC.to_string(),
        })
    };
    create_token(State(state.clone()), request()).await.unwrap();

    let second = create_token(State(state), request()).await;
    assert!(matches!(second, Err(ApiError::Conflict(_))));
}

#[tokio::test]
async fn test_create_without_chain_reader_is_unavailable() {
    let state = state_with_reader(None).await;

    let result = create_token(
        State(state),
        Json(CreateTokenRequest {
            token_address: USDC.to_string(),
        }),
    )
    .await;
    assert!(matches!(result, Err(ApiError::ChainReaderUnavailable)));
}

#[tokio::test]
async fn test_missing_token_is_not_found() {
    let state = state_with_reader(None).await;

    let fetched = get_token(State(state.clone()), Path(USDC.to_string())).await;
    assert!(matches!(fetched, Err(ApiError::NotFound(_))));

    let deleted = delete_token(State(state), Path(USDC.to_string())).await;
    assert!(matches!(deleted, Err(ApiError::NotFound(_))));
}
