//! Integration tests for the state reconciler.
//!
//! These drive the reconciliation routines end to end against an in-memory
//! SQLite store with a scripted chain reader, verifying idempotent
//! re-delivery, pool-loan membership, and back-reference consistency.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use lending_indexer::db::create_pool;
use lending_indexer::db::repository::Repository;
use lending_indexer::error::{IndexerError, IndexerResult};
use lending_indexer::locks::EntityLocks;
use lending_indexer::normalize::NormalizedEvent;
use lending_indexer::reconcile::Reconciler;
use lending_indexer::resolver::{ChainReader, LoanSnapshot, PoolSnapshot, TokenMetadata};

const LENDER: &str = "0x00000000000000000000000000000000000000a1";
const BORROWER: &str = "0x00000000000000000000000000000000000000b2";
const LOAN_TOKEN: &str = "0x00000000000000000000000000000000000000c3";
const COLLATERAL_TOKEN: &str = "0x00000000000000000000000000000000000000d4";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

const POOL_A: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
const POOL_B: &str = "0x0000000000000000000000000000000000000000000000000000000000000002";

/// Scripted chain state served to the reconciler's read-throughs.
#[derive(Default)]
struct MockChainReader {
    pools: Mutex<HashMap<String, PoolSnapshot>>,
    loans: Mutex<HashMap<String, LoanSnapshot>>,
    tokens: Mutex<HashMap<String, TokenMetadata>>,
    metadata_calls: AtomicUsize,
}

impl MockChainReader {
    fn with_pool(self, pool_id: &str, snapshot: PoolSnapshot) -> Self {
        self.pools.lock().unwrap().insert(pool_id.to_string(), snapshot);
        self
    }

    fn with_loan(self, loan_id: &str, snapshot: LoanSnapshot) -> Self {
        self.loans.lock().unwrap().insert(loan_id.to_string(), snapshot);
        self
    }

    fn with_token(self, address: &str, metadata: TokenMetadata) -> Self {
        self.tokens
            .lock()
            .unwrap()
            .insert(address.to_string(), metadata);
        self
    }
}

impl ChainReader for MockChainReader {
    fn pool_snapshot(&self, pool_id: String) -> BoxFuture<'_, IndexerResult<PoolSnapshot>> {
        async move {
            self.pools
                .lock()
                .unwrap()
                .get(&pool_id)
                .cloned()
                .ok_or_else(|| {
                    IndexerError::contract_read(format!("no scripted pool {pool_id}"), None)
                })
        }
        .boxed()
    }

    fn loan_snapshot(&self, loan_id: String) -> BoxFuture<'_, IndexerResult<LoanSnapshot>> {
        async move {
            self.loans
                .lock()
                .unwrap()
                .get(&loan_id)
                .cloned()
                .ok_or_else(|| {
                    IndexerError::contract_read(format!("no scripted loan {loan_id}"), None)
                })
        }
        .boxed()
    }

    fn token_metadata(&self, token_address: String) -> BoxFuture<'_, IndexerResult<TokenMetadata>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        async move {
            self.tokens
                .lock()
                .unwrap()
                .get(&token_address)
                .cloned()
                .ok_or_else(|| {
                    IndexerError::contract_read(format!("no scripted token {token_address}"), None)
                })
        }
        .boxed()
    }
}

fn pool_snapshot() -> PoolSnapshot {
    PoolSnapshot {
        lender: LENDER.into(),
        loan_token: LOAN_TOKEN.into(),
        collateral_token: COLLATERAL_TOKEN.into(),
        min_loan_size: "1000000000000000000".into(),
        pool_balance: "50000000000000000000".into(),
        max_loan_ratio: 7500,
        auction_length: 86400,
        interest_rate: 500,
        outstanding_loans: 0,
    }
}

fn loan_snapshot() -> LoanSnapshot {
    LoanSnapshot {
        lender: LENDER.into(),
        borrower: BORROWER.into(),
        loan_token: LOAN_TOKEN.into(),
        collateral_token: COLLATERAL_TOKEN.into(),
        debt: "2000000000000000000".into(),
        collateral: "4000000000000000000".into(),
        interest_rate: 500,
        auction_start_timestamp: 0,
        loan_start_timestamp: 1_700_000_000,
        auction_length: 86400,
    }
}

async fn setup(reader: MockChainReader) -> (Reconciler, Repository, Arc<MockChainReader>) {
    let pool = create_pool("sqlite::memory:")
        .await
        .expect("in-memory store");
    let repository = Repository::new(pool);
    let reader = Arc::new(reader);
    let reconciler = Reconciler::new(
        repository.clone(),
        Arc::<MockChainReader>::clone(&reader) as Arc<dyn ChainReader>,
        Arc::new(EntityLocks::new()),
    );
    (reconciler, repository, reader)
}

fn pool_created(pool_id: &str) -> NormalizedEvent {
    NormalizedEvent::PoolCreated {
        pool_id: pool_id.into(),
        lender: LENDER.into(),
        created_at: 1_700_000_000,
    }
}

fn loan_created(pool_id: &str, loan_id: &str) -> NormalizedEvent {
    NormalizedEvent::LoanCreated {
        pool_id: pool_id.into(),
        loan_id: loan_id.into(),
        borrower: BORROWER.into(),
        created_at: 1_700_000_100,
    }
}

#[tokio::test]
async fn pool_created_inserts_pool_with_empty_membership() {
    let (reconciler, repo, _) = setup(MockChainReader::default().with_pool(POOL_A, pool_snapshot())).await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();

    let stored = repo.get_pool(POOL_A).await.unwrap().unwrap();
    assert_eq!(stored.lender, LENDER);
    assert_eq!(stored.pool_balance, "50000000000000000000");
    assert!(repo.pool_loan_ids(POOL_A).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_pool_created_does_not_overwrite() {
    let (reconciler, repo, reader) =
        setup(MockChainReader::default().with_pool(POOL_A, pool_snapshot())).await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();

    // Chain state moves on; a re-delivered creation event must not clobber
    // the stored record.
    reader.pools.lock().unwrap().get_mut(POOL_A).unwrap().pool_balance = "1".into();
    reconciler.apply(pool_created(POOL_A)).await.unwrap();

    let stored = repo.get_pool(POOL_A).await.unwrap().unwrap();
    assert_eq!(stored.pool_balance, "50000000000000000000");
}

#[tokio::test]
async fn pool_updated_refreshes_fields_but_not_membership() {
    let (reconciler, repo, reader) = setup(
        MockChainReader::default()
            .with_pool(POOL_A, pool_snapshot())
            .with_loan("7", loan_snapshot()),
    )
    .await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();
    reconciler.apply(loan_created(POOL_A, "7")).await.unwrap();

    {
        let mut pools = reader.pools.lock().unwrap();
        let snapshot = pools.get_mut(POOL_A).unwrap();
        snapshot.pool_balance = "48000000000000000000".into();
        snapshot.outstanding_loans = 1;
    }
    reconciler
        .apply(NormalizedEvent::PoolUpdated {
            pool_id: POOL_A.into(),
            updated_at: 1_700_000_200,
        })
        .await
        .unwrap();

    let stored = repo.get_pool(POOL_A).await.unwrap().unwrap();
    assert_eq!(stored.pool_balance, "48000000000000000000");
    assert_eq!(stored.outstanding_loans, 1);
    assert_eq!(stored.updated_at, 1_700_000_200);
    assert_eq!(repo.pool_loan_ids(POOL_A).await.unwrap(), vec!["7"]);
}

#[tokio::test]
async fn pool_updated_for_unknown_pool_is_rejected() {
    let (reconciler, repo, _) =
        setup(MockChainReader::default().with_pool(POOL_A, pool_snapshot())).await;

    let err = reconciler
        .apply(NormalizedEvent::PoolUpdated {
            pool_id: POOL_A.into(),
            updated_at: 1_700_000_200,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, IndexerError::PoolNotFound { .. }));
    assert!(repo.get_pool(POOL_A).await.unwrap().is_none());
}

#[tokio::test]
async fn loan_created_adds_membership_exactly_once() {
    let (reconciler, repo, _) = setup(
        MockChainReader::default()
            .with_pool(POOL_A, pool_snapshot())
            .with_loan("7", loan_snapshot()),
    )
    .await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();
    reconciler.apply(loan_created(POOL_A, "7")).await.unwrap();
    // Re-delivery of the same event.
    reconciler.apply(loan_created(POOL_A, "7")).await.unwrap();

    assert_eq!(repo.pool_loan_ids(POOL_A).await.unwrap(), vec!["7"]);
    let stored = repo.get_loan("7").await.unwrap().unwrap();
    assert_eq!(stored.pool_id, POOL_A);
    assert_eq!(stored.borrower, BORROWER);
    assert_eq!(stored.debt, "2000000000000000000");
}

#[tokio::test]
async fn orphan_loan_created_is_dropped() {
    let (reconciler, repo, _) =
        setup(MockChainReader::default().with_loan("7", loan_snapshot())).await;

    let err = reconciler
        .apply(loan_created(POOL_A, "7"))
        .await
        .unwrap_err();

    assert!(matches!(err, IndexerError::PoolNotFound { .. }));
    assert!(repo.get_loan("7").await.unwrap().is_none());
    assert!(repo.pool_loan_ids(POOL_A).await.unwrap().is_empty());
}

#[tokio::test]
async fn loan_updated_refreshes_without_touching_back_reference() {
    let (reconciler, repo, reader) = setup(
        MockChainReader::default()
            .with_pool(POOL_A, pool_snapshot())
            .with_loan("7", loan_snapshot()),
    )
    .await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();
    reconciler.apply(loan_created(POOL_A, "7")).await.unwrap();

    reader.loans.lock().unwrap().get_mut("7").unwrap().debt = "1500000000000000000".into();
    reconciler
        .apply(NormalizedEvent::LoanUpdated {
            loan_id: "7".into(),
            updated_at: 1_700_000_300,
        })
        .await
        .unwrap();

    let stored = repo.get_loan("7").await.unwrap().unwrap();
    assert_eq!(stored.debt, "1500000000000000000");
    assert_eq!(stored.pool_id, POOL_A);
}

#[tokio::test]
async fn loan_updated_for_unknown_loan_is_rejected() {
    let (reconciler, _, _) =
        setup(MockChainReader::default().with_loan("7", loan_snapshot())).await;

    let err = reconciler
        .apply(NormalizedEvent::LoanUpdated {
            loan_id: "7".into(),
            updated_at: 1_700_000_300,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, IndexerError::LoanNotFound { .. }));
}

#[tokio::test]
async fn loan_lender_changed_keeps_back_reference_consistent() {
    let (reconciler, repo, _) = setup(
        MockChainReader::default()
            .with_pool(POOL_A, pool_snapshot())
            .with_pool(POOL_B, pool_snapshot())
            .with_loan("7", loan_snapshot()),
    )
    .await;

    reconciler.apply(pool_created(POOL_A)).await.unwrap();
    reconciler.apply(pool_created(POOL_B)).await.unwrap();
    reconciler.apply(loan_created(POOL_A, "7")).await.unwrap();

    let transfer = NormalizedEvent::LoanLenderChanged {
        loan_id: "7".into(),
        old_pool_id: POOL_A.into(),
        new_pool_id: POOL_B.into(),
    };
    reconciler.apply(transfer.clone()).await.unwrap();

    assert!(repo.pool_loan_ids(POOL_A).await.unwrap().is_empty());
    assert_eq!(repo.pool_loan_ids(POOL_B).await.unwrap(), vec!["7"]);
    assert_eq!(repo.get_loan("7").await.unwrap().unwrap().pool_id, POOL_B);

    // Re-delivery leaves the store unchanged.
    reconciler.apply(transfer).await.unwrap();
    assert_eq!(repo.pool_loan_ids(POOL_B).await.unwrap(), vec!["7"]);
}

#[tokio::test]
async fn allow_list_insert_then_toggle() {
    let token = "0x00000000000000000000000000000000000000e5";
    let (reconciler, repo, reader) = setup(MockChainReader::default().with_token(
        token,
        TokenMetadata {
            name: "USD Coin".into(),
            symbol: "usdc".into(),
            decimals: 6,
        },
    ))
    .await;

    reconciler
        .apply(NormalizedEvent::TokenAllowListUpdated {
            token_address: token.into(),
            is_allowed: true,
            updated_at: 1_700_000_000,
        })
        .await
        .unwrap();

    let stored = repo.get_token(token).await.unwrap().unwrap();
    assert!(stored.is_allowed);
    assert_eq!(stored.token_symbol, "USDC");
    assert_eq!(stored.token_decimals, 6);
    assert_eq!(reader.metadata_calls.load(Ordering::SeqCst), 1);

    // Toggling off updates in place without another metadata read.
    reconciler
        .apply(NormalizedEvent::TokenAllowListUpdated {
            token_address: token.into(),
            is_allowed: false,
            updated_at: 1_700_000_500,
        })
        .await
        .unwrap();

    let stored = repo.get_token(token).await.unwrap().unwrap();
    assert!(!stored.is_allowed);
    assert_eq!(stored.updated_at, 1_700_000_500);
    assert_eq!(reader.metadata_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn incomplete_pool_snapshot_is_rejected() {
    let mut snapshot = pool_snapshot();
    snapshot.lender = ZERO_ADDRESS.into();
    let (reconciler, repo, _) =
        setup(MockChainReader::default().with_pool(POOL_A, snapshot)).await;

    let err = reconciler.apply(pool_created(POOL_A)).await.unwrap_err();

    assert!(matches!(err, IndexerError::IncompletePoolData { .. }));
    assert!(repo.get_pool(POOL_A).await.unwrap().is_none());
}

#[tokio::test]
async fn read_through_failure_leaves_store_untouched() {
    // No scripted pool: the read-through fails.
    let (reconciler, repo, _) = setup(MockChainReader::default()).await;

    let err = reconciler.apply(pool_created(POOL_A)).await.unwrap_err();

    assert!(matches!(err, IndexerError::ContractReadError { .. }));
    assert!(repo.get_pool(POOL_A).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_loan_creations_serialize_on_the_pool() {
    let (reconciler, repo, _) = setup(
        MockChainReader::default()
            .with_pool(POOL_A, pool_snapshot())
            .with_loan("7", loan_snapshot())
            .with_loan("8", loan_snapshot()),
    )
    .await;
    reconciler.apply(pool_created(POOL_A)).await.unwrap();

    let reconciler = Arc::new(reconciler);
    let a = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.apply(loan_created(POOL_A, "7")).await })
    };
    let b = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.apply(loan_created(POOL_A, "8")).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let mut loans = repo.pool_loan_ids(POOL_A).await.unwrap();
    loans.sort();
    assert_eq!(loans, vec!["7", "8"]);
}
