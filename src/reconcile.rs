//! Per-event reconciliation routines, one per event kind.
//!
//! Each routine reads current persisted state, computes the delta, and
//! writes it back; there is no long-lived state machine beyond "does this
//! entity already exist". Every routine runs under the entity locks for the
//! ids it touches, so two in-flight events mutating the same pool's loan
//! set are serialized and cannot lose an update.
//!
//! Re-delivery safety: creation inserts are insert-if-absent, membership
//! adds check the set first, and flag updates write the same value in
//! place. Applying any event twice leaves the store as after the first
//! application.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::db::models::{AllowedTokenRecord, LoanRecord, PoolRecord};
use crate::db::repository::Repository;
use crate::error::{IndexerError, IndexerResult};
use crate::locks::EntityLocks;
use crate::normalize::NormalizedEvent;
use crate::resolver::ChainReader;

/// Applies normalized events to the entity store.
pub struct Reconciler {
    repo: Repository,
    reader: Arc<dyn ChainReader>,
    locks: Arc<EntityLocks>,
}

impl Reconciler {
    /// Creates a reconciler over the given store, chain reader, and locks.
    #[must_use]
    pub fn new(repo: Repository, reader: Arc<dyn ChainReader>, locks: Arc<EntityLocks>) -> Self {
        Self {
            repo,
            reader,
            locks,
        }
    }

    /// Apply one event under the locks for every entity it touches.
    ///
    /// # Errors
    ///
    /// Returns the per-event error from the underlying routine; the caller
    /// (the router) logs and drops, never retries.
    pub async fn apply(&self, event: NormalizedEvent) -> IndexerResult<()> {
        let _guards = self.locks.acquire_many(&event.entity_keys()).await;

        match event {
            NormalizedEvent::TokenAllowListUpdated {
                token_address,
                is_allowed,
                updated_at,
            } => {
                self.token_allow_list_updated(&token_address, is_allowed, as_i64(updated_at))
                    .await
            }
            NormalizedEvent::PoolCreated {
                pool_id, created_at, ..
            } => self.pool_created(&pool_id, as_i64(created_at)).await,
            NormalizedEvent::PoolUpdated {
                pool_id,
                updated_at,
            } => self.pool_updated(&pool_id, as_i64(updated_at)).await,
            NormalizedEvent::LoanCreated {
                pool_id,
                loan_id,
                created_at,
                ..
            } => {
                self.loan_created(&pool_id, &loan_id, as_i64(created_at))
                    .await
            }
            NormalizedEvent::LoanUpdated {
                loan_id,
                updated_at,
            } => self.loan_updated(&loan_id, as_i64(updated_at)).await,
            NormalizedEvent::LoanLenderChanged {
                loan_id,
                old_pool_id,
                new_pool_id,
            } => {
                self.loan_lender_changed(&loan_id, &old_pool_id, &new_pool_id)
                    .await
            }
        }
    }

    /// Insert a token record on first sight, toggle the flag afterwards.
    #[instrument(skip(self))]
    async fn token_allow_list_updated(
        &self,
        token_address: &str,
        is_allowed: bool,
        updated_at: i64,
    ) -> IndexerResult<()> {
        if self
            .repo
            .set_token_allowed(token_address, is_allowed, updated_at)
            .await?
        {
            info!(token_address, is_allowed, "Updated token allow flag");
            return Ok(());
        }

        let metadata = self.reader.token_metadata(token_address.to_string()).await?;
        let record = AllowedTokenRecord::new(token_address, &metadata, is_allowed, updated_at);
        self.repo.insert_token(&record).await?;
        info!(
            token_address,
            symbol = %record.token_symbol,
            is_allowed,
            "Inserted allow-listed token"
        );
        Ok(())
    }

    /// Fetch the full pool struct and insert a new pool with no loans.
    #[instrument(skip(self))]
    async fn pool_created(&self, pool_id: &str, created_at: i64) -> IndexerResult<()> {
        let snapshot = self.reader.pool_snapshot(pool_id.to_string()).await?;
        snapshot.ensure_complete(pool_id)?;

        let record = PoolRecord::from_snapshot(pool_id, &snapshot, created_at);
        if self.repo.insert_pool_if_absent(&record).await? {
            info!(pool_id, lender = %record.lender, "Created pool");
        } else {
            debug!(pool_id, "Pool already exists, duplicate delivery ignored");
        }
        Ok(())
    }

    /// Refresh an existing pool's mutable fields; membership is untouched.
    #[instrument(skip(self))]
    async fn pool_updated(&self, pool_id: &str, updated_at: i64) -> IndexerResult<()> {
        if !self.repo.pool_exists(pool_id).await? {
            return Err(IndexerError::pool_not_found(pool_id));
        }

        let snapshot = self.reader.pool_snapshot(pool_id.to_string()).await?;
        snapshot.ensure_complete(pool_id)?;

        if !self.repo.refresh_pool(pool_id, &snapshot, updated_at).await? {
            return Err(IndexerError::pool_not_found(pool_id));
        }
        info!(pool_id, pool_balance = %snapshot.pool_balance, "Refreshed pool");
        Ok(())
    }

    /// Insert a new loan and add it to its pool's loan set.
    #[instrument(skip(self))]
    async fn loan_created(
        &self,
        pool_id: &str,
        loan_id: &str,
        created_at: i64,
    ) -> IndexerResult<()> {
        // Events may race ahead of pool creation under concurrent delivery.
        if !self.repo.pool_exists(pool_id).await? {
            warn!(pool_id, loan_id, "Referenced pool does not exist, dropping loan");
            return Err(IndexerError::pool_not_found(pool_id));
        }

        let snapshot = self.reader.loan_snapshot(loan_id.to_string()).await?;
        snapshot.ensure_complete(loan_id)?;

        let record = LoanRecord::from_snapshot(loan_id, pool_id, &snapshot, created_at);
        if self.repo.insert_loan_if_absent(&record).await? {
            info!(loan_id, pool_id, borrower = %record.borrower, "Created loan");
        } else {
            debug!(loan_id, "Loan already exists, duplicate delivery ignored");
        }

        // Membership check before insert keeps re-delivery from duplicating
        // the entry.
        if !self.repo.pool_contains_loan(pool_id, loan_id).await? {
            self.repo.add_pool_loan(pool_id, loan_id).await?;
            debug!(pool_id, loan_id, "Added loan to pool membership");
        }
        Ok(())
    }

    /// Refresh an existing loan's mutable fields.
    #[instrument(skip(self))]
    async fn loan_updated(&self, loan_id: &str, updated_at: i64) -> IndexerResult<()> {
        let snapshot = self.reader.loan_snapshot(loan_id.to_string()).await?;
        snapshot.ensure_complete(loan_id)?;

        if !self.repo.refresh_loan(loan_id, &snapshot, updated_at).await? {
            return Err(IndexerError::loan_not_found(loan_id));
        }
        info!(loan_id, debt = %snapshot.debt, "Refreshed loan");
        Ok(())
    }

    /// Two-sided membership transfer plus back-reference update.
    ///
    /// The three sub-steps are not atomic as a unit. A failure mid-way is
    /// logged with the loan id, both pool ids, and the sub-step that
    /// failed, so the record can be repaired by hand; there is no rollback.
    #[instrument(skip(self))]
    async fn loan_lender_changed(
        &self,
        loan_id: &str,
        old_pool_id: &str,
        new_pool_id: &str,
    ) -> IndexerResult<()> {
        let removed = self
            .repo
            .remove_pool_loan(old_pool_id, loan_id)
            .await
            .map_err(|e| transfer_step_failed(e, "remove-from-old", loan_id, old_pool_id, new_pool_id))?;
        if !removed {
            debug!(loan_id, old_pool_id, "Loan was not a member of the old pool");
        }

        let already_member = self
            .repo
            .pool_contains_loan(new_pool_id, loan_id)
            .await
            .map_err(|e| transfer_step_failed(e, "add-to-new", loan_id, old_pool_id, new_pool_id))?;
        if !already_member {
            self.repo
                .add_pool_loan(new_pool_id, loan_id)
                .await
                .map_err(|e| {
                    transfer_step_failed(e, "add-to-new", loan_id, old_pool_id, new_pool_id)
                })?;
        }

        let updated = self
            .repo
            .set_loan_pool(loan_id, new_pool_id)
            .await
            .map_err(|e| transfer_step_failed(e, "update-back-reference", loan_id, old_pool_id, new_pool_id))?;
        if !updated {
            let e = IndexerError::loan_not_found(loan_id);
            return Err(transfer_step_failed(
                e,
                "update-back-reference",
                loan_id,
                old_pool_id,
                new_pool_id,
            ));
        }

        info!(loan_id, old_pool_id, new_pool_id, "Transferred loan between pools");
        Ok(())
    }
}

/// Bind every protocol event to the reconciler.
///
/// # Errors
///
/// Returns [`IndexerError::DuplicateRegistration`] if the router already
/// has a handler for one of the events.
pub fn register_handlers(
    router: &mut crate::router::EventRouter,
    reconciler: Arc<Reconciler>,
) -> IndexerResult<()> {
    use futures_util::FutureExt;

    use crate::events::names;

    for event in [
        names::TOKEN_ALLOW_LIST_UPDATED,
        names::POOL_CREATED,
        names::POOL_UPDATED,
        names::LOAN_CREATED,
        names::LOAN_UPDATED,
        names::LOAN_LENDER_CHANGED,
    ] {
        let reconciler = Arc::clone(&reconciler);
        router.register(
            event,
            Arc::new(move |event| {
                let reconciler = Arc::clone(&reconciler);
                async move { reconciler.apply(event).await }.boxed()
            }),
        )?;
    }
    Ok(())
}

/// Record enough context on a partial transfer to support manual repair.
fn transfer_step_failed(
    error: IndexerError,
    step: &str,
    loan_id: &str,
    old_pool_id: &str,
    new_pool_id: &str,
) -> IndexerError {
    tracing::error!(
        loan_id,
        old_pool_id,
        new_pool_id,
        step,
        error = %error,
        "Loan transfer sub-step failed, store may need manual repair"
    );
    error
}

/// Event timestamps are u64 on the wire and INTEGER in SQLite.
fn as_i64(timestamp: u64) -> i64 {
    i64::try_from(timestamp).unwrap_or(i64::MAX)
}
