//! Repository pattern for database operations.
//!
//! Provides the entity operations the reconciler and the REST API build on:
//! allow-list upserts, pool/loan inserts and refreshes, and the pool-loan
//! membership set. Insert-if-absent operations use `INSERT OR IGNORE` so
//! duplicate event delivery never overwrites existing state.

use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::{AllowedTokenRecord, LoanRecord, PoolRecord};
use crate::error::IndexerError;
use crate::resolver::{LoanSnapshot, PoolSnapshot};

/// Repository for database operations.
///
/// Wraps a SQLite connection pool and provides type-safe methods
/// for all database interactions.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Cheap liveness probe used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] if the pool cannot serve a
    /// trivial query.
    pub async fn health_check(&self) -> Result<(), IndexerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Database health check failed".to_string(), Some(Box::new(e)))
            })?;
        Ok(())
    }

    // ==================== ALLOWED TOKEN OPERATIONS ====================

    /// Retrieves an allow-listed token by address.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn get_token(
        &self,
        token_address: &str,
    ) -> Result<Option<AllowedTokenRecord>, IndexerError> {
        let token = sqlx::query_as::<_, AllowedTokenRecord>(
            "SELECT * FROM allowed_tokens WHERE token_address = ?",
        )
        .bind(token_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to query token".to_string(), Some(Box::new(e)))
        })?;

        Ok(token)
    }

    /// Lists all allow-listed tokens, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn list_tokens(&self) -> Result<Vec<AllowedTokenRecord>, IndexerError> {
        let tokens = sqlx::query_as::<_, AllowedTokenRecord>(
            "SELECT * FROM allowed_tokens ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to list tokens".to_string(), Some(Box::new(e)))
        })?;

        Ok(tokens)
    }

    /// Inserts a new allow-listed token record.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on insert failure, including
    /// an already-existing address.
    #[instrument(skip(self, record), fields(token_address = %record.token_address))]
    pub async fn insert_token(&self, record: &AllowedTokenRecord) -> Result<(), IndexerError> {
        sqlx::query(
            r#"
            INSERT INTO allowed_tokens (
                token_address, token_name, token_symbol, token_decimals,
                is_allowed, updated_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.token_address)
        .bind(&record.token_name)
        .bind(&record.token_symbol)
        .bind(record.token_decimals)
        .bind(record.is_allowed)
        .bind(record.updated_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to insert token".to_string(), Some(Box::new(e)))
        })?;

        debug!("Inserted allow-listed token");
        Ok(())
    }

    /// Updates the allow flag on an existing token.
    ///
    /// Returns `false` if no record exists for the address.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on update failure.
    pub async fn set_token_allowed(
        &self,
        token_address: &str,
        is_allowed: bool,
        updated_at: i64,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "UPDATE allowed_tokens SET is_allowed = ?, updated_at = ? WHERE token_address = ?",
        )
        .bind(is_allowed)
        .bind(updated_at)
        .bind(token_address)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database(
                "Failed to update token allow flag".to_string(),
                Some(Box::new(e)),
            )
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a token record.
    ///
    /// Returns `false` if no record existed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on delete failure.
    pub async fn delete_token(&self, token_address: &str) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM allowed_tokens WHERE token_address = ?")
            .bind(token_address)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Failed to delete token".to_string(), Some(Box::new(e)))
            })?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== POOL OPERATIONS ====================

    /// Retrieves a pool by its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn get_pool(&self, pool_id: &str) -> Result<Option<PoolRecord>, IndexerError> {
        let pool = sqlx::query_as::<_, PoolRecord>("SELECT * FROM pools WHERE pool_id = ?")
            .bind(pool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Failed to query pool".to_string(), Some(Box::new(e)))
            })?;

        Ok(pool)
    }

    /// Whether a pool with the given identifier exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn pool_exists(&self, pool_id: &str) -> Result<bool, IndexerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM pools WHERE pool_id = ?")
            .bind(pool_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database(
                    "Failed to query pool existence".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        Ok(row.is_some())
    }

    /// Inserts a pool if no record with its id exists.
    ///
    /// Returns `true` if the row was inserted, `false` if a pool with this
    /// id was already present (duplicate delivery; existing state is left
    /// untouched).
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on insert failure.
    #[instrument(skip(self, record), fields(pool_id = %record.pool_id))]
    pub async fn insert_pool_if_absent(&self, record: &PoolRecord) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO pools (
                pool_id, lender, loan_token, collateral_token, min_loan_size,
                pool_balance, max_loan_ratio, auction_length, interest_rate,
                outstanding_loans, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.pool_id)
        .bind(&record.lender)
        .bind(&record.loan_token)
        .bind(&record.collateral_token)
        .bind(&record.min_loan_size)
        .bind(&record.pool_balance)
        .bind(record.max_loan_ratio)
        .bind(record.auction_length)
        .bind(record.interest_rate)
        .bind(record.outstanding_loans)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to insert pool".to_string(), Some(Box::new(e)))
        })?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!("Inserted pool");
        }
        Ok(inserted)
    }

    /// Refreshes the mutable fields of an existing pool from a snapshot.
    ///
    /// Membership and `created_at` are untouched. Returns `false` if no
    /// pool with the id exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on update failure.
    pub async fn refresh_pool(
        &self,
        pool_id: &str,
        snapshot: &PoolSnapshot,
        updated_at: i64,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            r#"
            UPDATE pools SET
                lender = ?, loan_token = ?, collateral_token = ?,
                min_loan_size = ?, pool_balance = ?, max_loan_ratio = ?,
                auction_length = ?, interest_rate = ?, outstanding_loans = ?,
                updated_at = ?
            WHERE pool_id = ?
            "#,
        )
        .bind(&snapshot.lender)
        .bind(&snapshot.loan_token)
        .bind(&snapshot.collateral_token)
        .bind(&snapshot.min_loan_size)
        .bind(&snapshot.pool_balance)
        .bind(i64::try_from(snapshot.max_loan_ratio).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.auction_length).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.interest_rate).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.outstanding_loans).unwrap_or(i64::MAX))
        .bind(updated_at)
        .bind(pool_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to refresh pool".to_string(), Some(Box::new(e)))
        })?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== POOL MEMBERSHIP OPERATIONS ====================

    /// Whether a pool's loan set contains the given loan id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn pool_contains_loan(
        &self,
        pool_id: &str,
        loan_id: &str,
    ) -> Result<bool, IndexerError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM pool_loans WHERE pool_id = ? AND loan_id = ?")
                .bind(pool_id)
                .bind(loan_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    IndexerError::database(
                        "Failed to query pool membership".to_string(),
                        Some(Box::new(e)),
                    )
                })?;

        Ok(row.is_some())
    }

    /// Adds a loan to a pool's loan set if not already present.
    ///
    /// Returns `true` if membership was added. The composite primary key
    /// makes re-insertion a no-op, so delivery races cannot duplicate an
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on insert failure.
    pub async fn add_pool_loan(&self, pool_id: &str, loan_id: &str) -> Result<bool, IndexerError> {
        let result =
            sqlx::query("INSERT OR IGNORE INTO pool_loans (pool_id, loan_id) VALUES (?, ?)")
                .bind(pool_id)
                .bind(loan_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    IndexerError::database(
                        "Failed to add pool membership".to_string(),
                        Some(Box::new(e)),
                    )
                })?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes a loan from a pool's loan set.
    ///
    /// Returns `false` if the loan was not a member.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on delete failure.
    pub async fn remove_pool_loan(
        &self,
        pool_id: &str,
        loan_id: &str,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM pool_loans WHERE pool_id = ? AND loan_id = ?")
            .bind(pool_id)
            .bind(loan_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database(
                    "Failed to remove pool membership".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists a pool's loan ids in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn pool_loan_ids(&self, pool_id: &str) -> Result<Vec<String>, IndexerError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT loan_id FROM pool_loans WHERE pool_id = ? ORDER BY rowid")
                .bind(pool_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    IndexerError::database(
                        "Failed to list pool membership".to_string(),
                        Some(Box::new(e)),
                    )
                })?;

        Ok(rows.into_iter().map(|(loan_id,)| loan_id).collect())
    }

    // ==================== LOAN OPERATIONS ====================

    /// Retrieves a loan by its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on query failure.
    pub async fn get_loan(&self, loan_id: &str) -> Result<Option<LoanRecord>, IndexerError> {
        let loan = sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE loan_id = ?")
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database("Failed to query loan".to_string(), Some(Box::new(e)))
            })?;

        Ok(loan)
    }

    /// Inserts a loan if no record with its id exists.
    ///
    /// Returns `true` if the row was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on insert failure.
    #[instrument(skip(self, record), fields(loan_id = %record.loan_id, pool_id = %record.pool_id))]
    pub async fn insert_loan_if_absent(&self, record: &LoanRecord) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO loans (
                loan_id, pool_id, lender, borrower, loan_token, collateral_token,
                debt, collateral, interest_rate, auction_start_timestamp,
                loan_start_timestamp, auction_length, is_loan_paid,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.loan_id)
        .bind(&record.pool_id)
        .bind(&record.lender)
        .bind(&record.borrower)
        .bind(&record.loan_token)
        .bind(&record.collateral_token)
        .bind(&record.debt)
        .bind(&record.collateral)
        .bind(record.interest_rate)
        .bind(record.auction_start_timestamp)
        .bind(record.loan_start_timestamp)
        .bind(record.auction_length)
        .bind(record.is_loan_paid)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to insert loan".to_string(), Some(Box::new(e)))
        })?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!("Inserted loan");
        }
        Ok(inserted)
    }

    /// Refreshes the mutable fields of an existing loan from a snapshot.
    ///
    /// The owning-pool back-reference is untouched. Returns `false` if no
    /// loan with the id exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on update failure.
    pub async fn refresh_loan(
        &self,
        loan_id: &str,
        snapshot: &LoanSnapshot,
        updated_at: i64,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET
                lender = ?, borrower = ?, loan_token = ?, collateral_token = ?,
                debt = ?, collateral = ?, interest_rate = ?,
                auction_start_timestamp = ?, auction_length = ?, updated_at = ?
            WHERE loan_id = ?
            "#,
        )
        .bind(&snapshot.lender)
        .bind(&snapshot.borrower)
        .bind(&snapshot.loan_token)
        .bind(&snapshot.collateral_token)
        .bind(&snapshot.debt)
        .bind(&snapshot.collateral)
        .bind(i64::try_from(snapshot.interest_rate).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.auction_start_timestamp).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.auction_length).unwrap_or(i64::MAX))
        .bind(updated_at)
        .bind(loan_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            IndexerError::database("Failed to refresh loan".to_string(), Some(Box::new(e)))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Updates a loan's owning-pool back-reference.
    ///
    /// Returns `false` if no loan with the id exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DatabaseError`] on update failure.
    pub async fn set_loan_pool(
        &self,
        loan_id: &str,
        new_pool_id: &str,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query("UPDATE loans SET pool_id = ? WHERE loan_id = ?")
            .bind(new_pool_id)
            .bind(loan_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                IndexerError::database(
                    "Failed to update loan pool reference".to_string(),
                    Some(Box::new(e)),
                )
            })?;

        Ok(result.rows_affected() > 0)
    }
}
