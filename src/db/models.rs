//! Database models that map to SQL tables.
//!
//! These structures represent rows in the database. Wide-integer amounts
//! (uint256) are carried as decimal strings end to end so no precision is
//! lost; addresses and pool ids stay 0x-prefixed hex.

use serde::{Deserialize, Serialize};

use crate::resolver::{LoanSnapshot, PoolSnapshot, TokenMetadata};

/// An allow-listed ERC-20 token.
///
/// Maps to the `allowed_tokens` table. The row survives the token being
/// removed from the allow list; `is_allowed` records the current state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AllowedTokenRecord {
    /// Token contract address (hex string with 0x prefix)
    pub token_address: String,
    /// Token name (e.g., "USD Coin")
    pub token_name: String,
    /// Token symbol (e.g., "USDC")
    pub token_symbol: String,
    /// Token decimal places
    pub token_decimals: i64,
    /// Whether the token is currently allowed
    pub is_allowed: bool,
    /// Unix timestamp of the last allow-list change
    pub updated_at: i64,
    /// Unix timestamp when the record was created
    pub created_at: i64,
}

impl AllowedTokenRecord {
    /// Creates a new record from fetched token metadata.
    pub fn new(
        token_address: impl Into<String>,
        metadata: &TokenMetadata,
        is_allowed: bool,
        updated_at: i64,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            token_name: metadata.name.clone(),
            token_symbol: metadata.symbol.to_uppercase(),
            token_decimals: i64::from(metadata.decimals),
            is_allowed,
            updated_at,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A lending pool.
///
/// Maps to the `pools` table. Loan membership lives in `pool_loans`, not
/// here, so membership writes stay atomic per row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PoolRecord {
    /// Pool identifier (bytes32 hex string with 0x prefix)
    pub pool_id: String,
    /// Lender address (hex string with 0x prefix)
    pub lender: String,
    /// Loan token address (hex string with 0x prefix)
    pub loan_token: String,
    /// Collateral token address (hex string with 0x prefix)
    pub collateral_token: String,
    /// Minimum loan size (decimal string, uint256 precision)
    pub min_loan_size: String,
    /// Current pool balance (decimal string, uint256 precision)
    pub pool_balance: String,
    /// Maximum loan-to-collateral ratio
    pub max_loan_ratio: i64,
    /// Auction length in seconds
    pub auction_length: i64,
    /// Interest rate (protocol basis points)
    pub interest_rate: i64,
    /// Count of loans currently outstanding
    pub outstanding_loans: i64,
    /// Unix timestamp from the creating event
    pub created_at: i64,
    /// Unix timestamp of the last refresh
    pub updated_at: i64,
}

impl PoolRecord {
    /// Creates a new pool record from an on-chain snapshot.
    pub fn from_snapshot(
        pool_id: impl Into<String>,
        snapshot: &PoolSnapshot,
        created_at: i64,
    ) -> Self {
        Self {
            pool_id: pool_id.into(),
            lender: snapshot.lender.clone(),
            loan_token: snapshot.loan_token.clone(),
            collateral_token: snapshot.collateral_token.clone(),
            min_loan_size: snapshot.min_loan_size.clone(),
            pool_balance: snapshot.pool_balance.clone(),
            max_loan_ratio: to_i64(snapshot.max_loan_ratio),
            auction_length: to_i64(snapshot.auction_length),
            interest_rate: to_i64(snapshot.interest_rate),
            outstanding_loans: to_i64(snapshot.outstanding_loans),
            created_at,
            updated_at: created_at,
        }
    }
}

/// A loan.
///
/// Maps to the `loans` table. `pool_id` is the owning-pool back-reference
/// and must always agree with `pool_loans` membership.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRecord {
    /// Loan identifier (uint256 decimal string)
    pub loan_id: String,
    /// Owning pool identifier (bytes32 hex string with 0x prefix)
    pub pool_id: String,
    /// Lender address (hex string with 0x prefix)
    pub lender: String,
    /// Borrower address (hex string with 0x prefix)
    pub borrower: String,
    /// Loan token address (hex string with 0x prefix)
    pub loan_token: String,
    /// Collateral token address (hex string with 0x prefix)
    pub collateral_token: String,
    /// Outstanding debt (decimal string, uint256 precision)
    pub debt: String,
    /// Posted collateral (decimal string, uint256 precision)
    pub collateral: String,
    /// Interest rate (protocol basis points)
    pub interest_rate: i64,
    /// Auction start timestamp (0 when no auction is running)
    pub auction_start_timestamp: i64,
    /// Loan origination timestamp
    pub loan_start_timestamp: i64,
    /// Auction length in seconds
    pub auction_length: i64,
    /// Whether the loan has been fully repaid
    pub is_loan_paid: bool,
    /// Unix timestamp from the creating event
    pub created_at: i64,
    /// Unix timestamp of the last refresh
    pub updated_at: i64,
}

impl LoanRecord {
    /// Creates a new loan record from an on-chain snapshot.
    pub fn from_snapshot(
        loan_id: impl Into<String>,
        pool_id: impl Into<String>,
        snapshot: &LoanSnapshot,
        created_at: i64,
    ) -> Self {
        Self {
            loan_id: loan_id.into(),
            pool_id: pool_id.into(),
            lender: snapshot.lender.clone(),
            borrower: snapshot.borrower.clone(),
            loan_token: snapshot.loan_token.clone(),
            collateral_token: snapshot.collateral_token.clone(),
            debt: snapshot.debt.clone(),
            collateral: snapshot.collateral.clone(),
            interest_rate: to_i64(snapshot.interest_rate),
            auction_start_timestamp: to_i64(snapshot.auction_start_timestamp),
            loan_start_timestamp: to_i64(snapshot.loan_start_timestamp),
            auction_length: to_i64(snapshot.auction_length),
            is_loan_paid: false,
            created_at,
            updated_at: created_at,
        }
    }
}

/// SQLite INTEGER is signed; saturate rather than wrap on the (unreachable
/// in practice) overflow.
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_token_symbol_uppercased() {
        let record = AllowedTokenRecord::new(
            "0x00000000000000000000000000000000000000aa",
            &TokenMetadata {
                name: "USD Coin".into(),
                symbol: "usdc".into(),
                decimals: 6,
            },
            true,
            1_700_000_000,
        );

        assert_eq!(record.token_symbol, "USDC");
        assert_eq!(record.token_decimals, 6);
        assert!(record.is_allowed);
    }

    #[test]
    fn test_pool_record_preserves_decimal_strings() {
        let snapshot = PoolSnapshot {
            lender: "0x0000000000000000000000000000000000000001".into(),
            loan_token: "0x0000000000000000000000000000000000000002".into(),
            collateral_token: "0x0000000000000000000000000000000000000003".into(),
            min_loan_size: "340282366920938463463374607431768211456".into(),
            pool_balance: "115792089237316195423570985008687907853".into(),
            max_loan_ratio: 7500,
            auction_length: 86400,
            interest_rate: 500,
            outstanding_loans: 2,
        };

        let record = PoolRecord::from_snapshot("0x01", &snapshot, 1_700_000_000);
        assert_eq!(record.min_loan_size, snapshot.min_loan_size);
        assert_eq!(record.pool_balance, snapshot.pool_balance);
        assert_eq!(record.updated_at, record.created_at);
    }

    #[test]
    fn test_to_i64_saturates() {
        assert_eq!(to_i64(u64::MAX), i64::MAX);
        assert_eq!(to_i64(42), 42);
    }
}
