//! Read-through resolution of authoritative on-chain state.
//!
//! Several protocol events carry only an identifier (the emitted struct is
//! indexed, so the wire holds a hash of it, not the fields). Whenever an
//! event payload is insufficient to reconstruct entity state, the reconciler
//! reads current chain state through [`ChainReader`].
//!
//! No caching layer: each call re-reads the contract at call time, because
//! the read happens immediately after the emitting transaction and must see
//! its effects. Every call carries a timeout; a slow node surfaces as
//! [`ContractReadError`] instead of a hung pipeline.
//!
//! [`ContractReadError`]: crate::error::IndexerError::ContractReadError

use std::future::IntoFuture;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, instrument};

use crate::error::{IndexerError, IndexerResult};
use crate::events::{IERC20Metadata, ILendingProtocol};
use crate::rpc::Provider;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Authoritative pool state fetched from the contract.
///
/// Wide-integer amounts are decimal strings (never floats or fixed-width
/// integers); addresses are 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Lender address
    pub lender: String,
    /// Loan token address
    pub loan_token: String,
    /// Collateral token address
    pub collateral_token: String,
    /// Minimum loan size (decimal string)
    pub min_loan_size: String,
    /// Current pool balance (decimal string)
    pub pool_balance: String,
    /// Maximum loan-to-collateral ratio
    pub max_loan_ratio: u64,
    /// Auction length in seconds
    pub auction_length: u64,
    /// Interest rate (protocol basis points)
    pub interest_rate: u64,
    /// Count of loans currently outstanding
    pub outstanding_loans: u64,
}

impl PoolSnapshot {
    /// Verify that every semantically required field is present.
    ///
    /// A zero address in a required slot means the contract returned an
    /// empty struct (unknown id or partial state).
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::IncompletePoolData`] naming the first missing
    /// field.
    pub fn ensure_complete(&self, pool_id: &str) -> IndexerResult<()> {
        for (field, value) in [
            ("lender", &self.lender),
            ("loanToken", &self.loan_token),
            ("collateralToken", &self.collateral_token),
        ] {
            if value == ZERO_ADDRESS || value.is_empty() {
                return Err(IndexerError::incomplete_pool(
                    pool_id,
                    format!("{field} is absent"),
                ));
            }
        }
        Ok(())
    }
}

/// Authoritative loan state fetched from the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanSnapshot {
    /// Lender address
    pub lender: String,
    /// Borrower address
    pub borrower: String,
    /// Loan token address
    pub loan_token: String,
    /// Collateral token address
    pub collateral_token: String,
    /// Outstanding debt (decimal string)
    pub debt: String,
    /// Posted collateral (decimal string)
    pub collateral: String,
    /// Interest rate (protocol basis points)
    pub interest_rate: u64,
    /// Auction start timestamp (0 when no auction is running)
    pub auction_start_timestamp: u64,
    /// Loan origination timestamp
    pub loan_start_timestamp: u64,
    /// Auction length in seconds
    pub auction_length: u64,
}

impl LoanSnapshot {
    /// Verify that every semantically required field is present.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::IncompleteLoanData`] naming the first missing
    /// field.
    pub fn ensure_complete(&self, loan_id: &str) -> IndexerResult<()> {
        for (field, value) in [
            ("lender", &self.lender),
            ("borrower", &self.borrower),
            ("loanToken", &self.loan_token),
            ("collateralToken", &self.collateral_token),
        ] {
            if value == ZERO_ADDRESS || value.is_empty() {
                return Err(IndexerError::incomplete_loan(
                    loan_id,
                    format!("{field} is absent"),
                ));
            }
        }
        Ok(())
    }
}

/// ERC-20 metadata for an allow-listed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Token decimal places
    pub decimals: u8,
}

/// Capability to read current on-chain state for an entity id.
///
/// Boxed futures keep the trait object-safe so the API layer and tests can
/// hold it as `Arc<dyn ChainReader>`.
pub trait ChainReader: Send + Sync {
    /// Fetch the full pool struct for `pool_id` (bytes32 hex string).
    fn pool_snapshot(&self, pool_id: String) -> BoxFuture<'_, IndexerResult<PoolSnapshot>>;

    /// Fetch the full loan struct for `loan_id` (decimal string).
    fn loan_snapshot(&self, loan_id: String) -> BoxFuture<'_, IndexerResult<LoanSnapshot>>;

    /// Fetch ERC-20 name/symbol/decimals for `token_address`.
    fn token_metadata(&self, token_address: String) -> BoxFuture<'_, IndexerResult<TokenMetadata>>;
}

/// Production [`ChainReader`] backed by contract calls over RPC.
pub struct ContractReader {
    provider: Provider,
    protocol_address: Address,
    timeout: Duration,
}

impl ContractReader {
    /// Create a reader against the given provider and protocol contract.
    #[must_use]
    pub const fn new(provider: Provider, protocol_address: Address, timeout: Duration) -> Self {
        Self {
            provider,
            protocol_address,
            timeout,
        }
    }

    async fn call<T, F>(&self, what: &str, fut: F) -> IndexerResult<T>
    where
        F: IntoFuture<Output = Result<T, alloy::contract::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(IndexerError::contract_read(
                format!("{what} query failed: {e}"),
                Some(Box::new(e)),
            )),
            Err(_) => Err(IndexerError::contract_read(
                format!("{what} query timed out after {:?}", self.timeout),
                None,
            )),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_pool(&self, pool_id: String) -> IndexerResult<PoolSnapshot> {
        let id: B256 = pool_id.parse().map_err(|e| {
            IndexerError::contract_read(
                format!("invalid pool id {pool_id}"),
                Some(Box::new(e)),
            )
        })?;

        let contract = ILendingProtocol::new(self.protocol_address, self.provider.clone());
        let info = self
            .call("getPoolInfo", contract.getPoolInfo(id).call())
            .await?
            ._0;

        debug!(pool_id, "Fetched pool struct from contract");

        Ok(PoolSnapshot {
            lender: format!("{:?}", info.lender),
            loan_token: format!("{:?}", info.loanToken),
            collateral_token: format!("{:?}", info.collateralToken),
            min_loan_size: info.minLoanSize.to_string(),
            pool_balance: info.poolBalance.to_string(),
            max_loan_ratio: narrow(info.maxLoanRatio, "maxLoanRatio")?,
            auction_length: narrow(info.auctionLength, "auctionLength")?,
            interest_rate: narrow(info.interestRate, "interestRate")?,
            outstanding_loans: narrow(info.outstandingLoans, "outstandingLoans")?,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_loan(&self, loan_id: String) -> IndexerResult<LoanSnapshot> {
        let id = U256::from_str_radix(&loan_id, 10).map_err(|e| {
            IndexerError::contract_read(
                format!("invalid loan id {loan_id}"),
                Some(Box::new(e)),
            )
        })?;

        let contract = ILendingProtocol::new(self.protocol_address, self.provider.clone());
        let info = self
            .call("getLoanInfo", contract.getLoanInfo(id).call())
            .await?
            ._0;

        debug!(loan_id, "Fetched loan struct from contract");

        Ok(LoanSnapshot {
            lender: format!("{:?}", info.lender),
            borrower: format!("{:?}", info.borrower),
            loan_token: format!("{:?}", info.loanToken),
            collateral_token: format!("{:?}", info.collateralToken),
            debt: info.debt.to_string(),
            collateral: info.collateral.to_string(),
            interest_rate: narrow(info.interestRate, "interestRate")?,
            auction_start_timestamp: narrow(info.auctionStartTimestamp, "auctionStartTimestamp")?,
            loan_start_timestamp: narrow(info.loanStartTimestamp, "loanStartTimestamp")?,
            auction_length: narrow(info.auctionLength, "auctionLength")?,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_token_metadata(&self, token_address: String) -> IndexerResult<TokenMetadata> {
        let addr: Address = token_address.parse().map_err(|e| {
            IndexerError::contract_read(
                format!("invalid token address {token_address}"),
                Some(Box::new(e)),
            )
        })?;

        let token = IERC20Metadata::new(addr, self.provider.clone());

        let name = self.call("name", token.name().call()).await?._0;
        let symbol = self.call("symbol", token.symbol().call()).await?._0;
        let decimals = self.call("decimals", token.decimals().call()).await?._0;

        debug!(token_address, name, symbol, "Fetched token metadata");

        Ok(TokenMetadata {
            name,
            symbol,
            decimals,
        })
    }
}

impl ChainReader for ContractReader {
    fn pool_snapshot(&self, pool_id: String) -> BoxFuture<'_, IndexerResult<PoolSnapshot>> {
        self.fetch_pool(pool_id).boxed()
    }

    fn loan_snapshot(&self, loan_id: String) -> BoxFuture<'_, IndexerResult<LoanSnapshot>> {
        self.fetch_loan(loan_id).boxed()
    }

    fn token_metadata(&self, token_address: String) -> BoxFuture<'_, IndexerResult<TokenMetadata>> {
        self.fetch_token_metadata(token_address).boxed()
    }
}

/// Narrow a `uint256` counter/rate field to `u64`.
fn narrow(value: U256, field: &str) -> IndexerResult<u64> {
    u64::try_from(value).map_err(|e| {
        IndexerError::contract_read(
            format!("{field} out of range: {value}"),
            Some(Box::new(e)),
        )
    })
}
