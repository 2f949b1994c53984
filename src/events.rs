//! Contract interface for the lending protocol, with compile-time type safety.
//!
//! This module uses Alloy's `sol!` macro to generate type-safe bindings for
//! the protocol's events and read functions directly from Solidity
//! signatures. Event signatures are validated at compile time, topic and data
//! decoding is automatic, and there are no external ABI files to keep in
//! sync.
//!
//! The protocol emits six event kinds consumed by the indexer:
//!
//! - `TokenAllowListUpdated(token, isAllowed, updatedAt)`
//! - `PoolCreated(lender, poolId, createdAt)` — the pool struct is indexed
//!   (hashed) on the wire, so only the id is recoverable from the event;
//!   full state comes from `getPoolInfo`
//! - `PoolUpdated(poolId, updatedAt)`
//! - `LoanCreated(borrower, poolId, loanId, createdAt)` — loan terms come
//!   from `getLoanInfo`
//! - `LoanUpdated(loanId, updatedAt)`
//! - `LoanLenderChanged(loanId, oldPoolId, newPoolId)`

use alloy::primitives::Address;
use alloy::rpc::types::Filter;
use alloy::sol;

sol! {
    #[sol(rpc)]
    interface ILendingProtocol {
        /// Full pool state as returned by `getPoolInfo`.
        struct PoolInfo {
            address lender;
            address loanToken;
            address collateralToken;
            uint256 minLoanSize;
            uint256 poolBalance;
            uint256 maxLoanRatio;
            uint256 auctionLength;
            uint256 interestRate;
            uint256 outstandingLoans;
        }

        /// Full loan state as returned by `getLoanInfo`.
        struct LoanInfo {
            address lender;
            address borrower;
            address loanToken;
            address collateralToken;
            uint256 debt;
            uint256 collateral;
            uint256 interestRate;
            uint256 auctionStartTimestamp;
            uint256 loanStartTimestamp;
            uint256 auctionLength;
        }

        event TokenAllowListUpdated(address indexed tokenAddress, bool isAllowed, uint256 updatedAt);
        event PoolCreated(address indexed lender, bytes32 indexed poolId, uint256 createdAt);
        event PoolUpdated(bytes32 indexed poolId, uint256 updatedAt);
        event LoanCreated(address indexed borrower, bytes32 indexed poolId, uint256 loanId, uint256 createdAt);
        event LoanUpdated(uint256 loanId, uint256 updatedAt);
        event LoanLenderChanged(uint256 loanId, bytes32 oldPoolId, bytes32 newPoolId);

        function getPoolInfo(bytes32 poolId) external view returns (PoolInfo memory);
        function getLoanInfo(uint256 loanId) external view returns (LoanInfo memory);
    }

    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

// Re-export the generated event types for easier access
pub use ILendingProtocol::{
    LoanCreated, LoanLenderChanged, LoanUpdated, PoolCreated, PoolUpdated, TokenAllowListUpdated,
};

/// Event name constants, used as router registration keys.
pub mod names {
    /// `TokenAllowListUpdated` event name.
    pub const TOKEN_ALLOW_LIST_UPDATED: &str = "TokenAllowListUpdated";
    /// `PoolCreated` event name.
    pub const POOL_CREATED: &str = "PoolCreated";
    /// `PoolUpdated` event name.
    pub const POOL_UPDATED: &str = "PoolUpdated";
    /// `LoanCreated` event name.
    pub const LOAN_CREATED: &str = "LoanCreated";
    /// `LoanUpdated` event name.
    pub const LOAN_UPDATED: &str = "LoanUpdated";
    /// `LoanLenderChanged` event name.
    pub const LOAN_LENDER_CHANGED: &str = "LoanLenderChanged";
}

/// Create a subscription filter covering every protocol event the indexer
/// understands, scoped to the protocol contract address.
///
/// The node may emit further event kinds from the same contract; those are
/// delivered too (address-scoped filter) and dropped by the router with a
/// warning rather than filtered here, so new upstream events surface in the
/// logs instead of disappearing silently.
#[must_use]
pub fn protocol_event_filter(protocol_address: Address) -> Filter {
    Filter::new().address(protocol_address)
}

/// Create a filter for a single event kind, by signature hash.
///
/// Used by tests and targeted backfills; the live subscription uses
/// [`protocol_event_filter`].
#[must_use]
pub fn event_filter(protocol_address: Address, signature: alloy::primitives::B256) -> Filter {
    Filter::new()
        .address(protocol_address)
        .event_signature(signature)
}
