//! Error types for the lending-protocol indexer.
//!
//! This module provides a unified error type [`IndexerError`] covering every
//! failure class in the pipeline, from configuration loading through event
//! reconciliation.
//!
//! # Design
//!
//! The taxonomy separates fatal-to-startup errors from per-event errors:
//! - [`IndexerError::ConfigError`]: listener/API startup only
//! - [`IndexerError::TransportError`] / [`IndexerError::SubscriptionError`]:
//!   connection-level, terminal (no auto-reconnect in this design)
//! - [`IndexerError::MalformedEvent`], [`IndexerError::ContractReadError`],
//!   [`IndexerError::PoolNotFound`], [`IndexerError::LoanNotFound`],
//!   [`IndexerError::IncompletePoolData`], [`IndexerError::IncompleteLoanData`]:
//!   per-event, dropped with a log entry and isolated from other events
//!
//! All errors implement [`std::error::Error`] and carry optional source chains.

use std::fmt;

/// Result type alias using [`IndexerError`].
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Unified error type for the lending-protocol indexer.
#[derive(Debug)]
pub enum IndexerError {
    /// Configuration or environment variable errors.
    ///
    /// Fatal to listener startup only: the process keeps serving the REST
    /// surface in a degraded, listener-less mode.
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection-level transport errors (WebSocket, RPC endpoint).
    ///
    /// Terminal in this design: there is no automatic reconnection, and an
    /// authentication failure is never retried.
    TransportError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failure to establish or keep a log subscription.
    SubscriptionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A delivered event payload could not be decoded into a typed record.
    ///
    /// Covers unknown event signatures, ABI decode failures, and required
    /// fields that cannot be resolved. The event is dropped.
    MalformedEvent {
        /// Event kind, when known
        event: String,
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A read-through contract query failed or timed out.
    ///
    /// The triggering event is dropped; a transient node-side failure must
    /// not crash the reconciliation pipeline.
    ContractReadError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An event referenced a pool that is not in the store.
    ///
    /// Indicates an ordering violation upstream; the event is dropped.
    PoolNotFound {
        /// The missing pool id
        pool_id: String,
    },

    /// An event referenced a loan that is not in the store.
    LoanNotFound {
        /// The missing loan id
        loan_id: String,
    },

    /// A pool snapshot from read-through was missing required fields.
    IncompletePoolData {
        /// The pool id whose snapshot was rejected
        pool_id: String,
        /// Which field(s) failed validation
        message: String,
    },

    /// A loan snapshot from read-through was missing required fields.
    IncompleteLoanData {
        /// The loan id whose snapshot was rejected
        loan_id: String,
        /// Which field(s) failed validation
        message: String,
    },

    /// Two handlers were registered for the same event name.
    DuplicateRegistration {
        /// The event name registered twice
        event: String,
    },

    /// Database operation errors.
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl IndexerError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use lending_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::config("RPC_WS_URL not set", None);
    /// assert!(matches!(err, IndexerError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new transport error.
    #[must_use]
    pub fn transport(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::TransportError {
            message: message.into(),
            source,
        }
    }

    /// Create a new subscription error.
    #[must_use]
    pub fn subscription(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new malformed-event error.
    ///
    /// # Example
    ///
    /// ```
    /// use lending_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::malformed("LoanCreated", "loanId missing", None);
    /// assert!(matches!(err, IndexerError::MalformedEvent { .. }));
    /// ```
    #[must_use]
    pub fn malformed(
        event: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::MalformedEvent {
            event: event.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a new contract-read error.
    #[must_use]
    pub fn contract_read(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ContractReadError {
            message: message.into(),
            source,
        }
    }

    /// Create a new pool-not-found error.
    #[must_use]
    pub fn pool_not_found(pool_id: impl Into<String>) -> Self {
        Self::PoolNotFound {
            pool_id: pool_id.into(),
        }
    }

    /// Create a new loan-not-found error.
    #[must_use]
    pub fn loan_not_found(loan_id: impl Into<String>) -> Self {
        Self::LoanNotFound {
            loan_id: loan_id.into(),
        }
    }

    /// Create a new incomplete-pool-data error.
    #[must_use]
    pub fn incomplete_pool(pool_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IncompletePoolData {
            pool_id: pool_id.into(),
            message: message.into(),
        }
    }

    /// Create a new incomplete-loan-data error.
    #[must_use]
    pub fn incomplete_loan(loan_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IncompleteLoanData {
            loan_id: loan_id.into(),
            message: message.into(),
        }
    }

    /// Create a new duplicate-registration error.
    #[must_use]
    pub fn duplicate_registration(event: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            event: event.into(),
        }
    }

    /// Create a new database error.
    ///
    /// # Example
    ///
    /// ```
    /// use lending_indexer::error::IndexerError;
    ///
    /// let err = IndexerError::database("Connection failed", None);
    /// assert!(matches!(err, IndexerError::DatabaseError { .. }));
    /// ```
    #[must_use]
    pub fn database(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    /// Whether a transport-level error looks like an authentication failure.
    ///
    /// Providers surface rejected credentials as an HTTP 401-equivalent in
    /// the error text. Credentials will not self-heal, so callers must not
    /// schedule a reconnect for these.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::TransportError { message, .. } | Self::SubscriptionError { message, .. } => {
                message.contains("401") || message.contains("Unauthorized")
            }
            _ => false,
        }
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::TransportError { message, .. } => write!(f, "Transport error: {message}"),
            Self::SubscriptionError { message, .. } => {
                write!(f, "Subscription error: {message}")
            }
            Self::MalformedEvent { event, message, .. } => {
                write!(f, "Malformed {event} event: {message}")
            }
            Self::ContractReadError { message, .. } => {
                write!(f, "Contract read error: {message}")
            }
            Self::PoolNotFound { pool_id } => write!(f, "Pool not found: {pool_id}"),
            Self::LoanNotFound { loan_id } => write!(f, "Loan not found: {loan_id}"),
            Self::IncompletePoolData { pool_id, message } => {
                write!(f, "Incomplete pool data for {pool_id}: {message}")
            }
            Self::IncompleteLoanData { loan_id, message } => {
                write!(f, "Incomplete loan data for {loan_id}: {message}")
            }
            Self::DuplicateRegistration { event } => {
                write!(f, "Handler already registered for event: {event}")
            }
            Self::DatabaseError { message, .. } => write!(f, "Database error: {message}"),
        }
    }
}

impl std::error::Error for IndexerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::TransportError { source, .. }
            | Self::SubscriptionError { source, .. }
            | Self::MalformedEvent { source, .. }
            | Self::ContractReadError { source, .. }
            | Self::DatabaseError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::PoolNotFound { .. }
            | Self::LoanNotFound { .. }
            | Self::IncompletePoolData { .. }
            | Self::IncompleteLoanData { .. }
            | Self::DuplicateRegistration { .. } => None,
        }
    }
}

impl From<sqlx::Error> for IndexerError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_config_error() {
        let err = IndexerError::config("test error", None);
        assert!(matches!(err, IndexerError::ConfigError { .. }));
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_malformed_event_display() {
        let err = IndexerError::malformed("PoolCreated", "poolId missing", None);
        assert_eq!(
            err.to_string(),
            "Malformed PoolCreated event: poolId missing"
        );
    }

    #[test]
    fn test_not_found_display() {
        assert_eq!(
            IndexerError::pool_not_found("0xabc").to_string(),
            "Pool not found: 0xabc"
        );
        assert_eq!(
            IndexerError::loan_not_found("7").to_string(),
            "Loan not found: 7"
        );
    }

    #[test]
    fn test_auth_failure_classification() {
        let auth = IndexerError::transport("server returned 401 Unauthorized", None);
        assert!(auth.is_auth_failure());

        let plain = IndexerError::transport("connection reset by peer", None);
        assert!(!plain.is_auth_failure());

        let unrelated = IndexerError::database("401 rows", None);
        assert!(!unrelated.is_auth_failure());
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = IndexerError::config("failed to load", Some(Box::new(source)));

        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Configuration error: failed to load");
    }

    #[test]
    fn test_duplicate_registration() {
        let err = IndexerError::duplicate_registration("LoanCreated");
        assert_eq!(
            err.to_string(),
            "Handler already registered for event: LoanCreated"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_trait() {
        let err = IndexerError::transport("test", None);
        let _: &dyn std::error::Error = &err;
    }
}
