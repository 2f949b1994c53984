//! Argument normalization: raw log → typed event record.
//!
//! Upstream payload shape has historically been inconsistent between SDK
//! versions (named vs. positional argument delivery). Instead of probing
//! multiple access strategies at runtime, this module uses a tagged decoding
//! schema per event kind: the log's first topic selects the schema, the
//! `sol!`-generated decoder validates the payload against it, and the result
//! is a typed [`NormalizedEvent`] or a [`MalformedEvent`] failure. There is
//! no silent coercion path.
//!
//! Conversions applied uniformly:
//! - wide integers (`uint256` amounts) → decimal strings, never floats
//! - addresses and `bytes32` ids → 0x-prefixed hex strings
//! - timestamps → `u64`
//!
//! This component performs no I/O and is deterministic given its input.
//!
//! [`MalformedEvent`]: crate::error::IndexerError::MalformedEvent

use alloy::primitives::{Address, Log as PrimitiveLog, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::error::{IndexerError, IndexerResult};
use crate::events::{
    names, LoanCreated, LoanLenderChanged, LoanUpdated, PoolCreated, PoolUpdated,
    TokenAllowListUpdated,
};

/// A protocol event decoded and normalized into domain form.
///
/// String fields hold decimal representations for wide integers and
/// 0x-prefixed hex for addresses and pool ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// A token was added to or toggled on the allow list.
    TokenAllowListUpdated {
        /// Token contract address
        token_address: String,
        /// New allow-list flag
        is_allowed: bool,
        /// On-chain update timestamp
        updated_at: u64,
    },
    /// A new pool was created. Carries only the id; full state requires
    /// read-through.
    PoolCreated {
        /// Pool identifier (bytes32 hex)
        pool_id: String,
        /// Pool lender address
        lender: String,
        /// On-chain creation timestamp
        created_at: u64,
    },
    /// An existing pool's parameters changed.
    PoolUpdated {
        /// Pool identifier (bytes32 hex)
        pool_id: String,
        /// On-chain update timestamp
        updated_at: u64,
    },
    /// A loan was originated against a pool.
    LoanCreated {
        /// Owning pool identifier
        pool_id: String,
        /// Loan identifier (decimal)
        loan_id: String,
        /// Borrower address
        borrower: String,
        /// On-chain creation timestamp
        created_at: u64,
    },
    /// An existing loan's terms changed.
    LoanUpdated {
        /// Loan identifier (decimal)
        loan_id: String,
        /// On-chain update timestamp
        updated_at: u64,
    },
    /// A loan moved from one pool to another (auction settlement).
    LoanLenderChanged {
        /// Loan identifier (decimal)
        loan_id: String,
        /// Pool the loan is leaving
        old_pool_id: String,
        /// Pool the loan now belongs to
        new_pool_id: String,
    },
}

impl NormalizedEvent {
    /// The event's registration name, as used by the router.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TokenAllowListUpdated { .. } => names::TOKEN_ALLOW_LIST_UPDATED,
            Self::PoolCreated { .. } => names::POOL_CREATED,
            Self::PoolUpdated { .. } => names::POOL_UPDATED,
            Self::LoanCreated { .. } => names::LOAN_CREATED,
            Self::LoanUpdated { .. } => names::LOAN_UPDATED,
            Self::LoanLenderChanged { .. } => names::LOAN_LENDER_CHANGED,
        }
    }

    /// Serialization keys for the entities this event touches.
    ///
    /// Reconciliation routines must hold the lock for every returned key
    /// before reading or writing the store. Keys are namespaced so a pool id
    /// and a loan id can never alias.
    #[must_use]
    pub fn entity_keys(&self) -> Vec<String> {
        match self {
            Self::TokenAllowListUpdated { token_address, .. } => {
                vec![format!("token:{token_address}")]
            }
            Self::PoolCreated { pool_id, .. } | Self::PoolUpdated { pool_id, .. } => {
                vec![format!("pool:{pool_id}")]
            }
            Self::LoanCreated {
                pool_id, loan_id, ..
            } => vec![format!("pool:{pool_id}"), format!("loan:{loan_id}")],
            Self::LoanUpdated { loan_id, .. } => vec![format!("loan:{loan_id}")],
            Self::LoanLenderChanged {
                loan_id,
                old_pool_id,
                new_pool_id,
            } => vec![
                format!("pool:{old_pool_id}"),
                format!("pool:{new_pool_id}"),
                format!("loan:{loan_id}"),
            ],
        }
    }
}

/// Decode a raw log into a [`NormalizedEvent`].
///
/// The first topic selects the event schema. Logs whose topic does not match
/// any known protocol event fail with `MalformedEvent`, as do payloads that
/// fail typed decoding or required-field validation.
///
/// # Errors
///
/// Returns [`IndexerError::MalformedEvent`] on any decode or validation
/// failure; the caller is expected to drop the event with a log entry.
pub fn normalize(log: &Log) -> IndexerResult<NormalizedEvent> {
    let topic0 = log
        .topics()
        .first()
        .copied()
        .ok_or_else(|| IndexerError::malformed("unknown", "log has no topics", None))?;

    let inner = PrimitiveLog {
        address: log.address(),
        data: log.data().clone(),
    };

    if topic0 == TokenAllowListUpdated::SIGNATURE_HASH {
        let ev = decode::<TokenAllowListUpdated>(&inner, names::TOKEN_ALLOW_LIST_UPDATED)?;
        let token_address = required_address(ev.tokenAddress, names::TOKEN_ALLOW_LIST_UPDATED)?;
        Ok(NormalizedEvent::TokenAllowListUpdated {
            token_address,
            is_allowed: ev.isAllowed,
            updated_at: timestamp(ev.updatedAt, names::TOKEN_ALLOW_LIST_UPDATED)?,
        })
    } else if topic0 == PoolCreated::SIGNATURE_HASH {
        let ev = decode::<PoolCreated>(&inner, names::POOL_CREATED)?;
        Ok(NormalizedEvent::PoolCreated {
            pool_id: required_pool_id(ev.poolId, names::POOL_CREATED)?,
            lender: format!("{:?}", ev.lender),
            created_at: timestamp(ev.createdAt, names::POOL_CREATED)?,
        })
    } else if topic0 == PoolUpdated::SIGNATURE_HASH {
        let ev = decode::<PoolUpdated>(&inner, names::POOL_UPDATED)?;
        Ok(NormalizedEvent::PoolUpdated {
            pool_id: required_pool_id(ev.poolId, names::POOL_UPDATED)?,
            updated_at: timestamp(ev.updatedAt, names::POOL_UPDATED)?,
        })
    } else if topic0 == LoanCreated::SIGNATURE_HASH {
        let ev = decode::<LoanCreated>(&inner, names::LOAN_CREATED)?;
        Ok(NormalizedEvent::LoanCreated {
            pool_id: required_pool_id(ev.poolId, names::LOAN_CREATED)?,
            loan_id: ev.loanId.to_string(),
            borrower: format!("{:?}", ev.borrower),
            created_at: timestamp(ev.createdAt, names::LOAN_CREATED)?,
        })
    } else if topic0 == LoanUpdated::SIGNATURE_HASH {
        let ev = decode::<LoanUpdated>(&inner, names::LOAN_UPDATED)?;
        Ok(NormalizedEvent::LoanUpdated {
            loan_id: ev.loanId.to_string(),
            updated_at: timestamp(ev.updatedAt, names::LOAN_UPDATED)?,
        })
    } else if topic0 == LoanLenderChanged::SIGNATURE_HASH {
        let ev = decode::<LoanLenderChanged>(&inner, names::LOAN_LENDER_CHANGED)?;
        Ok(NormalizedEvent::LoanLenderChanged {
            loan_id: ev.loanId.to_string(),
            old_pool_id: required_pool_id(ev.oldPoolId, names::LOAN_LENDER_CHANGED)?,
            new_pool_id: required_pool_id(ev.newPoolId, names::LOAN_LENDER_CHANGED)?,
        })
    } else {
        Err(IndexerError::malformed(
            "unknown",
            format!("unrecognized event signature: {topic0:?}"),
            None,
        ))
    }
}

fn decode<E: SolEvent>(log: &PrimitiveLog, event: &'static str) -> IndexerResult<E> {
    E::decode_log(log, true)
        .map(|decoded| decoded.data)
        .map_err(|e| {
            IndexerError::malformed(event, "payload failed typed decoding", Some(Box::new(e)))
        })
}

fn required_pool_id(pool_id: B256, event: &'static str) -> IndexerResult<String> {
    if pool_id == B256::ZERO {
        return Err(IndexerError::malformed(event, "poolId is zero", None));
    }
    Ok(format!("{pool_id:?}"))
}

fn required_address(addr: Address, event: &'static str) -> IndexerResult<String> {
    if addr == Address::ZERO {
        return Err(IndexerError::malformed(
            event,
            "required address field is zero",
            None,
        ));
    }
    Ok(format!("{addr:?}"))
}

fn timestamp(value: U256, event: &'static str) -> IndexerResult<u64> {
    u64::try_from(value).map_err(|e| {
        IndexerError::malformed(
            event,
            format!("timestamp out of range: {value}"),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256, LogData};

    fn wrap(data: LogData) -> Log {
        Log {
            inner: PrimitiveLog {
                address: address!("00000000000000000000000000000000000000aa"),
                data,
            },
            ..Default::default()
        }
    }

    const POOL_ID: B256 =
        b256!("00000000000000000000000000000000000000000000000000000000000000ff");

    #[test]
    fn test_normalize_pool_created() {
        let ev = PoolCreated {
            lender: address!("0000000000000000000000000000000000000001"),
            poolId: POOL_ID,
            createdAt: U256::from(1_700_000_000_u64),
        };
        let log = wrap(ev.encode_log_data());

        let normalized = normalize(&log).unwrap();
        match normalized {
            NormalizedEvent::PoolCreated {
                pool_id,
                lender,
                created_at,
            } => {
                assert_eq!(pool_id, format!("{POOL_ID:?}"));
                assert_eq!(lender, "0x0000000000000000000000000000000000000001");
                assert_eq!(created_at, 1_700_000_000);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_normalize_loan_created_decimal_id() {
        let ev = LoanCreated {
            borrower: address!("0000000000000000000000000000000000000002"),
            poolId: POOL_ID,
            loanId: U256::from(42_u64),
            createdAt: U256::from(1_700_000_001_u64),
        };
        let log = wrap(ev.encode_log_data());

        match normalize(&log).unwrap() {
            NormalizedEvent::LoanCreated {
                loan_id, pool_id, ..
            } => {
                assert_eq!(loan_id, "42");
                assert_eq!(pool_id, format!("{POOL_ID:?}"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_normalize_lender_changed() {
        let other_pool =
            b256!("0000000000000000000000000000000000000000000000000000000000000a01");
        let ev = LoanLenderChanged {
            loanId: U256::from(7_u64),
            oldPoolId: POOL_ID,
            newPoolId: other_pool,
        };
        let log = wrap(ev.encode_log_data());

        match normalize(&log).unwrap() {
            NormalizedEvent::LoanLenderChanged {
                loan_id,
                old_pool_id,
                new_pool_id,
            } => {
                assert_eq!(loan_id, "7");
                assert_eq!(old_pool_id, format!("{POOL_ID:?}"));
                assert_eq!(new_pool_id, format!("{other_pool:?}"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_zero_pool_id_is_malformed() {
        let ev = PoolCreated {
            lender: address!("0000000000000000000000000000000000000001"),
            poolId: B256::ZERO,
            createdAt: U256::from(1_u64),
        };
        let log = wrap(ev.encode_log_data());

        let err = normalize(&log).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedEvent { .. }));
    }

    #[test]
    fn test_unknown_signature_is_malformed() {
        // A topic that matches no protocol event
        let data = LogData::new_unchecked(
            vec![b256!(
                "1111111111111111111111111111111111111111111111111111111111111111"
            )],
            alloy::primitives::Bytes::new(),
        );
        let log = wrap(data);

        let err = normalize(&log).unwrap_err();
        assert!(matches!(err, IndexerError::MalformedEvent { .. }));
    }

    #[test]
    fn test_entity_keys_namespacing() {
        let ev = NormalizedEvent::LoanLenderChanged {
            loan_id: "9".to_string(),
            old_pool_id: "0xaa".to_string(),
            new_pool_id: "0xbb".to_string(),
        };
        assert_eq!(
            ev.entity_keys(),
            vec![
                "pool:0xaa".to_string(),
                "pool:0xbb".to_string(),
                "loan:9".to_string()
            ]
        );
        assert_eq!(ev.name(), "LoanLenderChanged");
    }

    #[test]
    fn test_allow_list_event_roundtrip() {
        let ev = TokenAllowListUpdated {
            tokenAddress: address!("00000000000000000000000000000000000000cc"),
            isAllowed: true,
            updatedAt: U256::from(5_u64),
        };
        let log = wrap(ev.encode_log_data());

        match normalize(&log).unwrap() {
            NormalizedEvent::TokenAllowListUpdated {
                token_address,
                is_allowed,
                updated_at,
            } => {
                assert_eq!(token_address, "0x00000000000000000000000000000000000000cc");
                assert!(is_allowed);
                assert_eq!(updated_at, 5);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
