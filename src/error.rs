//! Unified error types for Strand.
//!
//! This module provides a stable error type that wraps the engine's
//! internal errors and presents a consistent interface to users.

use strand_core::{AbortCause, ConflictKey, StrandError};
use thiserror::Error;

/// All Strand errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transaction did not commit; nothing it wrote is visible
    #[error("transaction {txn_id} aborted: {cause}{}", describe_keys(.conflicting_keys))]
    Aborted {
        /// Aborted transaction
        txn_id: u64,
        /// Why it aborted
        cause: AbortCause,
        /// Conflict keys shared with the transaction that won
        conflicting_keys: Vec<ConflictKey>,
    },

    /// `begin` on a session that already has an active transaction
    #[error("transaction {0} is already active on this session")]
    NestedTransaction(u64),

    /// Operation on a transaction that already ended
    #[error("transaction not active: {0}")]
    NotActive(String),

    /// Update rejected by the object semantics
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Bad configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The log could not serve a read outside a transaction (unavailable or
    /// trimmed); inside a transaction the same failure aborts it
    #[error("log unavailable: {0}")]
    Unavailable(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

fn describe_keys(keys: &[ConflictKey]) -> String {
    match keys.len() {
        0 => String::new(),
        1 => format!(" on {}", keys[0]),
        n => format!(" on {} and {} more", keys[0], n - 1),
    }
}

/// Result type for Strand operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// A fresh transaction may succeed where this one aborted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Aborted { .. } | Error::Unavailable(_))
    }

    /// Check if this is an abort caused by a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Aborted {
                cause: AbortCause::Conflict(_),
                ..
            }
        )
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }

    /// Abort cause, if this is an abort.
    pub fn abort_cause(&self) -> Option<AbortCause> {
        match self {
            Error::Aborted { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Conflict keys carried by a conflict abort.
    pub fn conflicting_keys(&self) -> &[ConflictKey] {
        match self {
            Error::Aborted {
                conflicting_keys, ..
            } => conflicting_keys,
            _ => &[],
        }
    }
}

// Convert from engine errors
impl From<StrandError> for Error {
    fn from(e: StrandError) -> Self {
        match e {
            StrandError::TransactionAborted {
                txn_id,
                cause,
                conflicting_keys,
                ..
            } => Error::Aborted {
                txn_id,
                cause,
                conflicting_keys,
            },
            StrandError::NestedTransaction { active_txn_id } => {
                Error::NestedTransaction(active_txn_id)
            }
            StrandError::TransactionNotActive { txn_id, state } => {
                Error::NotActive(format!("transaction {} is {}", txn_id, state))
            }
            StrandError::StaleSnapshot {
                requested,
                earliest,
            } => Error::Unavailable(format!(
                "entries after {} were trimmed (earliest {})",
                requested, earliest
            )),
            StrandError::LogUnavailable { message } => Error::Unavailable(message),
            StrandError::InvalidUpdate { reason } => Error::InvalidUpdate(reason),
            StrandError::InvalidConfig { message } => Error::InvalidConfig(message),
            StrandError::Internal { message } => Error::Internal(message),
        }
    }
}
