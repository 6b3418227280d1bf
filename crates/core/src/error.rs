//! Error types for the transaction engine
//!
//! [`StrandError`] is the single error type shared by every internal crate.
//! The root crate maps it onto a smaller public error, the same way the
//! storage-level errors are folded into one user-facing enum.
//!
//! ## Retry policy
//!
//! | Variant | Retryable | Who retries |
//! |---------|-----------|-------------|
//! | `TransactionAborted` | yes | the caller, with a fresh begin |
//! | `LogUnavailable` | yes | the coordinator, append step only |
//! | `StaleSnapshot` | yes | surfaced as an abort |
//! | `NestedTransaction` | no | programmer error |
//! | everything else | no | |

use crate::conflict::ConflictKey;
use crate::types::LogPosition;
use std::fmt;
use thiserror::Error;

/// Which comparison found the conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// A key this transaction read was overwritten after its snapshot
    ReadWrite,
    /// A key this transaction wrote was also written after its snapshot
    WriteWrite,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::ReadWrite => f.write_str("read-write"),
            ConflictKind::WriteWrite => f.write_str("write-write"),
        }
    }
}

/// Why a transaction was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortCause {
    /// A committed entry after the snapshot overlaps this transaction
    Conflict(ConflictKind),
    /// The log can no longer serve entries after the snapshot
    StaleSnapshot,
    /// The log append kept failing transiently
    LogUnavailable,
    /// The tail kept moving past every validation attempt
    ContentionExhausted,
    /// The caller aborted explicitly
    User,
}

impl AbortCause {
    /// Short name for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortCause::Conflict(ConflictKind::ReadWrite) => "read_write_conflict",
            AbortCause::Conflict(ConflictKind::WriteWrite) => "write_write_conflict",
            AbortCause::StaleSnapshot => "stale_snapshot",
            AbortCause::LogUnavailable => "log_unavailable",
            AbortCause::ContentionExhausted => "contention_exhausted",
            AbortCause::User => "user",
        }
    }
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortCause::Conflict(kind) => write!(f, "{} conflict", kind),
            AbortCause::StaleSnapshot => f.write_str("stale snapshot"),
            AbortCause::LogUnavailable => f.write_str("log unavailable"),
            AbortCause::ContentionExhausted => f.write_str("commit contention exhausted"),
            AbortCause::User => f.write_str("aborted by caller"),
        }
    }
}

/// All errors produced by the engine
#[derive(Debug, Error)]
pub enum StrandError {
    /// The transaction did not commit
    ///
    /// Buffered writes have been discarded. `conflicting_keys` is populated
    /// for conflict aborts and empty otherwise; `position` is the log entry
    /// that caused the conflict, when there is one.
    #[error("transaction {txn_id} aborted: {cause}{}", format_keys(.conflicting_keys))]
    TransactionAborted {
        /// Id of the aborted transaction
        txn_id: u64,
        /// Reason for the abort
        cause: AbortCause,
        /// Conflict keys shared with the conflicting entry
        conflicting_keys: Vec<ConflictKey>,
        /// Position of the conflicting entry
        position: Option<LogPosition>,
    },

    /// A transaction is already active on this execution context
    #[error("transaction {active_txn_id} is already active on this session")]
    NestedTransaction {
        /// Id of the transaction that is still active
        active_txn_id: u64,
    },

    /// Operation on a transaction that is no longer active
    #[error("transaction {txn_id} is not active ({state})")]
    TransactionNotActive {
        /// Transaction id
        txn_id: u64,
        /// Current state, for diagnostics
        state: String,
    },

    /// The log no longer holds the entries after this position
    #[error("snapshot {requested} is no longer readable (earliest readable position {earliest})")]
    StaleSnapshot {
        /// Position the reader needed entries after
        requested: LogPosition,
        /// Oldest position the log can still read after
        earliest: LogPosition,
    },

    /// Transient failure of the log collaborator
    #[error("log unavailable: {message}")]
    LogUnavailable {
        /// Description of the failure
        message: String,
    },

    /// The object semantics rejected an update
    #[error("invalid update: {reason}")]
    InvalidUpdate {
        /// Why the update was rejected
        reason: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem
        message: String,
    },

    /// Bug or invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description of the problem
        message: String,
    },
}

fn format_keys(keys: &[ConflictKey]) -> String {
    if keys.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    format!(" on [{}]", rendered.join(", "))
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, StrandError>;

impl StrandError {
    /// Build a conflict abort
    pub fn conflict(
        txn_id: u64,
        kind: ConflictKind,
        conflicting_keys: Vec<ConflictKey>,
        position: LogPosition,
    ) -> Self {
        StrandError::TransactionAborted {
            txn_id,
            cause: AbortCause::Conflict(kind),
            conflicting_keys,
            position: Some(position),
        }
    }

    /// Build an abort that carries no conflict keys
    pub fn aborted(txn_id: u64, cause: AbortCause) -> Self {
        StrandError::TransactionAborted {
            txn_id,
            cause,
            conflicting_keys: Vec::new(),
            position: None,
        }
    }

    /// Build a transient log failure
    pub fn log_unavailable(message: impl Into<String>) -> Self {
        StrandError::LogUnavailable {
            message: message.into(),
        }
    }

    /// Build an invalid update error
    pub fn invalid_update(reason: impl Into<String>) -> Self {
        StrandError::InvalidUpdate {
            reason: reason.into(),
        }
    }

    /// Build an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        StrandError::Internal {
            message: message.into(),
        }
    }

    /// Check if retrying with a fresh transaction may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrandError::TransactionAborted { .. }
                | StrandError::StaleSnapshot { .. }
                | StrandError::LogUnavailable { .. }
        )
    }

    /// Check if this is an abort caused by a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StrandError::TransactionAborted {
                cause: AbortCause::Conflict(_),
                ..
            }
        )
    }

    /// Check if this is a transient log failure
    pub fn is_transient(&self) -> bool {
        matches!(self, StrandError::LogUnavailable { .. })
    }

    /// Abort cause, if this is an abort
    pub fn abort_cause(&self) -> Option<AbortCause> {
        match self {
            StrandError::TransactionAborted { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Conflict keys carried by an abort (empty otherwise)
    pub fn conflicting_keys(&self) -> &[ConflictKey] {
        match self {
            StrandError::TransactionAborted {
                conflicting_keys, ..
            } => conflicting_keys,
            _ => &[],
        }
    }
}
