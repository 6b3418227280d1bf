//! # Strand
//!
//! Optimistic transactions over a shared, totally ordered log.
//!
//! Every committed transaction is one entry in the log. A transaction reads
//! at a snapshot (the log tail when it began), buffers its writes, and at
//! commit is validated against the entries committed after its snapshot.
//! If nothing conflicts, its write-set is appended with a single conditional
//! append; if the tail moved in the meantime, only the new entries are
//! checked before trying again.
//!
//! ## Quick Start
//!
//! ```ignore
//! use strand::prelude::*;
//!
//! let db = Strand::open_in_memory()?;
//! let session = db.session();
//! let accounts = ObjectId::named("accounts");
//!
//! let mut txn = db.begin(&session)?;
//! txn.map(accounts).put("alice", 100)?;
//! txn.end()?;
//! ```
//!
//! ## Isolation
//!
//! - [`IsolationLevel::Snapshot`]: aborts if anything the transaction read
//!   or wrote was written by a transaction that committed after its snapshot
//! - [`IsolationLevel::WriteAfterWrite`]: aborts only on overlapping writes
//!
//! Keys are compared through digests (see [`KeyHashing`]); two distinct keys
//! with equal digests conflict. [`StrandBuilder::exact_keys`] compares full
//! keys instead.
//!
//! ## Retrying
//!
//! An aborted transaction is never re-run automatically. Errors for which
//! [`Error::is_retryable`] holds may succeed in a new transaction.

#![warn(missing_docs)]

mod database;
mod error;
mod transaction;

pub mod prelude;

// Re-export main entry points
pub use database::{DatabaseMetrics, Strand, StrandBuilder};
pub use error::{Error, Result};
pub use transaction::{Transaction, TxMap};

// Re-export engine types
pub use strand_core::{
    AbortCause, ConflictKey, ConflictKind, IsolationLevel, Key, KeyHashing, LogPosition, ObjectId,
    Snapshot, UpdateOp, Value,
};
pub use strand_engine::{CommitInfo, EngineConfig, KvSemantics, ObjectSemantics, Session};
pub use strand_log::{InMemoryLog, SharedLog};
