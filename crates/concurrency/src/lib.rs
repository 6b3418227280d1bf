//! Concurrency layer for Strand
//!
//! This crate implements optimistic concurrency control (OCC) over the
//! shared log:
//! - TransactionContext: snapshot plus read/write set tracking
//! - VersionCache / VersionedObjectProxy: snapshot reads, buffered writes
//! - Conflict detection against entries committed after the snapshot
//! - TransactionManager: the validate-then-conditionally-append commit loop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod proxy;
pub mod semantics;
pub mod transaction;
pub mod validation;
pub mod versions;

pub use manager::{CommitInfo, CommitPolicy, CommitStats, TransactionManager};
pub use proxy::VersionedObjectProxy;
pub use semantics::{KvSemantics, ObjectSemantics};
pub use transaction::{PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{
    check_entry, validate_read_set, validate_transaction, validate_write_set, Conflict,
    ValidationResult,
};
pub use versions::VersionCache;
