//! Shared log abstraction for Strand
//!
//! The transaction engine treats the log as the single source of truth for
//! "what committed, in what order". This crate provides:
//! - [`SharedLog`]: the narrow interface the engine consumes
//! - [`CommitLogEntry`] / [`WriteSet`]: what a commit appends
//! - [`InMemoryLog`]: a process-local implementation with trimming and
//!   fault injection
//!
//! Replication and durability of a real log are outside this crate; any
//! implementation offering the same atomic append can be plugged in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod memory;

pub use entry::{CommitLogEntry, Update, WriteSet};
pub use memory::{InMemoryLog, LogStats};

use std::sync::Arc;
use strand_core::{IsolationLevel, LogPosition, Result};

/// Result of a conditional append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was appended at this position
    Appended(LogPosition),
    /// The tail was no longer the expected one; nothing was appended
    TailMoved {
        /// Tail at the time of the attempt
        current: LogPosition,
    },
}

/// The log collaborator consumed by the commit coordinator
///
/// # Contract
///
/// - `read_entries_after` returns every entry with position `> after`, in
///   increasing position order, with no gaps. If entries needed for that
///   range were trimmed it fails with `StrandError::StaleSnapshot`.
/// - `append_if_tail_equals` is linearizable with respect to every other
///   append: it appends at `expected + 1` only if the tail is still
///   `expected`, and otherwise appends nothing.
/// - Transient failures are reported as `StrandError::LogUnavailable`. A
///   failed `append_if_tail_equals` may still have appended: the entry then
///   carries the caller's `txn_id` and write-set at `expected + 1`.
pub trait SharedLog: Send + Sync {
    /// Position of the newest entry (`LogPosition::ZERO` when empty)
    fn tail(&self) -> Result<LogPosition>;

    /// All entries strictly after `after`, oldest first
    fn read_entries_after(&self, after: LogPosition) -> Result<Vec<Arc<CommitLogEntry>>>;

    /// Append a copy of `write_set` at `expected + 1` if the tail is still `expected`
    fn append_if_tail_equals(
        &self,
        expected: LogPosition,
        txn_id: u64,
        isolation: IsolationLevel,
        write_set: &WriteSet,
    ) -> Result<AppendOutcome>;
}

impl<L: SharedLog + ?Sized> SharedLog for Arc<L> {
    fn tail(&self) -> Result<LogPosition> {
        (**self).tail()
    }

    fn read_entries_after(&self, after: LogPosition) -> Result<Vec<Arc<CommitLogEntry>>> {
        (**self).read_entries_after(after)
    }

    fn append_if_tail_equals(
        &self,
        expected: LogPosition,
        txn_id: u64,
        isolation: IsolationLevel,
        write_set: &WriteSet,
    ) -> Result<AppendOutcome> {
        (**self).append_if_tail_equals(expected, txn_id, isolation, write_set)
    }
}
