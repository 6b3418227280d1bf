//! In-memory shared log
//!
//! A process-local [`SharedLog`]. Entries live in a `Vec` behind a
//! `parking_lot::RwLock`:
//! - Reads (`tail`, `read_entries_after`) take the read lock only
//! - `append_if_tail_equals` takes the write lock for the compare-and-push
//!   and nothing else, so it is the single serialization point of the engine
//!
//! # Trimming
//!
//! `trim_to(p)` discards entries at positions `<= p`. A reader that needs
//! entries after an older position gets `StaleSnapshot`.
//!
//! # Fault injection
//!
//! `fail_next_appends(n)` / `fail_next_reads(n)` make the next `n` calls
//! fail with `LogUnavailable` before touching any state. Used to exercise
//! the coordinator's bounded retry path.
//!
//! `lose_next_append_acks(n)` lets the next `n` successful appends land but
//! reports `LogUnavailable` to the caller, as a log that times out after
//! persisting would.

use crate::{AppendOutcome, CommitLogEntry, SharedLog, WriteSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::{IsolationLevel, LogPosition, Result, StrandError};

#[derive(Debug, Default)]
struct LogInner {
    /// Entries at positions `trimmed + 1 ..= trimmed + entries.len()`
    entries: Vec<Arc<CommitLogEntry>>,
    /// Highest discarded position
    trimmed: LogPosition,
}

impl LogInner {
    fn tail(&self) -> LogPosition {
        LogPosition::new(self.trimmed.as_u64() + self.entries.len() as u64)
    }
}

/// Counters describing log activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Successful appends
    pub appended: u64,
    /// Conditional appends rejected because the tail moved
    pub tail_moved: u64,
    /// Calls failed by fault injection
    pub injected_failures: u64,
}

/// Process-local shared log
#[derive(Debug, Default)]
pub struct InMemoryLog {
    inner: RwLock<LogInner>,
    pending_append_failures: AtomicU32,
    pending_read_failures: AtomicU32,
    pending_lost_acks: AtomicU32,
    appended: AtomicU64,
    tail_moved: AtomicU64,
    injected_failures: AtomicU64,
}

impl InMemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held (trimmed entries excluded)
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Highest position discarded by trimming
    pub fn trimmed_to(&self) -> LogPosition {
        self.inner.read().trimmed
    }

    /// Discard entries at positions `<= position`
    ///
    /// Trimming past the tail trims to the tail. Trimming never moves
    /// backwards.
    pub fn trim_to(&self, position: LogPosition) {
        let mut inner = self.inner.write();
        let target = position.min(inner.tail());
        if target <= inner.trimmed {
            return;
        }
        let drop_count = (target.as_u64() - inner.trimmed.as_u64()) as usize;
        inner.entries.drain(..drop_count);
        inner.trimmed = target;
        tracing::debug!(trimmed_to = target.as_u64(), "log trimmed");
    }

    /// Fail the next `count` appends with `LogUnavailable`
    pub fn fail_next_appends(&self, count: u32) {
        self.pending_append_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` reads with `LogUnavailable`
    pub fn fail_next_reads(&self, count: u32) {
        self.pending_read_failures.store(count, Ordering::SeqCst);
    }

    /// Apply the next `count` successful appends but report them as failed
    pub fn lose_next_append_acks(&self, count: u32) {
        self.pending_lost_acks.store(count, Ordering::SeqCst);
    }

    /// Activity counters
    pub fn stats(&self) -> LogStats {
        LogStats {
            appended: self.appended.load(Ordering::Relaxed),
            tail_moved: self.tail_moved.load(Ordering::Relaxed),
            injected_failures: self.injected_failures.load(Ordering::Relaxed),
        }
    }

    /// Consume one pending injected failure, if any
    fn take_fault(&self, pending: &AtomicU32, what: &str) -> Result<()> {
        let hit = pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hit {
            self.injected_failures.fetch_add(1, Ordering::Relaxed);
            return Err(StrandError::log_unavailable(format!(
                "injected {} failure",
                what
            )));
        }
        Ok(())
    }
}

impl SharedLog for InMemoryLog {
    fn tail(&self) -> Result<LogPosition> {
        Ok(self.inner.read().tail())
    }

    fn read_entries_after(&self, after: LogPosition) -> Result<Vec<Arc<CommitLogEntry>>> {
        self.take_fault(&self.pending_read_failures, "read")?;

        let inner = self.inner.read();
        if after < inner.trimmed {
            return Err(StrandError::StaleSnapshot {
                requested: after,
                earliest: inner.trimmed,
            });
        }
        let start = (after.as_u64() - inner.trimmed.as_u64()) as usize;
        Ok(inner
            .entries
            .get(start..)
            .map(|slice| slice.to_vec())
            .unwrap_or_default())
    }

    fn append_if_tail_equals(
        &self,
        expected: LogPosition,
        txn_id: u64,
        isolation: IsolationLevel,
        write_set: &WriteSet,
    ) -> Result<AppendOutcome> {
        self.take_fault(&self.pending_append_failures, "append")?;

        let mut inner = self.inner.write();
        let current = inner.tail();
        if current != expected {
            self.tail_moved.fetch_add(1, Ordering::Relaxed);
            return Ok(AppendOutcome::TailMoved { current });
        }
        let position = current.next();
        inner.entries.push(Arc::new(CommitLogEntry::new(
            position,
            txn_id,
            isolation,
            write_set.clone(),
        )));
        drop(inner);

        self.appended.fetch_add(1, Ordering::Relaxed);
        self.take_fault(&self.pending_lost_acks, "append acknowledgement")?;
        Ok(AppendOutcome::Appended(position))
    }
}
