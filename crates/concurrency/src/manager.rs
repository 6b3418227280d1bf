//! Transaction manager for coordinating commit operations
//!
//! Drives a transaction from begin to its terminal state:
//! 1. Snapshot acquisition (read the log tail)
//! 2. Validation against entries committed after the snapshot
//! 3. Atomic conditional append (the only write to the shared log)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. mark_validating() - Active → Validating, read/write sets frozen
//! 2. read_entries_after(validated_to)
//! 3. validate_transaction() - first conflicting entry aborts
//! 4. IF read-only: mark_committed(), no append
//! 5. check the write-set applies to the values at validated_to
//! 6. append_if_tail_equals(validated_to, write_set)
//!      Appended(p)  → mark_committed(), return p
//!      TailMoved    → back to 2, scanning only the new entries
//! ```
//!
//! Step 5 runs once per commit. Both isolation levels abort on any entry
//! after the snapshot that writes a key in the write-set, so the values the
//! write-set lands on cannot change between attempts.
//!
//! The manager holds no lock across these steps. The conditional append is
//! the single serialization point: if two transactions validate against the
//! same tail, only one append succeeds and the other rescans.
//!
//! ## Failure handling
//!
//! Transient log failures are retried up to `max_transient_retries` with the
//! same frozen read/write sets; application code is never re-run. A trimmed
//! snapshot, exhausted retries or a tail that keeps moving abort the
//! transaction. Every failure path leaves the context `Aborted`.
//!
//! A failed append may have landed anyway. After one, the first entry past
//! `validated_to` is compared with this transaction's id and write-set
//! before validating; if it matches, the transaction committed there.

use crate::transaction::TransactionContext;
use crate::validation::validate_transaction;
use crate::versions::VersionCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_core::{
    AbortCause, IsolationLevel, KeyHashing, LogPosition, Result, Snapshot, StrandError,
};
use strand_log::{AppendOutcome, CommitLogEntry, SharedLog};

/// Bounds on the commit loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Validate-then-append rounds before giving up on a moving tail
    pub max_commit_attempts: u32,
    /// Consecutive transient log failures tolerated per commit
    pub max_transient_retries: u32,
    /// Pause between transient retries
    pub retry_backoff: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            max_commit_attempts: 64,
            max_transient_retries: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Committed transaction
    pub txn_id: u64,
    /// Snapshot the transaction read at
    pub snapshot: Snapshot,
    /// Position of the appended entry; `None` for read-only transactions
    pub position: Option<LogPosition>,
    /// Newest position the transaction was validated against
    pub validated_to: LogPosition,
    /// Buffered updates that were committed
    pub writes: usize,
    /// Validate-then-append rounds used
    pub attempts: u32,
}

impl CommitInfo {
    /// Check if the commit appended nothing
    pub fn is_read_only(&self) -> bool {
        self.position.is_none()
    }
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    read_only_commits: AtomicU64,
    conflict_aborts: AtomicU64,
    other_aborts: AtomicU64,
    user_aborts: AtomicU64,
    abandoned: AtomicU64,
    tail_races: AtomicU64,
    transient_retries: AtomicU64,
}

/// Point-in-time copy of the manager's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Transactions begun
    pub started: u64,
    /// Transactions committed (including read-only)
    pub committed: u64,
    /// Read-only commits (no append)
    pub read_only_commits: u64,
    /// Aborts caused by conflicts
    pub conflict_aborts: u64,
    /// Aborts caused by the log (stale snapshot, unavailable, contention)
    pub other_aborts: u64,
    /// Aborts requested by callers
    pub user_aborts: u64,
    /// Transactions dropped before they ended
    pub abandoned: u64,
    /// Appends rejected because the tail moved
    pub tail_races: u64,
    /// Transient log failures retried
    pub transient_retries: u64,
}

/// Manages transaction lifecycle and atomic commits
///
/// The manager is the only component that appends to the shared log.
///
/// # Thread Safety
///
/// `begin`, `commit` and `abort` may be called concurrently from any
/// number of threads; each call works on a context owned by its caller.
pub struct TransactionManager {
    log: Arc<dyn SharedLog>,

    /// Committed values, used to check a write-set applies before appending
    versions: Option<Arc<VersionCache>>,

    /// Next transaction ID (ids start at 1)
    next_txn_id: AtomicU64,

    hashing: KeyHashing,
    policy: CommitPolicy,
    counters: Counters,
}

impl TransactionManager {
    /// Create a manager appending to `log`
    pub fn new(log: Arc<dyn SharedLog>, hashing: KeyHashing, policy: CommitPolicy) -> Self {
        TransactionManager {
            log,
            versions: None,
            next_txn_id: AtomicU64::new(1),
            hashing,
            policy,
            counters: Counters::default(),
        }
    }

    /// Check write-sets against `versions` before appending them
    ///
    /// Without a cache, an update that cannot apply to the committed value
    /// is appended and fails later when the entry is materialized.
    pub fn with_version_cache(mut self, versions: Arc<VersionCache>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Conflict key policy given to new transactions
    pub fn hashing(&self) -> KeyHashing {
        self.hashing
    }

    /// Commit loop bounds
    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Current log tail
    pub fn current_position(&self) -> Result<LogPosition> {
        self.log.tail()
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Begin a transaction at the current log tail
    pub fn begin(&self, isolation: IsolationLevel) -> Result<TransactionContext> {
        let snapshot = Snapshot::at(self.log.tail()?);
        let txn_id = self.next_txn_id();
        self.counters.started.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            txn_id,
            snapshot = snapshot.position().as_u64(),
            isolation = isolation.as_str(),
            "transaction started"
        );
        Ok(TransactionContext::new(
            txn_id,
            snapshot,
            isolation,
            self.hashing,
        ))
    }

    /// Commit a transaction
    ///
    /// On success the transaction is `Committed` and, unless it was
    /// read-only, its write-set is in the log at `CommitInfo::position`.
    /// On any error the transaction is `Aborted` and its buffered writes are
    /// discarded.
    ///
    /// # Errors
    ///
    /// - `TransactionAborted` with the conflicting keys on a conflict
    /// - `TransactionAborted` with `StaleSnapshot`, `LogUnavailable` or
    ///   `ContentionExhausted` when the log prevents validation
    /// - `TransactionAborted` with the recorded cause if the transaction was
    ///   doomed while active
    /// - `InvalidUpdate` if the write-set cannot apply to the committed values
    /// - `TransactionNotActive` if the transaction was not `Active`
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<CommitInfo> {
        if let Some(cause) = txn.doomed() {
            let err = StrandError::aborted(txn.txn_id, cause);
            return Err(self.record_abort(txn, err));
        }
        txn.mark_validating()?;

        match self.run_commit(txn) {
            Ok(info) => {
                txn.mark_committed()?;
                self.counters.committed.fetch_add(1, Ordering::Relaxed);
                if info.is_read_only() {
                    self.counters.read_only_commits.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(
                    txn_id = txn.txn_id,
                    position = info.position.map(|p| p.as_u64()),
                    attempts = info.attempts,
                    writes = info.writes,
                    "transaction committed"
                );
                Ok(info)
            }
            Err(err) => Err(self.record_abort(txn, err)),
        }
    }

    fn record_abort(&self, txn: &mut TransactionContext, err: StrandError) -> StrandError {
        let _ = txn.mark_aborted(err.to_string());
        if err.is_conflict() {
            self.counters.conflict_aborts.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                txn_id = txn.txn_id,
                snapshot = txn.snapshot().position().as_u64(),
                error = %err,
                "transaction aborted on conflict"
            );
        } else {
            self.counters.other_aborts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(txn_id = txn.txn_id, error = %err, "transaction aborted");
        }
        err
    }

    fn run_commit(&self, txn: &mut TransactionContext) -> Result<CommitInfo> {
        let snapshot = txn.snapshot();

        // Under WriteAfterWrite reads never conflict, so a read-only
        // transaction has nothing to check.
        if txn.is_read_only() && !txn.isolation().validates_reads() {
            return Ok(CommitInfo {
                txn_id: txn.txn_id,
                snapshot,
                position: None,
                validated_to: snapshot.position(),
                writes: 0,
                attempts: 0,
            });
        }

        let mut transient_failures = 0u32;
        let mut attempts = 0u32;
        let mut write_set_checked = false;
        let mut append_uncertain = false;
        loop {
            attempts += 1;

            let entries = self.with_transient_retry(txn.txn_id, &mut transient_failures, || {
                self.log.read_entries_after(txn.validated_to())
            })?;

            if append_uncertain {
                if let Some(position) = own_entry(txn, &entries) {
                    tracing::debug!(
                        txn_id = txn.txn_id,
                        position = position.as_u64(),
                        "unacknowledged append found in the log"
                    );
                    return Ok(CommitInfo {
                        txn_id: txn.txn_id,
                        snapshot,
                        position: Some(position),
                        validated_to: txn.validated_to(),
                        writes: txn.write_count(),
                        attempts,
                    });
                }
                append_uncertain = false;
            }

            let result = validate_transaction(txn, &entries);
            if let Some(conflict) = result.conflict {
                return Err(StrandError::conflict(
                    txn.txn_id,
                    conflict.kind,
                    conflict.keys,
                    conflict.position,
                ));
            }
            txn.advance_validated_to(result.validated_to);

            if txn.is_read_only() {
                return Ok(CommitInfo {
                    txn_id: txn.txn_id,
                    snapshot,
                    position: None,
                    validated_to: txn.validated_to(),
                    writes: 0,
                    attempts,
                });
            }

            let expected = txn.validated_to();
            if !write_set_checked {
                if let Some(versions) = &self.versions {
                    self.with_transient_retry(txn.txn_id, &mut transient_failures, || {
                        versions.check_write_set(txn.write_set(), expected)
                    })?;
                }
                write_set_checked = true;
            }

            let outcome = self.with_transient_retry(txn.txn_id, &mut transient_failures, || {
                let outcome = self.log.append_if_tail_equals(
                    expected,
                    txn.txn_id,
                    txn.isolation(),
                    txn.write_set(),
                );
                if matches!(&outcome, Err(err) if err.is_transient()) {
                    append_uncertain = true;
                }
                outcome
            })?;

            match outcome {
                AppendOutcome::Appended(position) => {
                    return Ok(CommitInfo {
                        txn_id: txn.txn_id,
                        snapshot,
                        position: Some(position),
                        validated_to: expected,
                        writes: txn.write_count(),
                        attempts,
                    });
                }
                AppendOutcome::TailMoved { current } => {
                    self.counters.tail_races.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(
                        txn_id = txn.txn_id,
                        expected = expected.as_u64(),
                        current = current.as_u64(),
                        "tail moved, revalidating"
                    );
                    // An unacknowledged append gets one more read to find itself
                    if !append_uncertain && attempts >= self.policy.max_commit_attempts {
                        return Err(StrandError::aborted(
                            txn.txn_id,
                            AbortCause::ContentionExhausted,
                        ));
                    }
                }
            }
        }
    }

    /// Run a log call, retrying transient failures within the commit's budget
    ///
    /// A stale snapshot becomes an abort; so does running out of retries.
    fn with_transient_retry<T>(
        &self,
        txn_id: u64,
        failures: &mut u32,
        mut call: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(StrandError::StaleSnapshot { requested, earliest }) => {
                    tracing::warn!(
                        txn_id,
                        requested = requested.as_u64(),
                        earliest = earliest.as_u64(),
                        "snapshot no longer readable"
                    );
                    return Err(StrandError::aborted(txn_id, AbortCause::StaleSnapshot));
                }
                Err(err) if err.is_transient() => {
                    if *failures >= self.policy.max_transient_retries {
                        tracing::warn!(txn_id, error = %err, "log retries exhausted");
                        return Err(StrandError::aborted(txn_id, AbortCause::LogUnavailable));
                    }
                    *failures += 1;
                    self.counters.transient_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(txn_id, attempt = *failures, error = %err, "retrying log call");
                    if !self.policy.retry_backoff.is_zero() {
                        std::thread::sleep(self.policy.retry_backoff);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Explicitly abort a transaction
    ///
    /// Buffered writes are discarded; the log is not touched.
    ///
    /// # Arguments
    /// * `txn` - Transaction to abort
    /// * `reason` - Human-readable reason for abort
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> Result<()> {
        txn.mark_aborted(reason)?;
        self.counters.user_aborts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(txn_id = txn.txn_id, "transaction aborted by caller");
        Ok(())
    }

    /// Abort a transaction whose owner went away without ending it
    ///
    /// Counted separately from caller aborts. A transaction that already
    /// reached a terminal state is left alone.
    pub fn abandon(&self, txn: &mut TransactionContext) {
        if txn.mark_aborted("abandoned").is_ok() {
            self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(txn_id = txn.txn_id, "transaction abandoned");
        }
    }

    /// Take back a transaction that was begun but never handed out
    ///
    /// Undoes the `started` count of [`begin`](Self::begin); the id stays
    /// consumed.
    pub fn discard(&self, mut txn: TransactionContext) {
        let _ = txn.mark_aborted("discarded");
        self.counters.started.fetch_sub(1, Ordering::Relaxed);
        tracing::trace!(txn_id = txn.txn_id, "transaction discarded");
    }

    /// Snapshot of commit counters
    pub fn stats(&self) -> CommitStats {
        let c = &self.counters;
        CommitStats {
            started: c.started.load(Ordering::Relaxed),
            committed: c.committed.load(Ordering::Relaxed),
            read_only_commits: c.read_only_commits.load(Ordering::Relaxed),
            conflict_aborts: c.conflict_aborts.load(Ordering::Relaxed),
            other_aborts: c.other_aborts.load(Ordering::Relaxed),
            user_aborts: c.user_aborts.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            tail_races: c.tail_races.load(Ordering::Relaxed),
            transient_retries: c.transient_retries.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("next_txn_id", &self.next_txn_id.load(Ordering::Relaxed))
            .field("hashing", &self.hashing)
            .field("policy", &self.policy)
            .field("checks_write_sets", &self.versions.is_some())
            .finish()
    }
}

/// Position of this transaction's own entry, if it is the first one after
/// `validated_to`
fn own_entry(txn: &TransactionContext, entries: &[Arc<CommitLogEntry>]) -> Option<LogPosition> {
    let next = entries
        .iter()
        .find(|entry| entry.position() > txn.validated_to())?;
    (next.txn_id() == txn.txn_id && next.write_set() == txn.write_set()).then(|| next.position())
}
