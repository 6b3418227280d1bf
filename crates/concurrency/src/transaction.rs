//! Transaction context for OCC
//!
//! [`TransactionContext`] is the per-transaction bookkeeping: the snapshot,
//! the read-set, the buffered write-set and the lifecycle status. It is owned
//! by exactly one caller and mutated without locks.
//!
//! Reads and writes go through a
//! [`VersionedObjectProxy`](crate::proxy::VersionedObjectProxy), which
//! consults the version cache and records conflict keys here. Commit goes
//! through the [`TransactionManager`](crate::manager::TransactionManager).

use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};
use strand_core::{
    AbortCause, ConflictKey, IsolationLevel, Key, KeyHashing, LogPosition, ObjectId, Result, Snapshot,
    StrandError, UpdateOp,
};
use strand_log::WriteSet;

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (end requested, read/write sets frozen)
/// - `Validating` → `Committed` (no conflict, entry appended)
/// - `Validating` → `Aborted` (conflict or log failure)
/// - `Active` → `Aborted` (caller abort or abandonment)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Active => f.write_str("active"),
            TransactionStatus::Validating => f.write_str("validating"),
            TransactionStatus::Committed => f.write_str("committed"),
            TransactionStatus::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Summary of buffered operations that an abort would discard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Buffered updates
    pub writes: usize,
    /// Distinct conflict keys written
    pub written_keys: usize,
    /// Distinct conflict keys read
    pub read_keys: usize,
}

impl PendingOperations {
    /// Check if nothing would be committed
    pub fn is_empty(&self) -> bool {
        self.writes == 0
    }
}

/// Transaction context for OCC with snapshot reads
///
/// # Read-Set Tracking
///
/// Keys read from the snapshot are recorded as conflict keys. Keys this
/// transaction already wrote are served from the write-set and are not
/// recorded, since the write-set already covers them.
///
/// # Lifecycle
///
/// 1. **BEGIN**: created by the manager with a snapshot of the log tail
/// 2. **READ/WRITE**: through a proxy, while `Active`
/// 3. **END**: the manager freezes the sets and validates
/// 4. **COMMIT/ABORT**: terminal; the context must not be reused
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,

    snapshot: Snapshot,
    isolation: IsolationLevel,
    hashing: KeyHashing,

    /// Conflict keys read from the snapshot
    read_set: FxHashSet<ConflictKey>,

    /// Buffered updates, invisible to other transactions until commit
    write_set: WriteSet,

    /// Newest log position already checked against this transaction
    ///
    /// Starts at the snapshot and advances as commit attempts scan newer
    /// entries, so a retried append only rescans what it has not seen.
    validated_to: LogPosition,

    /// Current transaction status
    pub status: TransactionStatus,

    /// Set when the transaction can no longer commit; reported by commit
    doomed: Option<AbortCause>,

    start_time: Instant,
}

impl TransactionContext {
    /// Create a new active transaction context
    ///
    /// # Example
    ///
    /// ```
    /// use strand_concurrency::TransactionContext;
    /// use strand_core::{IsolationLevel, KeyHashing, LogPosition, Snapshot};
    ///
    /// let snapshot = Snapshot::at(LogPosition::new(10));
    /// let txn = TransactionContext::new(1, snapshot, IsolationLevel::Snapshot, KeyHashing::default());
    /// assert!(txn.is_active());
    /// assert_eq!(txn.snapshot().position(), LogPosition::new(10));
    /// ```
    pub fn new(
        txn_id: u64,
        snapshot: Snapshot,
        isolation: IsolationLevel,
        hashing: KeyHashing,
    ) -> Self {
        TransactionContext {
            txn_id,
            snapshot,
            isolation,
            hashing,
            read_set: FxHashSet::default(),
            write_set: WriteSet::new(),
            validated_to: snapshot.position(),
            status: TransactionStatus::Active,
            doomed: None,
            start_time: Instant::now(),
        }
    }

    /// Snapshot this transaction reads at
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    /// Isolation level fixed at begin
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Policy used to derive conflict keys
    pub fn hashing(&self) -> KeyHashing {
        self.hashing
    }

    /// Conflict key for `(object, key)` under this transaction's policy
    pub fn conflict_key(&self, object: ObjectId, key: &Key) -> ConflictKey {
        self.hashing.conflict_key(object, key)
    }

    /// Conflict keys read from the snapshot
    pub fn read_set(&self) -> &FxHashSet<ConflictKey> {
        &self.read_set
    }

    /// Buffered updates
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Newest position already validated against
    pub fn validated_to(&self) -> LogPosition {
        self.validated_to
    }

    /// Record that validation has covered entries up to `position`
    pub fn advance_validated_to(&mut self, position: LogPosition) {
        if position > self.validated_to {
            self.validated_to = position;
        }
    }

    // === Recording ===

    /// Record a read of `(object, key)` from the snapshot
    ///
    /// # Errors
    /// Returns `TransactionNotActive` if the transaction is not active.
    pub fn record_read(&mut self, object: ObjectId, key: &Key) -> Result<()> {
        self.ensure_active()?;
        let ck = self.conflict_key(object, key);
        self.read_set.insert(ck);
        Ok(())
    }

    /// Buffer an update of `(object, key)`
    ///
    /// Shared state is not touched; the update becomes visible to others only
    /// through a committed log entry.
    ///
    /// # Errors
    /// Returns `TransactionNotActive` if the transaction is not active.
    pub fn record_write(&mut self, object: ObjectId, key: Key, op: UpdateOp) -> Result<()> {
        self.ensure_active()?;
        let ck = self.conflict_key(object, &key);
        self.write_set.record(object, key, op, ck);
        Ok(())
    }

    /// Check whether this transaction has buffered writes to `(object, key)`
    pub fn has_written(&self, object: &ObjectId, key: &Key) -> bool {
        self.write_set.writes_key(object, key)
    }

    // === State ===

    /// Check if transaction is active
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Check if the transaction reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.is_committed() || self.is_aborted()
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if transaction can accept operations
    ///
    /// # Errors
    /// - `TransactionNotActive` if not in `Active` state
    /// - `TransactionAborted` with the recorded cause if the transaction
    ///   was doomed
    pub fn ensure_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(self.not_active());
        }
        match self.doomed {
            Some(cause) => Err(StrandError::aborted(self.txn_id, cause)),
            None => Ok(()),
        }
    }

    /// Record that this transaction cannot commit
    ///
    /// The status stays `Active` until the owner ends, aborts or drops the
    /// transaction; further reads and writes fail and commit reports
    /// `cause` without touching the log. The first cause wins.
    pub fn doom(&mut self, cause: AbortCause) {
        if self.is_active() && self.doomed.is_none() {
            self.doomed = Some(cause);
        }
    }

    /// Cause recorded by [`doom`](Self::doom), if any
    pub fn doomed(&self) -> Option<AbortCause> {
        self.doomed
    }

    fn not_active(&self) -> StrandError {
        StrandError::TransactionNotActive {
            txn_id: self.txn_id,
            state: self.status.to_string(),
        }
    }

    /// Transition to Validating state, freezing read and write sets
    ///
    /// # State Transition
    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(self.not_active());
        }
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Transition to Committed state
    ///
    /// # State Transition
    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> Result<()> {
        match &self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(self.not_active()),
        }
    }

    /// Abort the transaction and discard buffered writes
    ///
    /// Can be called from `Active` (caller abort) or `Validating` (conflict
    /// or log failure). The read-set is kept for diagnostics.
    ///
    /// # State Transitions
    /// - `Active` → `Aborted`
    /// - `Validating` → `Aborted`
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.is_finished() {
            return Err(self.not_active());
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.write_set.clear();
        Ok(())
    }

    /// Get summary of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            writes: self.write_set.len(),
            written_keys: self.write_set.conflict_keys().len(),
            read_keys: self.read_set.len(),
        }
    }

    /// Number of conflict keys read
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of buffered updates
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Check if nothing was written
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty()
    }

    /// Reason for abort, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("snapshot", &self.snapshot)
            .field("isolation", &self.isolation)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("status", &self.status)
            .field("doomed", &self.doomed)
            .finish()
    }
}
