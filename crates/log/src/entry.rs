//! Commit log entry types
//!
//! This module defines the payload a successful commit appends:
//! - [`Update`]: one buffered mutation of one key
//! - [`WriteSet`]: all updates of a transaction plus their conflict keys
//! - [`CommitLogEntry`]: a write-set stamped with its global position
//!
//! Entries are immutable once appended. Validation reads only the conflict
//! keys of an entry; materialization reads only its updates.

use rustc_hash::FxHashSet;
use strand_core::{ConflictKey, IsolationLevel, Key, LogPosition, ObjectId, UpdateOp};

/// One buffered mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Object the update targets
    pub object: ObjectId,
    /// Key within the object
    pub key: Key,
    /// Mutation to apply
    pub op: UpdateOp,
}

/// Updates of one transaction, in write order, with their conflict keys
///
/// Grows while the owning transaction is active; frozen when it ends and
/// stored verbatim in the log entry on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    updates: Vec<Update>,
    conflict_keys: FxHashSet<ConflictKey>,
}

impl WriteSet {
    /// Create an empty write-set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an update and record its conflict key
    pub fn record(&mut self, object: ObjectId, key: Key, op: UpdateOp, conflict_key: ConflictKey) {
        self.conflict_keys.insert(conflict_key);
        self.updates.push(Update { object, key, op });
    }

    /// All updates in the order they were written
    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    /// Updates touching `(object, key)`, in write order
    pub fn updates_for<'a>(
        &'a self,
        object: &'a ObjectId,
        key: &'a Key,
    ) -> impl Iterator<Item = &'a UpdateOp> + 'a {
        self.updates
            .iter()
            .filter(move |u| &u.object == object && &u.key == key)
            .map(|u| &u.op)
    }

    /// Check whether `(object, key)` was written (exact key comparison)
    pub fn writes_key(&self, object: &ObjectId, key: &Key) -> bool {
        self.updates
            .iter()
            .any(|u| &u.object == object && &u.key == key)
    }

    /// Conflict keys of every written key
    pub fn conflict_keys(&self) -> &FxHashSet<ConflictKey> {
        &self.conflict_keys
    }

    /// Check whether a conflict key is covered by this write-set
    pub fn contains(&self, conflict_key: &ConflictKey) -> bool {
        self.conflict_keys.contains(conflict_key)
    }

    /// Number of buffered updates
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Drop all buffered updates, keeping allocated capacity
    pub fn clear(&mut self) {
        self.updates.clear();
        self.conflict_keys.clear();
    }
}

/// An appended transaction record
#[derive(Debug, Clone)]
pub struct CommitLogEntry {
    position: LogPosition,
    txn_id: u64,
    isolation: IsolationLevel,
    write_set: WriteSet,
}

impl CommitLogEntry {
    /// Stamp a frozen write-set with its position
    pub fn new(
        position: LogPosition,
        txn_id: u64,
        isolation: IsolationLevel,
        write_set: WriteSet,
    ) -> Self {
        Self {
            position,
            txn_id,
            isolation,
            write_set,
        }
    }

    /// Global position of this entry
    pub fn position(&self) -> LogPosition {
        self.position
    }

    /// Transaction that produced this entry
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Isolation level the committing transaction ran under
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// The committed write-set
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }
}
