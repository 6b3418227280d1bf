//! Commit-time conflict detection
//!
//! Given a frozen transaction (snapshot `S`, read-set `R`, write-set `W`,
//! isolation `I`) and the log entries committed after `S`, decide whether the
//! transaction can be serialized after them.
//!
//! ## Rules
//!
//! For each entry `E` with position `> S`, oldest first:
//! - `WriteAfterWrite`: conflict iff `W ∩ E.W ≠ ∅`
//! - `Snapshot`: conflict iff `(W ∪ R) ∩ E.W ≠ ∅`
//!
//! The scan stops at the first conflicting entry. Keys are compared as
//! conflict keys, so a digest collision between two distinct keys counts as
//! a conflict.

use crate::transaction::TransactionContext;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::Arc;
use strand_core::{ConflictKey, ConflictKind, IsolationLevel, LogPosition};
use strand_log::CommitLogEntry;

/// A conflict found against one committed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Position of the conflicting entry
    pub position: LogPosition,
    /// Transaction that committed the conflicting entry
    pub winner_txn_id: u64,
    /// `WriteWrite` if any written key overlaps, otherwise `ReadWrite`
    pub kind: ConflictKind,
    /// Overlapping conflict keys, sorted
    pub keys: Vec<ConflictKey>,
}

/// Outcome of validating against a run of entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// First conflict found, if any
    pub conflict: Option<Conflict>,
    /// Newest position examined without conflict
    pub validated_to: LogPosition,
    /// Entries examined
    pub entries_scanned: usize,
}

impl ValidationResult {
    /// Check if the transaction may proceed to append
    pub fn is_valid(&self) -> bool {
        self.conflict.is_none()
    }
}

/// Written keys of `txn` that `entry` also wrote
pub fn validate_write_set(
    txn: &TransactionContext,
    entry: &CommitLogEntry,
) -> SmallVec<[ConflictKey; 4]> {
    intersect(txn.write_set().conflict_keys(), entry)
}

/// Read keys of `txn` that `entry` wrote
///
/// Always empty under `WriteAfterWrite`, which ignores reads.
pub fn validate_read_set(
    txn: &TransactionContext,
    entry: &CommitLogEntry,
) -> SmallVec<[ConflictKey; 4]> {
    match txn.isolation() {
        IsolationLevel::Snapshot => intersect(txn.read_set(), entry),
        IsolationLevel::WriteAfterWrite => SmallVec::new(),
    }
}

fn intersect(keys: &FxHashSet<ConflictKey>, entry: &CommitLogEntry) -> SmallVec<[ConflictKey; 4]> {
    let theirs = entry.write_set().conflict_keys();
    // Probe the smaller set against the larger one
    if keys.len() <= theirs.len() {
        keys.iter().filter(|k| theirs.contains(*k)).cloned().collect()
    } else {
        theirs.iter().filter(|k| keys.contains(*k)).cloned().collect()
    }
}

/// Check one entry against `txn`
pub fn check_entry(txn: &TransactionContext, entry: &CommitLogEntry) -> Option<Conflict> {
    let write_write = validate_write_set(txn, entry);
    let read_write = validate_read_set(txn, entry);
    if write_write.is_empty() && read_write.is_empty() {
        return None;
    }

    let kind = if write_write.is_empty() {
        ConflictKind::ReadWrite
    } else {
        ConflictKind::WriteWrite
    };
    let mut keys: Vec<ConflictKey> = write_write.into_iter().chain(read_write).collect();
    keys.sort();
    keys.dedup();

    Some(Conflict {
        position: entry.position(),
        winner_txn_id: entry.txn_id(),
        kind,
        keys,
    })
}

/// Validate `txn` against `entries`
///
/// `entries` must be in increasing position order. Entries at or before the
/// transaction's snapshot are skipped. Scanning stops at the first conflict.
pub fn validate_transaction(
    txn: &TransactionContext,
    entries: &[Arc<CommitLogEntry>],
) -> ValidationResult {
    let snapshot = txn.snapshot();
    let mut validated_to = txn.validated_to();
    let mut entries_scanned = 0;

    for entry in entries {
        if snapshot.includes(entry.position()) {
            continue;
        }
        entries_scanned += 1;
        if let Some(conflict) = check_entry(txn, entry) {
            return ValidationResult {
                conflict: Some(conflict),
                validated_to,
                entries_scanned,
            };
        }
        validated_to = validated_to.max(entry.position());
    }

    ValidationResult {
        conflict: None,
        validated_to,
        entries_scanned,
    }
}
