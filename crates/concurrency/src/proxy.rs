//! Versioned object proxy
//!
//! A [`VersionedObjectProxy`] is the view of one shared object through one
//! transaction. It reads at the transaction's snapshot and buffers writes in
//! the transaction's write-set.
//!
//! # Read-Your-Writes
//!
//! When reading a key, the proxy checks in order:
//! 1. **write_set**: if this transaction wrote the key, the snapshot value
//!    with the buffered updates applied in order - NO read_set entry
//! 2. **snapshot**: the newest committed version at or before the
//!    snapshot - tracked in read_set

use crate::semantics::ObjectSemantics;
use crate::transaction::TransactionContext;
use crate::versions::VersionCache;
use strand_core::{AbortCause, Key, ObjectId, Result, StrandError, UpdateOp, Value};

/// One object seen through one transaction
pub struct VersionedObjectProxy<'t> {
    txn: &'t mut TransactionContext,
    versions: &'t VersionCache,
    object: ObjectId,
}

impl<'t> VersionedObjectProxy<'t> {
    /// Bind `object` to `txn`
    pub fn new(txn: &'t mut TransactionContext, versions: &'t VersionCache, object: ObjectId) -> Self {
        Self {
            txn,
            versions,
            object,
        }
    }

    /// Object this proxy reads and writes
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Value of `key` as this transaction sees it
    ///
    /// # Errors
    /// - `TransactionNotActive` if the transaction already ended
    /// - `TransactionAborted` with `StaleSnapshot` if the snapshot was
    ///   trimmed before the cache could reach it; the transaction is doomed
    ///   and its commit reports the same cause
    /// - `LogUnavailable` from the version cache
    pub fn read(&mut self, key: &Key) -> Result<Option<Value>> {
        self.txn.ensure_active()?;

        let snapshot = self.txn.snapshot();
        let committed = match self.versions.value_at(&self.object, key, &snapshot) {
            Ok(value) => value,
            Err(StrandError::StaleSnapshot { .. }) => {
                self.txn.doom(AbortCause::StaleSnapshot);
                return Err(StrandError::aborted(self.txn.txn_id, AbortCause::StaleSnapshot));
            }
            Err(err) => return Err(err),
        };

        if self.txn.has_written(&self.object, key) {
            return self.apply_buffered(key, committed);
        }

        self.txn.record_read(self.object, key)?;
        Ok(committed)
    }

    /// Check whether `key` is present as this transaction sees it
    pub fn contains(&mut self, key: &Key) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Buffer an update of `key`
    ///
    /// Updates that can never apply are rejected now. Whether the update
    /// applies to the value it will actually meet is checked again at commit.
    pub fn write(&mut self, key: Key, op: UpdateOp) -> Result<()> {
        self.txn.ensure_active()?;
        self.versions
            .semantics()
            .validate_update(&self.object, &key, &op)?;
        self.txn.record_write(self.object, key, op)
    }

    /// Buffer `Put(value)`
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.write(key.into(), UpdateOp::Put(value.into()))
    }

    /// Buffer `Remove`
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<()> {
        self.write(key.into(), UpdateOp::Remove)
    }

    /// Buffer `Increment(delta)`
    pub fn increment(&mut self, key: impl Into<Key>, delta: i64) -> Result<()> {
        self.write(key.into(), UpdateOp::Increment(delta))
    }

    fn apply_buffered(&self, key: &Key, base: Option<Value>) -> Result<Option<Value>> {
        let semantics: &dyn ObjectSemantics = self.versions.semantics();
        let mut current = base;
        for op in self.txn.write_set().updates_for(&self.object, key) {
            current = semantics.apply_update(&self.object, key, current.as_ref(), op)?;
        }
        Ok(current)
    }
}
