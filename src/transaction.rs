//! Transactions and typed map views.
//!
//! # Example
//!
//! ```ignore
//! use strand::prelude::*;
//!
//! let db = Strand::open_in_memory()?;
//! let session = db.session();
//! let accounts = ObjectId::named("accounts");
//!
//! let mut txn = db.begin(&session)?;
//! let mut map = txn.map(accounts);
//! let balance = map.get("alice")?.and_then(|v| v.as_int()).unwrap_or(0);
//! map.put("alice", balance + 10)?;
//! txn.end()?;
//! ```

use crate::error::Result;
use strand_core::{IsolationLevel, Key, ObjectId, Snapshot, UpdateOp, Value};
use strand_engine::{CommitInfo, Session};

/// An optimistic transaction.
///
/// Dropping a transaction without calling [`end`](Transaction::end) or
/// [`abort`](Transaction::abort) abandons it.
#[derive(Debug)]
pub struct Transaction {
    inner: strand_engine::Transaction,
}

impl Transaction {
    pub(crate) fn new(inner: strand_engine::Transaction) -> Self {
        Self { inner }
    }

    /// Transaction id.
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Snapshot reads are taken at.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }

    /// Isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.inner.isolation()
    }

    /// Session the transaction is bound to.
    pub fn session(&self) -> &Session {
        self.inner.session()
    }

    /// Map view of `object`.
    pub fn map(&mut self, object: ObjectId) -> TxMap<'_> {
        TxMap { txn: self, object }
    }

    /// Read `key` of `object`.
    pub fn read(&mut self, object: ObjectId, key: impl Into<Key>) -> Result<Option<Value>> {
        Ok(self.inner.read(object, key)?)
    }

    /// Buffer an update of `key` of `object`.
    pub fn write(&mut self, object: ObjectId, key: impl Into<Key>, op: UpdateOp) -> Result<()> {
        Ok(self.inner.write(object, key, op)?)
    }

    /// Number of buffered updates.
    pub fn pending_writes(&self) -> usize {
        self.inner.pending_operations().writes
    }

    /// Commit.
    ///
    /// On [`Error::Aborted`](crate::Error::Aborted) nothing was written; the
    /// caller may begin a new transaction and try again.
    pub fn end(self) -> Result<CommitInfo> {
        Ok(self.inner.end()?)
    }

    /// Abort, discarding buffered writes.
    pub fn abort(self) -> Result<()> {
        Ok(self.inner.abort()?)
    }

    pub(crate) fn engine_mut(&mut self) -> &mut strand_engine::Transaction {
        &mut self.inner
    }
}

/// Key/value view of one object through one transaction.
///
/// Reads see the transaction's snapshot plus its own buffered writes.
pub struct TxMap<'t> {
    txn: &'t mut Transaction,
    object: ObjectId,
}

impl TxMap<'_> {
    /// Object this view reads and writes.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Get a value.
    ///
    /// Returns `None` if the key doesn't exist.
    pub fn get(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.txn.read(self.object, key)
    }

    /// Check if a key exists.
    pub fn contains_key(&mut self, key: impl Into<Key>) -> Result<bool> {
        Ok(self.txn.engine_mut().contains(self.object, key)?)
    }

    /// Set a value.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        Ok(self.txn.engine_mut().put(self.object, key, value)?)
    }

    /// Delete a key.
    pub fn remove(&mut self, key: impl Into<Key>) -> Result<()> {
        Ok(self.txn.engine_mut().remove(self.object, key)?)
    }

    /// Add `delta` to an integer (absent counts as 0).
    pub fn increment(&mut self, key: impl Into<Key>, delta: i64) -> Result<()> {
        Ok(self.txn.engine_mut().increment(self.object, key, delta)?)
    }
}
