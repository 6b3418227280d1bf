//! Transaction handle
//!
//! A [`Transaction`] owns its context and the binding on its session. It is
//! finished exactly once:
//! - `end()` commits (or reports the abort)
//! - `abort()` discards buffered writes
//! - dropping an unfinished handle abandons it the same way as `abort()`
//!
//! In every case the session binding is released before control returns
//! to the caller, and nothing reaches the log unless the commit succeeds.

use crate::database::Database;
use crate::session::Session;
use strand_concurrency::{CommitInfo, PendingOperations, TransactionContext, VersionedObjectProxy};
use strand_core::{IsolationLevel, Key, ObjectId, Result, Snapshot, UpdateOp, Value};

/// An active optimistic transaction
pub struct Transaction {
    db: Database,
    session: Session,
    ctx: TransactionContext,
    finished: bool,
}

impl Transaction {
    pub(crate) fn new(db: Database, session: Session, ctx: TransactionContext) -> Self {
        Self {
            db,
            session,
            ctx,
            finished: false,
        }
    }

    /// Transaction id
    pub fn id(&self) -> u64 {
        self.ctx.txn_id
    }

    /// Snapshot all reads are taken at
    pub fn snapshot(&self) -> Snapshot {
        self.ctx.snapshot()
    }

    /// Isolation level chosen at begin
    pub fn isolation(&self) -> IsolationLevel {
        self.ctx.isolation()
    }

    /// Session this transaction is bound to
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Underlying context
    pub fn context(&self) -> &TransactionContext {
        &self.ctx
    }

    /// Check if the transaction still accepts operations
    pub fn is_active(&self) -> bool {
        self.ctx.is_active()
    }

    /// View of `object` through this transaction
    pub fn object(&mut self, object: ObjectId) -> VersionedObjectProxy<'_> {
        VersionedObjectProxy::new(&mut self.ctx, &self.db.inner.versions, object)
    }

    /// Read `key` of `object` at the snapshot, seeing this transaction's writes
    pub fn read(&mut self, object: ObjectId, key: impl Into<Key>) -> Result<Option<Value>> {
        self.object(object).read(&key.into())
    }

    /// Check whether `key` of `object` is present
    pub fn contains(&mut self, object: ObjectId, key: impl Into<Key>) -> Result<bool> {
        self.object(object).contains(&key.into())
    }

    /// Buffer an update of `key` of `object`
    pub fn write(&mut self, object: ObjectId, key: impl Into<Key>, op: UpdateOp) -> Result<()> {
        self.object(object).write(key.into(), op)
    }

    /// Buffer a put
    pub fn put(
        &mut self,
        object: ObjectId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.object(object).put(key, value)
    }

    /// Buffer a removal
    pub fn remove(&mut self, object: ObjectId, key: impl Into<Key>) -> Result<()> {
        self.object(object).remove(key)
    }

    /// Buffer an increment
    pub fn increment(&mut self, object: ObjectId, key: impl Into<Key>, delta: i64) -> Result<()> {
        self.object(object).increment(key, delta)
    }

    /// Summary of buffered reads and writes
    pub fn pending_operations(&self) -> PendingOperations {
        self.ctx.pending_operations()
    }

    /// Commit
    ///
    /// # Errors
    ///
    /// `TransactionAborted` when the transaction could not be serialized
    /// after the entries committed since its snapshot, or the log prevented
    /// validation. The caller may begin a new transaction and try again.
    pub fn end(mut self) -> Result<CommitInfo> {
        let result = self.db.inner.manager.commit(&mut self.ctx);
        self.finish();
        result
    }

    /// Abort, discarding buffered writes
    pub fn abort(mut self) -> Result<()> {
        let result = self.db.inner.manager.abort(&mut self.ctx, "aborted by caller");
        self.finish();
        result
    }

    fn finish(&mut self) {
        self.finished = true;
        self.session.release(self.ctx.txn_id);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.db.inner.manager.abandon(&mut self.ctx);
        self.finish();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("ctx", &self.ctx)
            .field("finished", &self.finished)
            .finish()
    }
}
