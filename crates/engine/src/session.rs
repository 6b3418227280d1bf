//! Execution contexts
//!
//! A [`Session`] stands for one caller's execution context (typically one
//! thread). It carries at most one active transaction; `begin` on a session
//! that already has one fails with `NestedTransaction`.
//!
//! Sessions are cheap to clone. Clones share the binding, so a clone sent to
//! another thread is still the same execution context.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::{Result, StrandError};

/// No transaction bound (transaction ids start at 1)
const UNBOUND: u64 = 0;

#[derive(Debug, Default)]
struct SessionState {
    active: AtomicU64,
}

/// Caller execution context holding at most one active transaction
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<SessionState>,
}

impl Session {
    /// Create a session with no active transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the transaction bound to this session
    pub fn active_transaction(&self) -> Option<u64> {
        match self.state.active.load(Ordering::Acquire) {
            UNBOUND => None,
            txn_id => Some(txn_id),
        }
    }

    /// Check whether a transaction is bound
    pub fn in_transaction(&self) -> bool {
        self.active_transaction().is_some()
    }

    /// Check whether two handles are the same execution context
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Bind `txn_id` if nothing is bound
    pub(crate) fn bind(&self, txn_id: u64) -> Result<()> {
        self.state
            .active
            .compare_exchange(UNBOUND, txn_id, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|active_txn_id| StrandError::NestedTransaction { active_txn_id })
    }

    /// Unbind `txn_id`; a different binding is left alone
    pub(crate) fn release(&self, txn_id: u64) {
        let _ = self.state.active.compare_exchange(
            txn_id,
            UNBOUND,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
