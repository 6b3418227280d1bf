//! Object semantics
//!
//! The engine decides *whether* a transaction may commit; it never decides
//! what an update *means*. That is delegated to an [`ObjectSemantics`]
//! implementation, which is consulted:
//! - when a write is buffered (`validate_update`)
//! - when a transaction reads a key it already wrote (read-your-writes)
//! - at commit, to check the write-set applies before it is appended
//! - when committed entries are materialized into the version cache
//!
//! [`KvSemantics`] is the stock implementation: a key/value map with
//! integer counters.

use strand_core::{Key, ObjectId, Result, StrandError, UpdateOp, Value};

/// Meaning of buffered updates
pub trait ObjectSemantics: Send + Sync {
    /// Reject updates that can never be applied
    ///
    /// Called at write time. Updates that depend on the current value are
    /// checked against it at commit, before the entry is appended.
    fn validate_update(&self, object: &ObjectId, key: &Key, op: &UpdateOp) -> Result<()>;

    /// Apply `op` to the current value of `(object, key)`
    ///
    /// `current` is `None` when the key is absent. Returning `None` removes
    /// the key.
    fn apply_update(
        &self,
        object: &ObjectId,
        key: &Key,
        current: Option<&Value>,
        op: &UpdateOp,
    ) -> Result<Option<Value>>;
}

/// Key/value map semantics
///
/// - `Put(v)` stores `v`
/// - `Remove` deletes the key
/// - `Increment(n)` adds `n` to an `Int` (absent counts as 0, overflow is
///   rejected)
#[derive(Debug, Clone, Copy, Default)]
pub struct KvSemantics;

impl ObjectSemantics for KvSemantics {
    fn validate_update(&self, _object: &ObjectId, _key: &Key, op: &UpdateOp) -> Result<()> {
        match op {
            UpdateOp::Put(Value::Float(f)) if f.is_nan() => {
                Err(StrandError::invalid_update("NaN cannot be stored"))
            }
            _ => Ok(()),
        }
    }

    fn apply_update(
        &self,
        _object: &ObjectId,
        key: &Key,
        current: Option<&Value>,
        op: &UpdateOp,
    ) -> Result<Option<Value>> {
        match op {
            UpdateOp::Put(value) => Ok(Some(value.clone())),
            UpdateOp::Remove => Ok(None),
            UpdateOp::Increment(delta) => {
                let base = match current {
                    None => 0,
                    Some(Value::Int(n)) => *n,
                    Some(other) => {
                        return Err(StrandError::invalid_update(format!(
                            "cannot increment {} value of key {}",
                            other.type_name(),
                            key
                        )))
                    }
                };
                base.checked_add(*delta).map(|n| Some(Value::Int(n))).ok_or_else(|| {
                    StrandError::invalid_update(format!("increment of key {} overflows", key))
                })
            }
        }
    }
}
