//! Version cache for snapshot reads
//!
//! Materializes committed log entries into per-key version chains so a
//! transaction can read the value of any key as of its snapshot.
//!
//! # Design
//!
//! - DashMap keyed by `(ObjectId, Key)`: sharded, readers never block writers
//! - Each chain holds `(position, value)` pairs in increasing position order
//! - `synced` is the position up to which every chain is complete
//!
//! Chains are append-only: versions are added as the cache catches up with
//! the log and never removed. A read at snapshot `S` first makes sure the
//! cache is synced to at least `S`, then takes the newest version at a
//! position `<= S`.
//!
//! Catching up is serialized by `sync_lock`, which is private to the cache
//! and never held by the commit path.
//!
//! An entry is applied as a whole: all of its new values are computed
//! before any chain is touched, so a failing update leaves the cache exactly
//! at the previous entry.

use crate::semantics::ObjectSemantics;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strand_core::{Key, LogPosition, ObjectId, Result, Snapshot, Value};
use strand_log::{SharedLog, Update, WriteSet};

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Versions of one key, oldest first
#[derive(Debug, Default)]
struct VersionChain {
    versions: Vec<(LogPosition, Option<Value>)>,
}

impl VersionChain {
    fn latest(&self) -> Option<&Value> {
        self.versions.last().and_then(|(_, v)| v.as_ref())
    }

    fn at(&self, snapshot: &Snapshot) -> Option<&Value> {
        // Versions are sorted by position; find the last one visible.
        let idx = self
            .versions
            .partition_point(|(pos, _)| snapshot.includes(*pos));
        if idx == 0 {
            return None;
        }
        self.versions[idx - 1].1.as_ref()
    }

    fn push(&mut self, position: LogPosition, value: Option<Value>) {
        match self.versions.last_mut() {
            // One version per entry; re-applying an entry replaces it
            Some((last, slot)) if *last == position => *slot = value,
            _ => self.versions.push((position, value)),
        }
    }
}

/// Snapshot-readable materialization of the shared log
pub struct VersionCache {
    log: Arc<dyn SharedLog>,
    semantics: Arc<dyn ObjectSemantics>,
    chains: DashMap<(ObjectId, Key), VersionChain, FxBuildHasher>,
    synced: AtomicU64,
    sync_lock: Mutex<()>,
}

impl VersionCache {
    /// Create an empty cache over `log`
    pub fn new(log: Arc<dyn SharedLog>, semantics: Arc<dyn ObjectSemantics>) -> Self {
        Self {
            log,
            semantics,
            chains: DashMap::with_hasher(FxBuildHasher::default()),
            synced: AtomicU64::new(0),
            sync_lock: Mutex::new(()),
        }
    }

    /// Semantics used to apply updates
    pub fn semantics(&self) -> &dyn ObjectSemantics {
        self.semantics.as_ref()
    }

    /// Position up to which the cache is complete
    #[inline]
    pub fn synced_to(&self) -> LogPosition {
        LogPosition::new(self.synced.load(Ordering::Acquire))
    }

    /// Number of keys with at least one version
    pub fn key_count(&self) -> usize {
        self.chains.len()
    }

    /// Value of `(object, key)` as of `snapshot`
    ///
    /// # Errors
    ///
    /// `StaleSnapshot` if the cache has to catch up over a trimmed range,
    /// `LogUnavailable` if the log read fails.
    pub fn value_at(&self, object: &ObjectId, key: &Key, snapshot: &Snapshot) -> Result<Option<Value>> {
        if self.synced_to() < snapshot.position() {
            self.sync_to(snapshot.position())?;
        }
        Ok(self
            .chains
            .get(&(*object, key.clone()))
            .and_then(|chain| chain.at(snapshot).cloned()))
    }

    /// Catch up with the log until at least `target` is materialized
    ///
    /// Everything currently in the log is applied, which may go past
    /// `target`.
    pub fn sync_to(&self, target: LogPosition) -> Result<LogPosition> {
        let _guard = self.sync_lock.lock();

        let from = self.synced_to();
        if from >= target {
            return Ok(from);
        }

        let entries = self.log.read_entries_after(from)?;
        let mut synced = from;
        for entry in &entries {
            let position = entry.position();
            let staged = self.apply_all(entry.write_set().updates(), |object, key| {
                Ok(self
                    .chains
                    .get(&(*object, key.clone()))
                    .and_then(|chain| chain.latest().cloned()))
            })?;
            for (slot, value) in staged {
                self.chains.entry(slot).or_default().push(position, value);
            }
            synced = position;
            // Publish entry by entry so a failure leaves a consistent prefix
            self.synced.store(synced.as_u64(), Ordering::Release);
        }

        tracing::trace!(
            from = from.as_u64(),
            to = synced.as_u64(),
            entries = entries.len(),
            "version cache synced"
        );
        Ok(synced)
    }

    /// Check that `write_set` applies cleanly on top of the values at `at`
    ///
    /// Nothing is stored. Returns the semantics' error for the first update
    /// that cannot be applied.
    pub fn check_write_set(&self, write_set: &WriteSet, at: LogPosition) -> Result<()> {
        let snapshot = Snapshot::at(at);
        self.apply_all(write_set.updates(), |object, key| {
            self.value_at(object, key, &snapshot)
        })?;
        Ok(())
    }

    /// Apply `updates` in order, reading each key's starting value from `base`
    fn apply_all(
        &self,
        updates: &[Update],
        mut base: impl FnMut(&ObjectId, &Key) -> Result<Option<Value>>,
    ) -> Result<FxHashMap<(ObjectId, Key), Option<Value>>> {
        let mut staged: FxHashMap<(ObjectId, Key), Option<Value>> = FxHashMap::default();
        for update in updates {
            let slot = (update.object, update.key.clone());
            let current = match staged.get(&slot) {
                Some(value) => value.clone(),
                None => base(&update.object, &update.key)?,
            };
            let next = self.semantics.apply_update(
                &update.object,
                &update.key,
                current.as_ref(),
                &update.op,
            )?;
            staged.insert(slot, next);
        }
        Ok(staged)
    }
}

impl std::fmt::Debug for VersionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionCache")
            .field("synced", &self.synced_to())
            .field("keys", &self.chains.len())
            .finish()
    }
}
