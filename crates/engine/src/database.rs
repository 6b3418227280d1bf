//! Database: the engine entry point
//!
//! A `Database` ties together:
//! - the shared log (source of truth for what committed, in what order)
//! - the version cache (snapshot reads over the log)
//! - the transaction manager (validation and conditional append)
//!
//! `Database` is a cheap handle; clones share all state and may be sent to
//! other threads.
//!
//! # Example
//!
//! ```ignore
//! let db = Database::open_in_memory()?;
//! let session = db.session();
//! let accounts = ObjectId::named("accounts");
//!
//! let mut txn = db.begin(&session, IsolationLevel::Snapshot)?;
//! txn.put(accounts, "alice", 100)?;
//! txn.end()?;
//! ```

use crate::config::EngineConfig;
use crate::session::Session;
use crate::transaction::Transaction;
use std::sync::Arc;
use strand_concurrency::{
    CommitStats, KvSemantics, ObjectSemantics, TransactionManager, VersionCache,
};
use strand_core::{IsolationLevel, Key, LogPosition, ObjectId, Result, Snapshot, StrandError, Value};
use strand_log::{InMemoryLog, SharedLog};

pub(crate) struct DatabaseInner {
    pub(crate) config: EngineConfig,
    pub(crate) log: Arc<dyn SharedLog>,
    pub(crate) versions: Arc<VersionCache>,
    pub(crate) manager: TransactionManager,
}

/// Transactional view of a shared log
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open over a fresh in-memory log with key/value semantics
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::with_log(Arc::new(InMemoryLog::new()), Arc::new(KvSemantics), config)
    }

    /// Open over a fresh in-memory log with the default configuration
    pub fn open_in_memory() -> Result<Self> {
        Self::open(EngineConfig::default())
    }

    /// Open over an existing log
    ///
    /// Entries already in the log are visible to the first snapshot.
    pub fn with_log(
        log: Arc<dyn SharedLog>,
        semantics: Arc<dyn ObjectSemantics>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let versions = Arc::new(VersionCache::new(log.clone(), semantics));
        let manager =
            TransactionManager::new(log.clone(), config.key_hashing, config.commit_policy())
                .with_version_cache(versions.clone());

        tracing::info!(
            isolation = config.isolation.as_str(),
            key_hashing = ?config.key_hashing,
            tail = log.tail()?.as_u64(),
            "database opened"
        );
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                log,
                versions,
                manager,
            }),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Underlying log
    pub fn log(&self) -> &Arc<dyn SharedLog> {
        &self.inner.log
    }

    /// Current log tail
    pub fn tail(&self) -> Result<LogPosition> {
        self.inner.log.tail()
    }

    /// New execution context
    pub fn session(&self) -> Session {
        Session::new()
    }

    /// Begin a transaction on `session`
    ///
    /// # Errors
    ///
    /// `NestedTransaction` if `session` already has an active transaction.
    pub fn begin(&self, session: &Session, isolation: IsolationLevel) -> Result<Transaction> {
        if let Some(active_txn_id) = session.active_transaction() {
            return Err(StrandError::NestedTransaction { active_txn_id });
        }
        let ctx = self.inner.manager.begin(isolation)?;
        // A clone of the session may have bound since the check above
        if let Err(err) = session.bind(ctx.txn_id) {
            self.inner.manager.discard(ctx);
            return Err(err);
        }
        Ok(Transaction::new(self.clone(), session.clone(), ctx))
    }

    /// Begin a transaction at the configured default isolation
    pub fn begin_default(&self, session: &Session) -> Result<Transaction> {
        self.begin(session, self.inner.config.isolation)
    }

    /// Run `f` in a transaction
    ///
    /// Commits when `f` returns `Ok`, abandons the transaction when it
    /// returns `Err`. The closure runs once; an aborted commit is returned
    /// to the caller, who decides whether to try again.
    pub fn transaction<T, F>(&self, session: &Session, isolation: IsolationLevel, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut txn = self.begin(session, isolation)?;
        match f(&mut txn) {
            Ok(value) => {
                txn.end()?;
                Ok(value)
            }
            Err(err) => {
                drop(txn);
                Err(err)
            }
        }
    }

    /// Latest committed value of `(object, key)`, outside any transaction
    pub fn read_committed(&self, object: ObjectId, key: impl Into<Key>) -> Result<Option<Value>> {
        let snapshot = Snapshot::at(self.inner.log.tail()?);
        self.inner.versions.value_at(&object, &key.into(), &snapshot)
    }

    /// Commit counters
    pub fn stats(&self) -> CommitStats {
        self.inner.manager.stats()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .field("versions", &self.inner.versions)
            .field("manager", &self.inner.manager)
            .finish()
    }
}
