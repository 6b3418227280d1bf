//! Main database entry point for Strand.
//!
//! This module provides the `Strand` struct, the primary entry point for
//! all transactional operations.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strand_core::{IsolationLevel, Key, KeyHashing, LogPosition, ObjectId, Value};
use strand_engine::{EngineConfig, ObjectSemantics, Session};
use strand_log::SharedLog;

/// A transactional view of a shared log.
///
/// Create one with [`Strand::open_in_memory`] or [`Strand::builder`].
/// `Strand` is cheap to clone; clones share the log and all state.
///
/// # Example
///
/// ```ignore
/// use strand::prelude::*;
///
/// let db = Strand::builder()
///     .isolation(IsolationLevel::WriteAfterWrite)
///     .open()?;
///
/// let session = db.session();
/// let counters = ObjectId::named("counters");
/// db.transaction(&session, |txn| txn.map(counters).increment("hits", 1))?;
/// ```
#[derive(Debug, Clone)]
pub struct Strand {
    inner: strand_engine::Database,
}

impl Strand {
    /// Open over a fresh in-memory log with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::builder().open()
    }

    /// Open over a fresh in-memory log, configured from a TOML file.
    pub fn open_with_config(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().config_file(path)?.open()
    }

    /// Create a builder for database configuration.
    pub fn builder() -> StrandBuilder {
        StrandBuilder::new()
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        self.inner.config()
    }

    /// Current log tail.
    pub fn tail(&self) -> Result<LogPosition> {
        Ok(self.inner.tail()?)
    }

    /// New execution context.
    ///
    /// Each thread issuing transactions should use its own session.
    pub fn session(&self) -> Session {
        self.inner.session()
    }

    /// Begin a transaction at the configured isolation level.
    pub fn begin(&self, session: &Session) -> Result<Transaction> {
        Ok(Transaction::new(self.inner.begin_default(session)?))
    }

    /// Begin a transaction at `isolation`.
    pub fn begin_with(&self, session: &Session, isolation: IsolationLevel) -> Result<Transaction> {
        Ok(Transaction::new(self.inner.begin(session, isolation)?))
    }

    /// Run `f` in a transaction at the configured isolation level.
    ///
    /// Commits when `f` returns `Ok`, abandons when it returns `Err`.
    /// The closure is not re-run after an abort.
    pub fn transaction<T, F>(&self, session: &Session, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut txn = self.begin(session)?;
        let value = f(&mut txn)?;
        txn.end()?;
        Ok(value)
    }

    /// Latest committed value, outside any transaction.
    pub fn read_committed(&self, object: ObjectId, key: impl Into<Key>) -> Result<Option<Value>> {
        Ok(self.inner.read_committed(object, key)?)
    }

    /// Get database metrics.
    pub fn metrics(&self) -> DatabaseMetrics {
        let stats = self.inner.stats();
        let aborted =
            stats.conflict_aborts + stats.other_aborts + stats.user_aborts + stats.abandoned;
        let finished = stats.committed + aborted;
        DatabaseMetrics {
            transactions_started: stats.started,
            transactions_committed: stats.committed,
            transactions_aborted: aborted,
            conflict_aborts: stats.conflict_aborts,
            abandoned: stats.abandoned,
            read_only_commits: stats.read_only_commits,
            tail_races: stats.tail_races,
            transient_retries: stats.transient_retries,
            commit_rate: if finished == 0 {
                0.0
            } else {
                stats.committed as f64 / finished as f64
            },
        }
    }
}

/// Database metrics.
#[derive(Debug, Clone)]
pub struct DatabaseMetrics {
    /// Transactions begun
    pub transactions_started: u64,
    /// Total committed transactions
    pub transactions_committed: u64,
    /// Total aborted transactions, abandoned ones included
    pub transactions_aborted: u64,
    /// Aborts caused by conflicts
    pub conflict_aborts: u64,
    /// Transactions dropped without `end` or `abort`
    pub abandoned: u64,
    /// Commits that appended nothing
    pub read_only_commits: u64,
    /// Appends that lost a race for the tail and were revalidated
    pub tail_races: u64,
    /// Transient log failures retried
    pub transient_retries: u64,
    /// Commit success rate (0.0 - 1.0)
    pub commit_rate: f64,
}

/// Builder for database configuration.
///
/// # Example
///
/// ```ignore
/// // Exact key comparison, never a false abort
/// let db = Strand::builder().exact_keys().open()?;
///
/// // Narrow digests over a caller-supplied log
/// let db = Strand::builder()
///     .fingerprint_bits(8)
///     .log(log.clone())
///     .open()?;
/// ```
pub struct StrandBuilder {
    inner: strand_engine::EngineConfigBuilder,
    log: Option<Arc<dyn SharedLog>>,
    semantics: Option<Arc<dyn ObjectSemantics>>,
}

impl StrandBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            inner: EngineConfig::builder(),
            log: None,
            semantics: None,
        }
    }

    /// Start from a TOML configuration file.
    ///
    /// Settings made on the builder afterwards override the file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let config = EngineConfig::load(path).map_err(Error::from)?;
        self.inner = Self::from_config(config);
        Ok(self)
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.inner = Self::from_config(config);
        self
    }

    fn from_config(config: EngineConfig) -> strand_engine::EngineConfigBuilder {
        EngineConfig::builder()
            .isolation(config.isolation)
            .key_hashing(config.key_hashing)
            .max_commit_attempts(config.max_commit_attempts)
            .max_transient_retries(config.max_transient_retries)
            .retry_backoff(Duration::from_millis(config.retry_backoff_ms))
    }

    /// Default isolation level for [`Strand::begin`].
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.inner = self.inner.isolation(isolation);
        self
    }

    /// Conflict key policy.
    pub fn key_hashing(mut self, key_hashing: KeyHashing) -> Self {
        self.inner = self.inner.key_hashing(key_hashing);
        self
    }

    /// Compare keys by `bits`-bit digests.
    ///
    /// Distinct keys with equal digests conflict; narrower digests mean
    /// more false aborts.
    pub fn fingerprint_bits(mut self, bits: u8) -> Self {
        self.inner = self.inner.fingerprint_bits(bits);
        self
    }

    /// Compare full keys.
    pub fn exact_keys(mut self) -> Self {
        self.inner = self.inner.exact_keys();
        self
    }

    /// Bound on validate-then-append rounds per commit.
    pub fn max_commit_attempts(mut self, attempts: u32) -> Self {
        self.inner = self.inner.max_commit_attempts(attempts);
        self
    }

    /// Bound on transient log failures per commit.
    pub fn max_transient_retries(mut self, retries: u32) -> Self {
        self.inner = self.inner.max_transient_retries(retries);
        self
    }

    /// Pause between transient retries.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.inner = self.inner.retry_backoff(backoff);
        self
    }

    /// Use an existing log instead of a fresh in-memory one.
    pub fn log(mut self, log: Arc<dyn SharedLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Use custom object semantics instead of key/value.
    pub fn semantics(mut self, semantics: Arc<dyn ObjectSemantics>) -> Self {
        self.semantics = Some(semantics);
        self
    }

    /// Open the database.
    pub fn open(self) -> Result<Strand> {
        let config = self.inner.build()?;
        let log: Arc<dyn SharedLog> = match self.log {
            Some(log) => log,
            None => Arc::new(strand_log::InMemoryLog::new()),
        };
        let semantics: Arc<dyn ObjectSemantics> = match self.semantics {
            Some(semantics) => semantics,
            None => Arc::new(strand_engine::KvSemantics),
        };
        let inner = strand_engine::Database::with_log(log, semantics, config)?;
        Ok(Strand { inner })
    }
}

impl Default for StrandBuilder {
    fn default() -> Self {
        Self::new()
    }
}
