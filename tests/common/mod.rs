//! Shared test utilities
//!
//! Two ways to run competing transactions:
//! - [`run_concurrently`]: real threads released together by a barrier
//! - [`Interleaving`]: single-threaded, steps of several tasks executed in
//!   a seeded random order, so a failing seed reproduces exactly

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Barrier, Once};
use std::thread;
use strand::{
    Error, InMemoryLog, IsolationLevel, Key, LogPosition, ObjectId, Session, SharedLog, Strand,
    StrandBuilder, Transaction, Value,
};

static TRACING: Once = Once::new();

/// Route engine logs to the test harness output
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// In-memory database with exact key comparison
pub fn exact_db() -> Strand {
    init_tracing();
    Strand::builder()
        .exact_keys()
        .open()
        .expect("Failed to create database")
}

/// In-memory database with `bits`-bit conflict digests
pub fn fingerprint_db(bits: u8) -> Strand {
    init_tracing();
    Strand::builder()
        .fingerprint_bits(bits)
        .open()
        .expect("Failed to create database")
}

/// Database over a log the test keeps a handle to
pub fn db_with_log(builder: StrandBuilder) -> (Strand, Arc<InMemoryLog>) {
    init_tracing();
    let log = Arc::new(InMemoryLog::new());
    let shared: Arc<dyn SharedLog> = log.clone();
    let db = builder
        .log(shared)
        .open()
        .expect("Failed to create database");
    (db, log)
}

/// The object most tests operate on
pub fn object() -> ObjectId {
    ObjectId::named("A")
}

/// Commit `key = value` in its own transaction
pub fn commit_put(db: &Strand, key: impl Into<Key>, value: impl Into<Value>) {
    let session = db.session();
    let mut txn = db.begin(&session).unwrap();
    txn.map(object()).put(key, value).unwrap();
    txn.end().unwrap();
}

// =============================================================================
// THREADED DRIVER
// =============================================================================

/// Run `f(i, barrier)` on `n` threads and collect results by index
///
/// Every worker may call `barrier.wait()` to line up with the others; all
/// workers must call it the same number of times.
pub fn run_concurrently<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &Barrier) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || f(i, &barrier))
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect()
}

// =============================================================================
// INTERLEAVING SCHEDULER
// =============================================================================

type Step<S> = Box<dyn FnOnce(&mut S)>;

/// Deterministic interleaving of per-task step lists
///
/// Steps of one task run in the order they were added; across tasks the
/// order is drawn from an RNG seeded with `seed`.
pub struct Interleaving<S> {
    rng: StdRng,
    tasks: Vec<(S, VecDeque<Step<S>>)>,
}

impl<S> Interleaving<S> {
    /// Empty schedule
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            tasks: Vec::new(),
        }
    }

    /// Add a task with its initial state; returns its index
    pub fn task(&mut self, state: S) -> usize {
        self.tasks.push((state, VecDeque::new()));
        self.tasks.len() - 1
    }

    /// Append a step to `task`
    pub fn step(&mut self, task: usize, f: impl FnOnce(&mut S) + 'static) {
        self.tasks[task].1.push_back(Box::new(f));
    }

    /// Run every step; returns the final task states by index
    pub fn run(mut self) -> Vec<S> {
        loop {
            let ready: Vec<usize> = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, (_, steps))| !steps.is_empty())
                .map(|(i, _)| i)
                .collect();
            if ready.is_empty() {
                break;
            }
            let pick = ready[self.rng.gen_range(0..ready.len())];
            let (state, steps) = &mut self.tasks[pick];
            if let Some(step) = steps.pop_front() {
                step(state);
            }
        }
        self.tasks.into_iter().map(|(state, _)| state).collect()
    }
}

// =============================================================================
// TRANSACTION TASKS
// =============================================================================

/// How a task's transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `end` succeeded
    Committed,
    /// `end` reported an abort
    Aborted,
}

/// One transaction driven step by step
pub struct TxTask {
    pub db: Strand,
    pub session: Session,
    pub txn: Option<Transaction>,
    pub outcome: Option<Outcome>,
    pub observed: Vec<Option<Value>>,
    pub snapshot: Option<LogPosition>,
    pub commit_position: Option<LogPosition>,
}

impl TxTask {
    pub fn new(db: &Strand) -> Self {
        Self {
            db: db.clone(),
            session: db.session(),
            txn: None,
            outcome: None,
            observed: Vec::new(),
            snapshot: None,
            commit_position: None,
        }
    }

    pub fn begin(&mut self, isolation: IsolationLevel) {
        let txn = self.db.begin_with(&self.session, isolation).unwrap();
        self.snapshot = Some(txn.snapshot().position());
        self.txn = Some(txn);
    }

    fn active(&mut self) -> &mut Transaction {
        self.txn.as_mut().expect("task has no active transaction")
    }

    pub fn read(&mut self, key: impl Into<Key>) {
        let value = self.active().map(object()).get(key).unwrap();
        self.observed.push(value);
    }

    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        self.active().map(object()).put(key, value).unwrap();
    }

    pub fn end(&mut self) {
        let txn = self.txn.take().expect("task has no active transaction");
        let result = txn.end();
        if let Ok(info) = &result {
            self.commit_position = info.position;
        }
        self.outcome = Some(finish(result));
    }

    pub fn committed(&self) -> bool {
        self.outcome == Some(Outcome::Committed)
    }

    /// Check whether each of two committed tasks began before the other
    /// committed
    pub fn overlapped(&self, other: &TxTask) -> bool {
        match (
            self.snapshot,
            self.commit_position,
            other.snapshot,
            other.commit_position,
        ) {
            (Some(s1), Some(c1), Some(s2), Some(c2)) => s1 < c2 && s2 < c1,
            _ => false,
        }
    }
}

/// Classify a commit result, failing the test on anything but an abort
pub fn finish<T: std::fmt::Debug>(result: Result<T, Error>) -> Outcome {
    match result {
        Ok(_) => Outcome::Committed,
        Err(Error::Aborted { .. }) => Outcome::Aborted,
        Err(other) => panic!("unexpected commit error: {:?}", other),
    }
}
