//! Session binding, abandonment and retry

use crate::common::*;
use strand::{Error, IsolationLevel, ObjectId, Value};

#[test]
fn test_nested_begin_fails_and_leaves_outer_usable() {
    let db = exact_db();
    let session = db.session();

    let mut outer = db.begin(&session).unwrap();
    let err = db.begin(&session).unwrap_err();
    assert!(matches!(err, Error::NestedTransaction(id) if id == outer.id()));
    assert!(!err.is_retryable());

    // A clone of the session is the same execution context
    assert!(matches!(
        db.begin(&session.clone()),
        Err(Error::NestedTransaction(_))
    ));

    outer.map(object()).put("k", 1).unwrap();
    outer.end().unwrap();
    assert_eq!(db.read_committed(object(), "k").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_abandoned_transaction_leaves_no_trace() {
    let db = exact_db();
    let session = db.session();
    {
        let mut txn = db.begin(&session).unwrap();
        txn.map(object()).put("k", 1).unwrap();
        // dropped without end
    }
    assert_eq!(session.active_transaction(), None);
    assert_eq!(db.tail().unwrap().as_u64(), 0);
    assert_eq!(db.read_committed(object(), "k").unwrap(), None);

    // Abandonment does not disturb anyone else
    commit_put(&db, "k", 2);
    assert_eq!(db.read_committed(object(), "k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_abandoned_writes_never_conflict() {
    let db = exact_db();
    let s1 = db.session();
    let s2 = db.session();

    let mut abandoned = db.begin_with(&s1, IsolationLevel::WriteAfterWrite).unwrap();
    abandoned.map(object()).put("k", 1).unwrap();
    let mut other = db.begin_with(&s2, IsolationLevel::WriteAfterWrite).unwrap();
    other.map(object()).put("k", 2).unwrap();
    drop(abandoned);

    other.end().unwrap();
}

#[test]
fn test_retry_after_abort_succeeds() {
    let db = exact_db();
    let session = db.session();
    let mut txn = db.begin_with(&session, IsolationLevel::Snapshot).unwrap();
    let seen = txn.map(object()).get("n").unwrap();
    assert_eq!(seen, None);
    txn.map(object()).put("n", 1).unwrap();

    commit_put(&db, "n", 10);

    let err = txn.end().unwrap_err();
    assert!(err.is_retryable());

    // The caller decides to run the body again in a new transaction
    let mut retry = db.begin_with(&session, IsolationLevel::Snapshot).unwrap();
    let n = retry.map(object()).get("n").unwrap().and_then(|v| v.as_int()).unwrap();
    retry.map(object()).put("n", n + 1).unwrap();
    retry.end().unwrap();
    assert_eq!(db.read_committed(object(), "n").unwrap(), Some(Value::Int(11)));
}

/// Threads increment one counter, retrying aborted transactions; no
/// increment is lost and none is applied twice
#[test]
fn test_contended_counter_with_caller_retries() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 25;
    let db = exact_db();
    let counter = ObjectId::named("counter");

    let attempts = run_concurrently(THREADS, {
        let db = db.clone();
        move |_, barrier| {
            let session = db.session();
            barrier.wait();
            let mut attempts = 0;
            for _ in 0..INCREMENTS {
                loop {
                    attempts += 1;
                    let result = db.transaction(&session, |txn| {
                        let mut map = txn.map(counter);
                        let n = map.get("n")?.and_then(|v| v.as_int()).unwrap_or(0);
                        map.put("n", n + 1)
                    });
                    match result {
                        Ok(()) => break,
                        Err(err) if err.is_retryable() => continue,
                        Err(err) => panic!("unexpected error: {}", err),
                    }
                }
            }
            attempts
        }
    });

    let total = (THREADS * INCREMENTS) as i64;
    assert_eq!(
        db.read_committed(counter, "n").unwrap(),
        Some(Value::Int(total))
    );
    let metrics = db.metrics();
    assert_eq!(metrics.transactions_committed as i64, total);
    assert_eq!(
        attempts.iter().sum::<usize>() as u64,
        metrics.transactions_committed + metrics.conflict_aborts
    );
}

#[test]
fn test_sessions_move_between_threads() {
    let db = exact_db();
    let session = db.session();
    let handle = {
        let db = db.clone();
        let session = session.clone();
        std::thread::spawn(move || {
            let mut txn = db.begin(&session).unwrap();
            txn.map(object()).put("from-thread", true).unwrap();
            txn.end().unwrap();
        })
    };
    handle.join().unwrap();

    assert!(!session.in_transaction());
    assert_eq!(
        db.read_committed(object(), "from-thread").unwrap(),
        Some(Value::Bool(true))
    );
}
