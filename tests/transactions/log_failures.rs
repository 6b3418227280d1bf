//! Transient log failures and trimmed snapshots

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use strand::{AbortCause, Error, IsolationLevel, SharedLog, Strand, StrandBuilder, Value};

fn builder() -> StrandBuilder {
    Strand::builder()
        .exact_keys()
        .max_transient_retries(3)
        .retry_backoff(Duration::ZERO)
}

#[test]
fn test_transient_append_failures_are_retried() {
    let (db, log) = db_with_log(builder());
    let session = db.session();
    let mut txn = db.begin(&session).unwrap();
    txn.map(object()).put("k", 1).unwrap();

    log.fail_next_appends(3);
    let info = txn.end().unwrap();
    assert_eq!(info.position.map(|p| p.as_u64()), Some(1));
    assert_eq!(log.stats().injected_failures, 3);
    assert_eq!(db.metrics().transient_retries, 3);
    assert_eq!(db.read_committed(object(), "k").unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_transient_read_failures_are_retried() {
    let (db, log) = db_with_log(builder());
    commit_put(&db, "other", 1);

    let session = db.session();
    let mut txn = db.begin_with(&session, IsolationLevel::Snapshot).unwrap();
    txn.map(object()).put("k", 1).unwrap();
    commit_put(&db, "unrelated", 2);

    log.fail_next_reads(2);
    txn.end().unwrap();
    assert_eq!(log.stats().injected_failures, 2);
}

#[test]
fn test_exhausted_retries_abort_as_unavailable() {
    let (db, log) = db_with_log(builder());
    let session = db.session();
    let mut txn = db.begin(&session).unwrap();
    txn.map(object()).put("k", 1).unwrap();

    log.fail_next_appends(100);
    let err = txn.end().unwrap_err();
    assert_eq!(err.abort_cause(), Some(AbortCause::LogUnavailable));
    assert!(err.is_retryable());
    assert!(!err.is_conflict());
    assert!(!session.in_transaction());

    // Once the log recovers a new transaction goes through
    log.fail_next_appends(0);
    let mut retry = db.begin(&session).unwrap();
    retry.map(object()).put("k", 1).unwrap();
    retry.end().unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn test_zero_retry_budget_fails_fast() {
    let (db, log) = db_with_log(builder().max_transient_retries(0));
    let session = db.session();
    let mut txn = db.begin(&session).unwrap();
    txn.map(object()).put("k", 1).unwrap();

    log.fail_next_appends(1);
    let err = txn.end().unwrap_err();
    assert_eq!(err.abort_cause(), Some(AbortCause::LogUnavailable));
    assert_eq!(log.stats().injected_failures, 1);
}

#[test]
fn test_trimmed_snapshot_aborts_at_commit() {
    let (db, log) = db_with_log(builder());
    commit_put(&db, "a", 1);

    let session = db.session();
    let mut txn = db.begin_with(&session, IsolationLevel::Snapshot).unwrap();
    assert_eq!(txn.map(object()).get("a").unwrap(), Some(Value::Int(1)));
    txn.map(object()).put("b", 1).unwrap();

    commit_put(&db, "c", 1);
    commit_put(&db, "d", 1);
    log.trim_to(log.trimmed_to().next().next());

    let err = txn.end().unwrap_err();
    assert_eq!(err.abort_cause(), Some(AbortCause::StaleSnapshot));
    assert!(err.is_retryable());
    // Nothing was appended
    assert_eq!(db.tail().unwrap().as_u64(), 3);

    // A transaction beginning now reads from the trimmed log fine
    let mut fresh = db.begin(&session).unwrap();
    fresh.map(object()).put("b", 2).unwrap();
    fresh.end().unwrap();
}

#[test]
fn test_read_over_trimmed_range_aborts_the_transaction() {
    // The reader's cache has never seen the trimmed entries
    let (db, log) = db_with_log(builder());
    commit_put(&db, "a", 1);
    commit_put(&db, "a", 2);
    let session = db.session();
    let mut txn = db.begin(&session).unwrap();
    // Brings this database's cache up to the tail
    assert_eq!(db.read_committed(object(), "a").unwrap(), Some(Value::Int(2)));

    let shared: Arc<dyn SharedLog> = log.clone();
    let reader = Strand::builder().exact_keys().log(shared).open().unwrap();
    log.trim_to(log.trimmed_to().next());

    // Outside a transaction the log is simply unavailable
    assert!(matches!(
        reader.read_committed(object(), "a"),
        Err(Error::Unavailable(_))
    ));

    let reader_session = reader.session();
    let mut stale = reader.begin(&reader_session).unwrap();
    let err = stale.map(object()).get("a").unwrap_err();
    assert_eq!(err.abort_cause(), Some(AbortCause::StaleSnapshot));
    assert!(err.is_retryable());
    // The transaction cannot be salvaged by writing instead
    assert!(stale.map(object()).put("b", 1).is_err());
    let err = stale.end().unwrap_err();
    assert_eq!(err.abort_cause(), Some(AbortCause::StaleSnapshot));
    assert!(!reader_session.in_transaction());
    assert_eq!(reader.metrics().transactions_aborted, 1);

    // The first database synced before the trim and still answers
    assert_eq!(txn.map(object()).get("a").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_unacknowledged_append_commits_once() {
    let (db, log) = db_with_log(builder());
    let session = db.session();
    let mut txn = db.begin_with(&session, IsolationLevel::WriteAfterWrite).unwrap();
    txn.map(object()).increment("n", 1).unwrap();

    // The append lands but the caller is told it failed
    log.lose_next_append_acks(1);
    let info = txn.end().unwrap();
    assert_eq!(info.position.map(|p| p.as_u64()), Some(1));
    assert_eq!(log.len(), 1);
    assert_eq!(db.read_committed(object(), "n").unwrap(), Some(Value::Int(1)));

    let metrics = db.metrics();
    assert_eq!(metrics.transactions_committed, 1);
    assert_eq!(metrics.conflict_aborts, 0);
}

#[test]
fn test_blind_wrong_type_increment_leaves_reads_working() {
    let (db, log) = db_with_log(builder());
    commit_put(&db, "k", "x");

    let session = db.session();
    let mut txn = db.begin_with(&session, IsolationLevel::WriteAfterWrite).unwrap();
    txn.map(object()).increment("k", 1).unwrap();
    let err = txn.end().unwrap_err();
    assert!(matches!(err, Error::InvalidUpdate(_)));
    assert_eq!(log.len(), 1);

    assert_eq!(db.read_committed(object(), "z").unwrap(), None);
    let mut next = db.begin(&session).unwrap();
    assert_eq!(next.map(object()).get("z").unwrap(), None);
    assert_eq!(
        next.map(object()).get("k").unwrap(),
        Some(Value::String("x".to_string()))
    );
    next.map(object()).put("z", 1).unwrap();
    next.end().unwrap();
}
