//! Aborts caused by conflict-key digest collisions
//!
//! N transactions each write one distinct key, all from the same snapshot.
//! Under exact comparison every one commits. Under `bits`-bit digests each
//! group of keys sharing a digest lets exactly one member commit, so the
//! number of aborts is N minus the number of distinct digests.

use crate::common::*;
use std::collections::HashSet;
use strand::{IsolationLevel, Key, KeyHashing};

const TASKS: usize = 48;
const BITS: u8 = 6;

fn expected_false_aborts(bits: u8) -> usize {
    let hashing = KeyHashing::fingerprint(bits);
    let digests: HashSet<_> = (0..TASKS)
        .map(|i| hashing.digest(&Key::from(i.to_string())))
        .collect();
    TASKS - digests.len()
}

fn aborts_interleaved(db: &strand::Strand, seed: u64) -> usize {
    let mut schedule = Interleaving::new(seed);
    for i in 0..TASKS {
        let mut task = TxTask::new(db);
        task.begin(IsolationLevel::WriteAfterWrite);
        task.put(i.to_string(), i as i64);
        let id = schedule.task(task);
        schedule.step(id, |t| t.end());
    }
    schedule
        .run()
        .iter()
        .filter(|t| t.outcome == Some(Outcome::Aborted))
        .count()
}

#[test]
fn test_collision_count_matches_narrow_width() {
    // With 48 keys in 64 buckets some collisions are all but certain
    assert!(expected_false_aborts(BITS) > 0);
    assert_eq!(expected_false_aborts(64), 0);
}

#[test]
fn test_false_aborts_equal_collisions_interleaved() {
    let expected = expected_false_aborts(BITS);
    for seed in 0..8 {
        let db = fingerprint_db(BITS);
        assert_eq!(aborts_interleaved(&db, seed), expected, "seed {}", seed);
    }
}

#[test]
fn test_no_aborts_with_exact_keys() {
    for seed in 0..4 {
        let db = exact_db();
        assert_eq!(aborts_interleaved(&db, seed), 0, "seed {}", seed);
    }
}

#[test]
fn test_false_aborts_equal_collisions_threaded() {
    let expected = expected_false_aborts(BITS);
    let db = fingerprint_db(BITS);

    let outcomes = run_concurrently(TASKS, {
        let db = db.clone();
        move |i, barrier| {
            let session = db.session();
            let mut txn = db
                .begin_with(&session, IsolationLevel::WriteAfterWrite)
                .unwrap();
            txn.map(object()).put(i.to_string(), i as i64).unwrap();
            // All snapshots are taken before the first commit
            barrier.wait();
            match txn.end() {
                Ok(_) => None,
                Err(err) => {
                    assert!(err.is_conflict(), "unexpected error: {}", err);
                    assert_eq!(err.conflicting_keys().len(), 1);
                    Some(err.conflicting_keys()[0].clone())
                }
            }
        }
    });

    let aborted: Vec<_> = outcomes.into_iter().flatten().collect();
    assert_eq!(aborted.len(), expected);
    assert_eq!(db.tail().unwrap().as_u64() as usize, TASKS - expected);
}
