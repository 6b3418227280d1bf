//! Read/write cycle
//!
//! Task k reads key k+1 and writes key k (mod N) under Snapshot isolation.
//! If task k aborts, one of its neighbours must have committed.

use crate::common::*;
use strand::IsolationLevel;

const TASKS: usize = 8;

fn neighbours_justify_aborts(tasks: &[TxTask]) {
    let n = tasks.len();
    for k in 0..n {
        if !tasks[k].committed() {
            let prev = &tasks[(k + n - 1) % n];
            let next = &tasks[(k + 1) % n];
            assert!(
                prev.committed() || next.committed(),
                "task {} aborted but neither neighbour committed",
                k
            );
        }
    }
}

#[test]
fn test_cycle_interleaved() {
    for seed in 0..64 {
        let db = exact_db();
        let mut schedule = Interleaving::new(seed);
        for k in 0..TASKS {
            let id = schedule.task(TxTask::new(&db));
            let next = (k + 1) % TASKS;
            schedule.step(id, |t| t.begin(IsolationLevel::Snapshot));
            schedule.step(id, move |t| t.read(next as u64));
            schedule.step(id, move |t| t.put(k as u64, k as i64));
            schedule.step(id, |t| t.end());
        }
        let tasks = schedule.run();
        assert!(tasks.iter().any(|t| t.committed()), "seed {}", seed);
        neighbours_justify_aborts(&tasks);
    }
}

#[test]
fn test_cycle_interleaved_with_digests() {
    // Narrow digests add false aborts but never remove a justified commit
    for seed in 0..32 {
        let db = fingerprint_db(3);
        let mut schedule = Interleaving::new(seed);
        for k in 0..TASKS {
            let id = schedule.task(TxTask::new(&db));
            let next = (k + 1) % TASKS;
            schedule.step(id, |t| t.begin(IsolationLevel::Snapshot));
            schedule.step(id, move |t| t.read(next as u64));
            schedule.step(id, move |t| t.put(k as u64, k as i64));
            schedule.step(id, |t| t.end());
        }
        let tasks = schedule.run();
        // The first transaction to end always commits
        assert!(tasks.iter().any(|t| t.committed()), "seed {}", seed);
    }
}

#[test]
fn test_cycle_threaded() {
    for _ in 0..10 {
        let db = exact_db();
        let outcomes = run_concurrently(TASKS, {
            let db = db.clone();
            move |k, barrier| {
                let session = db.session();
                let mut txn = db.begin_with(&session, IsolationLevel::Snapshot).unwrap();
                barrier.wait();
                let mut map = txn.map(object());
                map.get(((k + 1) % TASKS) as u64).unwrap();
                map.put(k as u64, k as i64).unwrap();
                finish(txn.end())
            }
        });

        let n = outcomes.len();
        assert!(outcomes.contains(&Outcome::Committed));
        for k in 0..n {
            if outcomes[k] == Outcome::Aborted {
                assert!(
                    outcomes[(k + n - 1) % n] == Outcome::Committed
                        || outcomes[(k + 1) % n] == Outcome::Committed,
                    "task {} aborted without a committed neighbour: {:?}",
                    k,
                    outcomes
                );
            }
        }
    }
}
