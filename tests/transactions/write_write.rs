//! Write-write soundness and conflicts

use crate::common::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use strand::{AbortCause, ConflictKind, IsolationLevel, Value};

#[test]
fn test_disjoint_writers_both_commit_interleaved() {
    for isolation in [IsolationLevel::WriteAfterWrite, IsolationLevel::Snapshot] {
        for seed in 0..64 {
            let db = exact_db();
            let mut schedule = Interleaving::new(seed);
            let t0 = schedule.task(TxTask::new(&db));
            let t1 = schedule.task(TxTask::new(&db));

            schedule.step(t0, move |t| t.begin(isolation));
            schedule.step(t0, |t| t.put("a", 0));
            schedule.step(t0, |t| t.end());
            schedule.step(t1, move |t| t.begin(isolation));
            schedule.step(t1, |t| t.put("b", 1));
            schedule.step(t1, |t| t.end());

            let tasks = schedule.run();
            assert!(tasks[t0].committed(), "{} seed {}", isolation, seed);
            assert!(tasks[t1].committed(), "{} seed {}", isolation, seed);
        }
    }
}

#[test]
fn test_disjoint_writers_all_commit_threaded() {
    const THREADS: usize = 16;
    let db = exact_db();

    let outcomes = run_concurrently(THREADS, {
        let db = db.clone();
        move |i, barrier| {
            let session = db.session();
            let mut txn = db
                .begin_with(&session, IsolationLevel::WriteAfterWrite)
                .unwrap();
            barrier.wait();
            let mut map = txn.map(object());
            map.put(format!("key-{}", i), i as i64).unwrap();
            map.get(format!("shared-read-{}", i % 2)).unwrap();
            finish(txn.end())
        }
    });

    assert!(outcomes.iter().all(|o| *o == Outcome::Committed));
    assert_eq!(db.tail().unwrap().as_u64(), THREADS as u64);
    for i in 0..THREADS {
        assert_eq!(
            db.read_committed(object(), format!("key-{}", i)).unwrap(),
            Some(Value::Int(i as i64))
        );
    }
}

#[test]
fn test_same_key_writers_at_most_one_commits() {
    const THREADS: usize = 12;
    let db = exact_db();

    let outcomes = run_concurrently(THREADS, {
        let db = db.clone();
        move |i, barrier| {
            let session = db.session();
            let mut txn = db
                .begin_with(&session, IsolationLevel::WriteAfterWrite)
                .unwrap();
            txn.map(object()).put("hot", i as i64).unwrap();
            // Everyone holds the same snapshot before anyone ends
            barrier.wait();
            match txn.end() {
                Ok(_) => Some(i as i64),
                Err(err) => {
                    assert_eq!(
                        err.abort_cause(),
                        Some(AbortCause::Conflict(ConflictKind::WriteWrite))
                    );
                    None
                }
            }
        }
    });

    let winners: Vec<i64> = outcomes.into_iter().flatten().collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(
        db.read_committed(object(), "hot").unwrap(),
        Some(Value::Int(winners[0]))
    );
}

/// Committed transactions that ran concurrently never share a written key
#[test]
fn test_no_false_commit_random_write_sets() {
    for seed in 0..40u64 {
        for isolation in [IsolationLevel::WriteAfterWrite, IsolationLevel::Snapshot] {
            let mut rng = StdRng::seed_from_u64(seed);
            let db = exact_db();
            let tasks = 6;

            let write_sets: Vec<BTreeSet<u32>> = (0..tasks)
                .map(|_| {
                    let n = rng.gen_range(1..4);
                    (0..n).map(|_| rng.gen_range(0..10u32)).collect()
                })
                .collect();

            let mut schedule = Interleaving::new(seed);
            let ids: Vec<usize> = write_sets
                .iter()
                .map(|keys| {
                    let id = schedule.task(TxTask::new(&db));
                    schedule.step(id, move |t| t.begin(isolation));
                    let mut keys: Vec<u32> = keys.iter().copied().collect();
                    keys.shuffle(&mut rng);
                    for k in keys {
                        schedule.step(id, move |t| t.put(k as u64, k as i64));
                    }
                    schedule.step(id, |t| t.end());
                    id
                })
                .collect();
            let results = schedule.run();

            assert!(ids.iter().any(|id| results[*id].committed()), "seed {}", seed);
            for (i, a) in ids.iter().enumerate() {
                for b in &ids[i + 1..] {
                    let (ta, tb) = (&results[*a], &results[*b]);
                    if ta.committed() && tb.committed() && ta.overlapped(tb) {
                        assert!(
                            write_sets[*a].is_disjoint(&write_sets[*b]),
                            "{} seed {}: {:?} and {:?}",
                            isolation,
                            seed,
                            write_sets[*a],
                            write_sets[*b]
                        );
                    }
                }
            }
        }
    }
}

/// All transactions begin at the same snapshot, so no two committed write
/// sets may share a key
#[test]
fn test_no_false_commit_shared_snapshot() {
    for seed in 0..40u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let db = exact_db();

        let write_sets: Vec<BTreeSet<u32>> = (0..8)
            .map(|_| {
                let n = rng.gen_range(1..4);
                (0..n).map(|_| rng.gen_range(0..12u32)).collect()
            })
            .collect();

        let mut tasks: Vec<TxTask> = write_sets
            .iter()
            .map(|keys| {
                let mut t = TxTask::new(&db);
                t.begin(IsolationLevel::WriteAfterWrite);
                for k in keys {
                    t.put(*k as u64, 1);
                }
                t
            })
            .collect();

        let mut order: Vec<usize> = (0..tasks.len()).collect();
        order.shuffle(&mut rng);
        for i in order {
            tasks[i].end();
        }

        let committed: Vec<&BTreeSet<u32>> = tasks
            .iter()
            .zip(&write_sets)
            .filter(|(t, _)| t.committed())
            .map(|(_, ws)| ws)
            .collect();
        for (i, a) in committed.iter().enumerate() {
            for b in &committed[i + 1..] {
                assert!(a.is_disjoint(b), "seed {}: {:?} and {:?}", seed, a, b);
            }
        }
    }
}
