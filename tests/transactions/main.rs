//! Transaction Engine Integration Tests
//!
//! Exercises the commit protocol end to end through the public API:
//! isolation guarantees, conflict detection, false aborts from digest
//! collisions, session lifecycle and log failures.
//!
//! Scenarios are run both on real threads and under the seeded
//! interleaving scheduler from `common`.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test transactions
//!
//! # Only the write-write scenarios
//! cargo test --test transactions write_write::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod cycle;
mod false_aborts;
mod lifecycle;
mod log_failures;
mod write_write;
