//! Transaction engine for Strand
//!
//! Wires the shared log, the version cache and the transaction manager into
//! a [`Database`], and binds transactions to explicit [`Session`]s.
//!
//! - [`EngineConfig`]: configuration (builder or TOML)
//! - [`Database`]: opens over a log, begins transactions
//! - [`Session`]: an execution context with at most one active transaction
//! - [`Transaction`]: the caller's handle (`read`, `write`, `end`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;
pub mod session;
pub mod transaction;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use database::Database;
pub use session::Session;
pub use transaction::Transaction;

pub use strand_concurrency::{CommitInfo, CommitStats, KvSemantics, ObjectSemantics};
