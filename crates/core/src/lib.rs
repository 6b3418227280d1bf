//! Core types and traits for Strand
//!
//! This crate defines the foundational types shared by every other crate:
//! - ObjectId, Key: what a transaction touches
//! - LogPosition, Snapshot: where in the shared log a transaction stands
//! - IsolationLevel: how commit-time conflicts are detected
//! - ConflictKey, KeyHashing: the (lossy) identity compared at commit
//! - Value, UpdateOp: what is read and what is buffered
//! - StrandError: error type for all engine operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod error;
pub mod types;
pub mod value;

pub use conflict::{ConflictKey, KeyDigest, KeyHashing, DEFAULT_DIGEST_BITS};
pub use error::{AbortCause, ConflictKind, Result, StrandError};
pub use types::{IsolationLevel, Key, LogPosition, ObjectId, Snapshot};
pub use value::{UpdateOp, Value};
