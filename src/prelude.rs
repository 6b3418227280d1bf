//! Convenient imports for Strand.
//!
//! ```ignore
//! use strand::prelude::*;
//!
//! let db = Strand::open_in_memory()?;
//! ```

// Main entry point
pub use crate::database::{Strand, StrandBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Transactions
pub use crate::transaction::{Transaction, TxMap};
pub use strand_engine::{CommitInfo, Session};

// Core types
pub use strand_core::{IsolationLevel, Key, KeyHashing, ObjectId, UpdateOp, Value};
