//! Core types for the transaction engine
//!
//! This module defines the fundamental identifiers used throughout the system:
//! - [`ObjectId`]: Identity of a shared object (one stream in the log)
//! - [`Key`]: Logical key touched within an object
//! - [`LogPosition`]: Global position in the shared log
//! - [`Snapshot`]: Log position observed when a transaction began
//! - [`IsolationLevel`]: How commit-time conflicts are detected

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace used to derive deterministic object ids from names
const OBJECT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1d, 0x5e, 0x2a, 0x93, 0x4c, 0x4f, 0x0e, 0xa1, 0x77, 0x3c, 0x58, 0xd2, 0x0b, 0x9f, 0x41,
]);

/// Unique identifier for a shared object
///
/// Every object lives on its own stream in the shared log. The id is part of
/// every conflict key, so two objects never conflict with each other even when
/// they use the same logical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Create a new random ObjectId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::types::ObjectId;
    ///
    /// let a = ObjectId::new();
    /// let b = ObjectId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        ObjectId(Uuid::new_v4())
    }

    /// Derive an ObjectId from a stream name
    ///
    /// The same name always yields the same id, so independent clients can
    /// open the same object without exchanging ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use strand_core::types::ObjectId;
    ///
    /// assert_eq!(ObjectId::named("accounts"), ObjectId::named("accounts"));
    /// assert_ne!(ObjectId::named("accounts"), ObjectId::named("orders"));
    /// ```
    pub fn named(name: &str) -> Self {
        ObjectId(Uuid::new_v5(&OBJECT_NAMESPACE, name.as_bytes()))
    }

    /// Create ObjectId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ObjectId(Uuid::from_bytes(bytes))
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical key within an object
///
/// Keys are opaque bytes. Conversions are provided for the common cases so
/// callers can write `Key::from("a")` or `Key::from(42u64)`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Raw bytes of the key
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Interpret the key as UTF-8, if it is
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Length of the key in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<u64> for Key {
    /// Integer keys use their decimal representation
    fn from(n: u64) -> Self {
        Key(n.to_string().into_bytes())
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Key(n.to_string().into_bytes())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Key({:?})", s),
            None => write!(f, "Key({:02x?})", self.0),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Global position in the shared log
///
/// Position 0 is the empty log; the first appended entry lands at 1.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LogPosition(u64);

impl LogPosition {
    /// Position of the empty log
    pub const ZERO: LogPosition = LogPosition(0);

    /// Wrap a raw position
    pub const fn new(position: u64) -> Self {
        LogPosition(position)
    }

    /// Raw position value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The position immediately after this one
    pub const fn next(&self) -> Self {
        LogPosition(self.0 + 1)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<u64> for LogPosition {
    fn from(position: u64) -> Self {
        LogPosition(position)
    }
}

/// Log position observed at transaction start
///
/// A snapshot is immutable. Reads through a transaction see exactly the
/// entries at positions `<= snapshot.position()`, and commit-time validation
/// scans the entries strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Snapshot {
    position: LogPosition,
}

impl Snapshot {
    /// Create a snapshot at the given log position
    pub const fn at(position: LogPosition) -> Self {
        Snapshot { position }
    }

    /// Log position this snapshot observes
    pub const fn position(&self) -> LogPosition {
        self.position
    }

    /// Check whether an entry at `position` is visible to this snapshot
    pub fn includes(&self, position: LogPosition) -> bool {
        position <= self.position
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot{}", self.position)
    }
}

/// Isolation level of a transaction
///
/// Chosen once at begin and fixed for the transaction's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read-write and write-write conflicts abort
    ///
    /// The transaction conflicts with any later committed entry whose
    /// write-set intersects this transaction's reads or writes.
    #[default]
    Snapshot,
    /// Only write-write conflicts abort
    ///
    /// Read-sets are ignored entirely at commit.
    WriteAfterWrite,
}

impl IsolationLevel {
    /// Whether reads participate in conflict detection
    pub fn validates_reads(&self) -> bool {
        matches!(self, IsolationLevel::Snapshot)
    }

    /// Short name used in logs and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Snapshot => "snapshot",
            IsolationLevel::WriteAfterWrite => "write_after_write",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
