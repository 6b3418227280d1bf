//! Conflict keys
//!
//! A [`ConflictKey`] identifies "the thing two transactions must not both
//! touch": an object plus a digest of the logical key. Commit-time
//! validation compares conflict keys, never raw keys.
//!
//! ## Lossy digests
//!
//! With the default [`KeyHashing::Fingerprint`] policy the digest is a
//! truncated hash of the key. Two distinct keys of the same object can share
//! a digest, in which case they are the *same* conflict key and a transaction
//! touching one can be aborted by a commit touching the other. This false
//! abort is accepted: its probability is controlled by `bits`, and the number
//! of false aborts in a workload equals the number of digest collisions
//! among the keys it touches.
//!
//! [`KeyHashing::Exact`] keeps the full key instead, which removes false
//! aborts at the cost of storing and comparing whole keys. Choosing it is a
//! behavioural change and must be made explicitly in configuration.

use crate::types::{Key, ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Default digest width in bits
pub const DEFAULT_DIGEST_BITS: u8 = 32;

/// How logical keys are reduced to conflict keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum KeyHashing {
    /// xxh3-64 of the key bytes truncated to the low `bits` bits
    Fingerprint {
        /// Digest width, 1..=64
        bits: u8,
    },
    /// Full key comparison (no false aborts)
    Exact,
}

impl KeyHashing {
    /// Fingerprint hashing with the given width
    pub const fn fingerprint(bits: u8) -> Self {
        KeyHashing::Fingerprint { bits }
    }

    /// Check that the policy is usable
    ///
    /// Returns a description of the problem if `bits` is out of range.
    pub fn check(&self) -> Result<(), String> {
        match self {
            KeyHashing::Fingerprint { bits } if *bits == 0 || *bits > 64 => Err(format!(
                "fingerprint width must be within 1..=64 bits, got {}",
                bits
            )),
            _ => Ok(()),
        }
    }

    /// Compute the digest of `key` under this policy
    pub fn digest(&self, key: &Key) -> KeyDigest {
        match self {
            KeyHashing::Fingerprint { bits } => {
                let hash = xxh3_64(key.as_bytes());
                let mask = if *bits >= 64 {
                    u64::MAX
                } else {
                    (1u64 << bits) - 1
                };
                KeyDigest::Hashed(hash & mask)
            }
            KeyHashing::Exact => KeyDigest::Exact(key.clone()),
        }
    }

    /// Build the conflict key for `(object, key)`
    pub fn conflict_key(&self, object: ObjectId, key: &Key) -> ConflictKey {
        ConflictKey {
            object,
            digest: self.digest(key),
        }
    }
}

impl Default for KeyHashing {
    fn default() -> Self {
        KeyHashing::Fingerprint {
            bits: DEFAULT_DIGEST_BITS,
        }
    }
}

/// Reduced form of a logical key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyDigest {
    /// Truncated hash (lossy)
    Hashed(u64),
    /// The key itself
    Exact(Key),
}

impl fmt::Display for KeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDigest::Hashed(h) => write!(f, "#{:x}", h),
            KeyDigest::Exact(k) => write!(f, "{}", k),
        }
    }
}

/// Identity compared at commit time: object plus key digest
///
/// Immutable once created. Equality and hashing cover both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConflictKey {
    object: ObjectId,
    digest: KeyDigest,
}

impl ConflictKey {
    /// Object this key belongs to
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Digest of the logical key
    pub fn digest(&self) -> &KeyDigest {
        &self.digest
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object, self.digest)
    }
}
