//! # Value Objects
//!
//! Small immutable values shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest of a stream file (or of part of one).
///
/// Width depends on the stream kind's configured digest algorithm, so the
/// bytes are owned rather than fixed-size. Ordering is lexicographic over
/// the raw bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileHash(Vec<u8>);

impl FileHash {
    /// Wrap raw digest bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Copy from a slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// All-zero hash of the given width (used as "no predecessor").
    pub fn zero(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Width in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the hash has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHash({})", self.to_hex())
    }
}

impl From<Vec<u8>> for FileHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Consensus node identifier, e.g. `0.0.3`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
