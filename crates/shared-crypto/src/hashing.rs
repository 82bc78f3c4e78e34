//! # Stream File Digests
//!
//! SHA-2 digests used for stream file self-hashes. The algorithm is chosen
//! per stream kind by configuration; its output length fixes the width of
//! every hash field inside that kind's files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};
use std::fmt;

/// Digest algorithm used to hash a stream kind's files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256 (32 bytes)
    Sha256,
    /// SHA-384 (48 bytes)
    #[default]
    Sha384,
}

impl DigestAlgorithm {
    /// Output length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    /// One-shot digest.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create an incremental hasher.
    pub fn hasher(self) -> StreamHasher {
        let inner = match self {
            Self::Sha256 => HasherInner::Sha256(Sha256::new()),
            Self::Sha384 => HasherInner::Sha384(Sha384::new()),
        };
        StreamHasher { inner }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha384 => f.write_str("sha384"),
        }
    }
}

enum HasherInner {
    Sha256(Sha256),
    Sha384(Sha384),
}

/// Incremental hasher over a configured algorithm.
pub struct StreamHasher {
    inner: HasherInner,
}

impl StreamHasher {
    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        match &mut self.inner {
            HasherInner::Sha256(h) => h.update(data),
            HasherInner::Sha384(h) => h.update(data),
        }
        self
    }

    /// Consume the hasher and return the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self.inner {
            HasherInner::Sha256(h) => h.finalize().to_vec(),
            HasherInner::Sha384(h) => h.finalize().to_vec(),
        }
    }
}
