//! # Shared Crypto - Stream File Primitives
//!
//! Digests and signature checks needed to authenticate stream files
//! published by consensus nodes.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, SHA-384 | Stream file self-hashes |
//! | `signatures` | Ed25519 | Node signature files |
//! | `ecdsa` | secp256k1 | Node signature files |
//! | `keys` | - | Algorithm tags and node key material |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **secp256k1**: RFC 6979 deterministic, SHA-256 prehash
//! - Signatures always cover the raw digest bytes, never the file itself

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod keys;
pub mod signatures;

// Re-exports
pub use ecdsa::{Secp256k1KeyPair, Secp256k1PublicKey};
pub use errors::CryptoError;
pub use hashing::{DigestAlgorithm, StreamHasher};
pub use keys::{NodeKeyPair, NodePublicKey, SignatureAlgorithm};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
