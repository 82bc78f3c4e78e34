//! # Node Key Material
//!
//! Signature algorithm tags as they appear in signature files, and the
//! public keys the node registry publishes for each consensus node.

use crate::{CryptoError, Ed25519KeyPair, Ed25519PublicKey, Secp256k1KeyPair, Secp256k1PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature algorithm tag (one byte in the signature file).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 over the raw digest
    Ed25519,
    /// ECDSA secp256k1 over SHA-256(digest)
    EcdsaSecp256k1,
}

impl SignatureAlgorithm {
    /// Wire tag.
    pub const fn tag(self) -> u8 {
        match self {
            Self::Ed25519 => 1,
            Self::EcdsaSecp256k1 => 2,
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            1 => Ok(Self::Ed25519),
            2 => Ok(Self::EcdsaSecp256k1),
            other => Err(CryptoError::UnknownAlgorithm(other)),
        }
    }

    /// Short name for logs and metrics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::EcdsaSecp256k1 => "secp256k1",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public key of a consensus node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodePublicKey {
    /// Ed25519 key
    Ed25519(Ed25519PublicKey),
    /// Compressed secp256k1 key
    Secp256k1(Secp256k1PublicKey),
}

impl NodePublicKey {
    /// Parse key material for the given algorithm.
    pub fn from_slice(algorithm: SignatureAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => Ed25519PublicKey::from_slice(bytes).map(Self::Ed25519),
            SignatureAlgorithm::EcdsaSecp256k1 => {
                Secp256k1PublicKey::from_slice(bytes).map(Self::Secp256k1)
            }
        }
    }

    /// Algorithm this key signs with.
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ed25519(key) => key.as_bytes(),
            Self::Secp256k1(key) => key.as_bytes(),
        }
    }

    /// Verify `signature` over `message`, checking the algorithm tag first.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        if algorithm != self.algorithm() {
            return Err(CryptoError::AlgorithmMismatch {
                key: self.algorithm().name(),
                signature: algorithm.name(),
            });
        }
        match self {
            Self::Ed25519(key) => key.verify(message, signature),
            Self::Secp256k1(key) => key.verify(message, signature),
        }
    }
}

/// Signing keypair of either algorithm. Used by fixtures and simulators
/// that publish signature files.
pub enum NodeKeyPair {
    /// Ed25519 keypair
    Ed25519(Ed25519KeyPair),
    /// secp256k1 keypair
    Secp256k1(Secp256k1KeyPair),
}

impl NodeKeyPair {
    /// Deterministic Ed25519 keypair from a seed.
    pub fn ed25519_from_seed(seed: [u8; 32]) -> Self {
        Self::Ed25519(Ed25519KeyPair::from_seed(seed))
    }

    /// Deterministic secp256k1 keypair from a secret scalar.
    pub fn secp256k1_from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        Secp256k1KeyPair::from_bytes(bytes).map(Self::Secp256k1)
    }

    /// Algorithm tag for signatures produced by this keypair.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Ed25519(_) => SignatureAlgorithm::Ed25519,
            Self::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    /// Public half.
    pub fn public_key(&self) -> NodePublicKey {
        match self {
            Self::Ed25519(kp) => NodePublicKey::Ed25519(kp.public_key()),
            Self::Secp256k1(kp) => NodePublicKey::Secp256k1(kp.public_key()),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(kp) => kp.sign(message).to_vec(),
            Self::Secp256k1(kp) => kp.sign(message).to_vec(),
        }
    }
}
