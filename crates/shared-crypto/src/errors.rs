//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature encoding
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature algorithm tag is not known
    #[error("Unknown signature algorithm tag: {0}")]
    UnknownAlgorithm(u8),

    /// Signature algorithm does not match the key type
    #[error("Algorithm mismatch: key is {key}, signature is {signature}")]
    AlgorithmMismatch {
        /// Algorithm of the public key
        key: &'static str,
        /// Algorithm tag carried by the signature
        signature: &'static str,
    },
}
