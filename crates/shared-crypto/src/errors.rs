//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signature is not exactly `r || s`
    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        /// Expected signature length in bytes
        expected: usize,
        /// Actual signature length in bytes
        actual: usize,
    },

    /// Neither recovery id produced a valid public key
    #[error("Public key recovery failed")]
    RecoveryFailed,

    /// Invalid public key
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}
