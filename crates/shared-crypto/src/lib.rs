//! # Shared Crypto - Bridge Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak-256, SHA-256 | Checkpoint/snapshot digests, signing prehash |
//! | `ecdsa` | secp256k1 | EVM-compatible recoverable signatures |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S normalization (EIP-2)
//! - **Recovery**: signatures carry no recovery byte; both ids are tried

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;

// Re-exports
pub use ecdsa::{
    recover_signer_candidates, EvmAddress, Secp256k1KeyPair, Secp256k1PublicKey,
    Secp256k1Signature, SIGNATURE_LEN,
};
pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_many, sha256, Hash};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
