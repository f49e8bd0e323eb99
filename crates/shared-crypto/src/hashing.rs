//! # Digest Functions
//!
//! Keccak-256 is the hash the external EVM verifier recomputes; SHA-256 is the
//! prehash applied by validator key signers before ECDSA.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// 256-bit digest.
pub type Hash = [u8; 32];

/// Keccak-256 (legacy Ethereum variant, not FIPS SHA3-256).
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Keccak-256 over the concatenation of several inputs.
pub fn keccak256_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_sha256_abc_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keccak256_many_matches_concatenation() {
        let joined = keccak256(b"checkpoint-domain");
        let parts = keccak256_many(&[b"checkpoint", b"-", b"domain"]);
        assert_eq!(joined, parts);
    }
}
