//! # ECDSA Signatures (secp256k1)
//!
//! EVM-compatible secp256k1 signatures in the compact 64-byte `r || s` form.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//!
//! ## Recovery
//!
//! Signatures travel without the recovery byte. [`recover_signer_candidates`]
//! tries both recovery ids and returns every address that recovers; the
//! caller picks the one its identity registry knows about.

use crate::hashing::{keccak256, sha256, Hash};
use crate::CryptoError;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroize;

/// 20-byte EVM account address.
pub type EvmAddress = [u8; 20];

/// Length of a compact `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// secp256k1 public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secp256k1PublicKey(VerifyingKey);

impl Secp256k1PublicKey {
    /// Parse a SEC1 encoded key (33-byte compressed or 65-byte uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 bytes.
    pub fn to_compressed_bytes(&self) -> [u8; 33] {
        let point = self.0.to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    /// EVM address: last 20 bytes of keccak256 over the uncompressed point.
    pub fn evm_address(&self) -> EvmAddress {
        evm_address_from_key(&self.0)
    }

    /// Verify a compact signature over `sha256(message)`.
    ///
    /// High-S signatures are rejected.
    pub fn verify_sha256(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let signature = Secp256k1Signature::from_slice(signature)?;
        let signature =
            Signature::from_slice(signature.as_bytes()).map_err(|_| CryptoError::InvalidSignature)?;
        if signature.normalize_s().is_some() {
            return Err(CryptoError::InvalidSignature);
        }
        self.0
            .verify_prehash(&sha256(message), &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// ECDSA signature (64 bytes, r||s format).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Secp256k1Signature([u8; SIGNATURE_LEN]);

impl Secp256k1Signature {
    /// Create from bytes (64 bytes).
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything but 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SIGNATURE_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidSignatureLength {
                    expected: SIGNATURE_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Owned copy of the raw bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Get the public key.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey(self.signing_key.verifying_key().clone())
    }

    /// EVM address controlled by this key.
    pub fn evm_address(&self) -> EvmAddress {
        evm_address_from_key(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte digest as-is.
    pub fn sign_prehash(&self, digest: &Hash) -> Result<Secp256k1Signature, CryptoError> {
        let (signature, _recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let bytes: [u8; SIGNATURE_LEN] = signature.to_bytes().into();
        Ok(Secp256k1Signature(bytes))
    }

    /// Sign `sha256(message)`, the convention of validator key signers.
    pub fn sign_sha256(&self, message: &[u8]) -> Result<Secp256k1Signature, CryptoError> {
        self.sign_prehash(&sha256(message))
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recover the candidate signer addresses of a compact signature over `digest`.
///
/// Fails with [`CryptoError::InvalidSignatureLength`] unless the signature is
/// exactly 64 bytes, and with [`CryptoError::RecoveryFailed`] when neither
/// recovery id yields a valid point. Candidates are ordered by recovery id.
pub fn recover_signer_candidates(
    signature: &[u8],
    digest: &Hash,
) -> Result<Vec<EvmAddress>, CryptoError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignatureLength {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        });
    }
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;

    let mut candidates = Vec::with_capacity(2);
    for id in [0u8, 1u8] {
        let Some(recovery_id) = RecoveryId::from_byte(id) else {
            continue;
        };
        if let Ok(key) = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id) {
            candidates.push(evm_address_from_key(&key));
        }
    }

    if candidates.is_empty() {
        return Err(CryptoError::RecoveryFailed);
    }
    Ok(candidates)
}

fn evm_address_from_key(key: &VerifyingKey) -> EvmAddress {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}
