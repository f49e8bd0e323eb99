//! # Checkpoint and Attestation Hashing
//!
//! Byte-exact recomputation of the values the external verifier contract
//! checks signatures against.
//!
//! ```text
//! checkpoint = keccak256(abi.encode(bytes32 domain, uint256 powerThreshold,
//!                                   uint256 timestamp, bytes32 valsetHash))
//! snapshot   = keccak256(abi.encode(bytes32 ATTESTATION_DOMAIN, bytes32 queryId,
//!                                   bytes value, uint256 timestamp, uint256 power,
//!                                   uint256 prevTs, uint256 nextTs, bytes32 checkpoint,
//!                                   uint256 attestationTs, uint256 lastConsensusTs))
//! ```
//!
//! Validator keys sign `sha256(payload)`; recovery therefore always runs
//! over [`signing_digest`] of the checkpoint or snapshot.

use crate::domain::abi::{self, right_padded_bytes32, Token};
use crate::domain::entities::BridgeValidatorSet;
use crate::domain::errors::{BridgeError, BridgeResult};
use shared_crypto::{keccak256, recover_signer_candidates, sha256};
use shared_types::{Address, Hash, OperatorAddress};

/// Domain tag mixed into every validator-set checkpoint.
pub const VALSET_CHECKPOINT_DOMAIN: &str = "checkpoint";

/// Domain tag mixed into every oracle attestation snapshot.
pub const NEW_REPORT_ATTESTATION_DOMAIN: &str = "tellorCurrentAttestation";

/// Domain separator for validator-set checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSeparator(Hash);

impl DomainSeparator {
    /// Mainnet keeps the fixed ASCII constant the deployed verifier expects;
    /// every other chain binds its chain id.
    pub fn for_chain(chain_id: &str, mainnet_chain_id: &str) -> Self {
        if chain_id == mainnet_chain_id {
            return Self(ascii_bytes32(VALSET_CHECKPOINT_DOMAIN));
        }
        let encoded = abi::encode(&[
            Token::String(VALSET_CHECKPOINT_DOMAIN.to_string()),
            Token::String(chain_id.to_string()),
        ]);
        Self(keccak256(&encoded))
    }

    /// Raw 32 bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

fn ascii_bytes32(tag: &str) -> Hash {
    let mut out = [0u8; 32];
    let len = tag.len().min(32);
    out[..len].copy_from_slice(&tag.as_bytes()[..len]);
    out
}

// =============================================================================
// VALIDATOR SET CHECKPOINTS
// =============================================================================

/// ABI-encode `Validator[]` and hash it.
pub fn encode_and_hash_validator_set(valset: &BridgeValidatorSet) -> (Vec<u8>, Hash) {
    let validators = valset
        .validators
        .iter()
        .map(|v| Token::Tuple(vec![Token::Address(v.ethereum_address), Token::uint(v.power)]))
        .collect();
    let encoded = abi::encode(&[Token::Array(validators)]);
    let hash = keccak256(&encoded);
    (encoded, hash)
}

/// Compute the checkpoint hash for a validator set.
pub fn encode_valset_checkpoint(
    domain: &DomainSeparator,
    power_threshold: u64,
    timestamp: u64,
    valset_hash: &Hash,
) -> Hash {
    let encoded = abi::encode(&[
        Token::FixedBytes(domain.0),
        Token::uint(power_threshold),
        Token::uint(timestamp),
        Token::FixedBytes(*valset_hash),
    ]);
    keccak256(&encoded)
}

// =============================================================================
// ORACLE ATTESTATION SNAPSHOTS
// =============================================================================

/// Everything an attestation snapshot commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleAttestationData {
    pub query_id: Hash,
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub aggregate_power: u64,
    pub previous_timestamp: u64,
    pub next_timestamp: u64,
    pub checkpoint: Hash,
    pub attestation_timestamp: u64,
    pub last_consensus_timestamp: u64,
}

/// Compute the snapshot hash validators sign.
pub fn encode_oracle_attestation_data(data: &OracleAttestationData) -> Hash {
    let encoded = abi::encode(&[
        Token::FixedBytes(ascii_bytes32(NEW_REPORT_ATTESTATION_DOMAIN)),
        Token::FixedBytes(data.query_id),
        Token::Bytes(data.value.clone()),
        Token::uint(data.timestamp),
        Token::uint(data.aggregate_power),
        Token::uint(data.previous_timestamp),
        Token::uint(data.next_timestamp),
        Token::FixedBytes(data.checkpoint),
        Token::uint(data.attestation_timestamp),
        Token::uint(data.last_consensus_timestamp),
    ]);
    keccak256(&encoded)
}

/// Key of the per-report snapshot list: `keccak256(hex(queryId) ‖ decimal(timestamp))`.
pub fn report_key(query_id: &[u8], timestamp: u64) -> Hash {
    let mut preimage = hex::encode(query_id);
    preimage.push_str(&timestamp.to_string());
    keccak256(preimage.as_bytes())
}

// =============================================================================
// SIGNATURE HELPERS
// =============================================================================

/// Digest validator keys actually sign for a checkpoint or snapshot.
pub fn signing_digest(payload: &[u8]) -> Hash {
    sha256(payload)
}

/// The two bootstrap messages an operator signs to prove its EVM key.
pub fn initial_signature_messages(operator: &OperatorAddress) -> (String, String) {
    (
        format!("TellorLayer: Initial bridge signature A for operator {operator}"),
        format!("TellorLayer: Initial bridge signature B for operator {operator}"),
    )
}

/// Bootstrap messages are pre-hashed once before the signer hashes again.
pub fn initial_signature_payload(message: &str) -> Hash {
    sha256(message.as_bytes())
}

/// Does `signature` over `payload` recover to `expected`?
pub fn signature_matches(payload: &[u8], signature: &[u8], expected: &Address) -> BridgeResult<bool> {
    let candidates = recover_signer_candidates(signature, &signing_digest(payload))?;
    Ok(candidates.contains(expected))
}

/// Recover the EVM address proven by a pair of bootstrap signatures.
///
/// The address is the candidate both signatures agree on.
pub fn evm_address_from_initial_signatures(
    signature_a: &[u8],
    signature_b: &[u8],
    operator: &OperatorAddress,
) -> BridgeResult<Address> {
    let (message_a, message_b) = initial_signature_messages(operator);
    let digest_a = signing_digest(&initial_signature_payload(&message_a));
    let digest_b = signing_digest(&initial_signature_payload(&message_b));

    let candidates_a = recover_signer_candidates(signature_a, &digest_a)?;
    let candidates_b = recover_signer_candidates(signature_b, &digest_b)?;

    candidates_a
        .into_iter()
        .find(|a| candidates_b.contains(a))
        .ok_or(BridgeError::EvmAddressMismatch)
}

/// Bytes a validator's consensus key signs for its vote extension.
///
/// Length-delimited protobuf `CanonicalVoteExtension { extension = 1,
/// height = 2 (sfixed64), round = 3 (sfixed64), chain_id = 4 }`; zero and
/// empty fields are omitted.
pub fn vote_extension_sign_bytes(chain_id: &str, height: u64, round: u32, extension: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(extension.len() + chain_id.len() + 32);
    if !extension.is_empty() {
        body.push(0x0a);
        put_uvarint(&mut body, extension.len() as u64);
        body.extend_from_slice(extension);
    }
    if height != 0 {
        body.push(0x11);
        body.extend_from_slice(&height.to_le_bytes());
    }
    if round != 0 {
        body.push(0x19);
        body.extend_from_slice(&u64::from(round).to_le_bytes());
    }
    if !chain_id.is_empty() {
        body.push(0x22);
        put_uvarint(&mut body, chain_id.len() as u64);
        body.extend_from_slice(chain_id.as_bytes());
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    put_uvarint(&mut out, body.len() as u64);
    out.extend_from_slice(&body);
    out
}

fn put_uvarint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decode a hex field, tolerating a `0x` prefix.
pub fn decode_hex(field: &'static str, value: &str) -> BridgeResult<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| BridgeError::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

/// Decode a hex field into a right-padded `bytes32`.
pub fn decode_hex_bytes32(field: &'static str, value: &str) -> BridgeResult<Hash> {
    right_padded_bytes32(field, &decode_hex(field, value)?)
}
