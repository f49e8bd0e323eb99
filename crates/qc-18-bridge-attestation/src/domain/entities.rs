//! # Bridge Domain Entities
//!
//! Validator sets as the external verifier sees them, immutable checkpoint
//! parameters, oracle snapshot metadata and the positional signature arrays
//! collected for both.

use crate::domain::errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Address, Hash};

/// A validator's external-chain identity and voting power.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeValidator {
    /// EVM address the validator signs with.
    #[serde_as(as = "Hex")]
    pub ethereum_address: Address,
    /// Consensus power.
    pub power: u64,
}

/// Ordered validator set: power descending, then EVM address ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BridgeValidatorSet {
    /// Members in canonical order.
    pub validators: Vec<BridgeValidator>,
}

impl BridgeValidatorSet {
    /// Build a set in canonical order.
    pub fn sorted(mut validators: Vec<BridgeValidator>) -> Self {
        validators.sort_by(|a, b| {
            b.power
                .cmp(&a.power)
                .then_with(|| a.ethereum_address.cmp(&b.ethereum_address))
        });
        Self { validators }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// True when there are no members.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of member powers, saturating at `u64::MAX`.
    pub fn total_power(&self) -> u64 {
        self.validators
            .iter()
            .fold(0u64, |total, v| total.saturating_add(v.power))
    }

    /// Two thirds of the total power, rounded down.
    pub fn power_threshold(&self) -> u64 {
        let threshold = u128::from(self.total_power()) * 2 / 3;
        u64::try_from(threshold).unwrap_or(u64::MAX)
    }

    /// Slot of `address` in the set.
    pub fn position(&self, address: &Address) -> Option<usize> {
        self.validators
            .iter()
            .position(|v| &v.ethereum_address == address)
    }

    /// Power of `address`, if it is a member.
    pub fn power_of(&self, address: &Address) -> Option<u64> {
        self.validators
            .iter()
            .find(|v| &v.ethereum_address == address)
            .map(|v| v.power)
    }
}

/// One immutable checkpoint.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorCheckpointParams {
    /// keccak-256 checkpoint the external verifier trusts.
    #[serde_as(as = "Hex")]
    pub checkpoint: Hash,
    /// keccak-256 of the ABI-encoded validator set.
    #[serde_as(as = "Hex")]
    pub valset_hash: Hash,
    /// Activation time (block time, ms).
    pub timestamp: u64,
    /// Power needed to approve on the external chain.
    pub power_threshold: u64,
    /// Height of the block that recorded this checkpoint.
    pub block_height: u64,
}

/// Signatures collected for one checkpoint or one snapshot.
///
/// Slot `i` belongs to the validator at index `i` of the governing valset;
/// an empty entry means that validator has not signed.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PositionalSignatures {
    #[serde_as(as = "Vec<Hex>")]
    pub signatures: Vec<Vec<u8>>,
}

impl PositionalSignatures {
    /// `slots` empty entries.
    pub fn new(slots: usize) -> Self {
        Self {
            signatures: vec![Vec::new(); slots],
        }
    }

    /// Store `signature` in `slot`.
    pub fn set(&mut self, slot: usize, signature: Vec<u8>) -> BridgeResult<()> {
        let slots = self.signatures.len();
        let entry = self.signatures.get_mut(slot).ok_or_else(|| {
            BridgeError::InvalidRequest(format!("signature slot {slot} out of range ({slots})"))
        })?;
        *entry = signature;
        Ok(())
    }

    /// Whether `slot` holds a signature.
    pub fn is_signed(&self, slot: usize) -> bool {
        self.signatures.get(slot).is_some_and(|s| !s.is_empty())
    }

    /// Number of filled slots.
    pub fn signed_count(&self) -> usize {
        self.signatures.iter().filter(|s| !s.is_empty()).count()
    }
}

/// Metadata of one oracle report snapshot.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSnapshotData {
    #[serde_as(as = "Hex")]
    pub validator_checkpoint: Hash,
    pub attestation_timestamp: u64,
    pub prev_report_timestamp: u64,
    pub next_report_timestamp: u64,
    #[serde_as(as = "Hex")]
    pub query_id: Vec<u8>,
    pub timestamp: u64,
    pub last_consensus_timestamp: u64,
}
