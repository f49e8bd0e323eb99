//! Wire types of the vote-extension pipeline.
//!
//! The vote extension travels inside a validator's precommit; the
//! vote-extension transaction is injected by the proposer as transaction 0.
//! Both are JSON with hex-encoded byte fields.

use crate::domain::errors::BridgeResult;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;
use serde_with::serde_as;
use shared_types::{Address, ConsensusAddress, OperatorAddress};

// =============================================================================
// VOTE EXTENSION
// =============================================================================

/// Signature over one report snapshot.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct OracleAttestation {
    #[serde_as(as = "Hex")]
    pub query_id: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    pub snapshot: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub attestation: Vec<u8>,
}

/// Bootstrap signatures proving the operator's EVM key.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct InitialSignature {
    #[serde_as(as = "Hex")]
    pub signature_a: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub signature_b: Vec<u8>,
}

impl InitialSignature {
    pub fn is_empty(&self) -> bool {
        self.signature_a.is_empty() && self.signature_b.is_empty()
    }
}

/// Signature over the checkpoint recorded at `timestamp`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeValsetSignature {
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
    pub timestamp: u64,
}

impl BridgeValsetSignature {
    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }
}

/// Payload a validator attaches to its precommit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct BridgeVoteExtension {
    #[serde(default)]
    pub oracle_attestations: Vec<OracleAttestation>,
    #[serde(default)]
    pub initial_signature: InitialSignature,
    #[serde(default)]
    pub valset_signature: BridgeValsetSignature,
}

impl BridgeVoteExtension {
    pub fn encode(&self) -> BridgeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> BridgeResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// =============================================================================
// CONSENSUS ENGINE TYPES
// =============================================================================

/// How a validator voted on the previous block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BlockIdFlag {
    #[default]
    Unknown,
    Absent,
    Commit,
    Nil,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteValidator {
    pub address: ConsensusAddress,
    pub power: u64,
}

/// A precommit with its extension, as seen by the next proposer.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtendedVoteInfo {
    pub validator: VoteValidator,
    #[serde_as(as = "Hex")]
    pub vote_extension: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub extension_signature: Vec<u8>,
    pub block_id_flag: BlockIdFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtendedCommitInfo {
    pub round: u32,
    pub votes: Vec<ExtendedVoteInfo>,
}

/// A precommit without its extension, as seen by ProcessProposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteInfo {
    pub validator: VoteValidator,
    pub block_id_flag: BlockIdFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommitInfo {
    pub round: u32,
    pub votes: Vec<VoteInfo>,
}

impl From<&ExtendedCommitInfo> for CommitInfo {
    fn from(info: &ExtendedCommitInfo) -> Self {
        Self {
            round: info.round,
            votes: info
                .votes
                .iter()
                .map(|vote| VoteInfo {
                    validator: vote.validator.clone(),
                    block_id_flag: vote.block_id_flag,
                })
                .collect(),
        }
    }
}

// =============================================================================
// VOTE EXTENSION TRANSACTION
// =============================================================================

/// Operators bootstrapped in this block, with their recovered EVM addresses.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OperatorAndEvm {
    pub operator_addresses: Vec<OperatorAddress>,
    #[serde_as(as = "Vec<Hex>")]
    pub evm_addresses: Vec<Address>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValsetSignatures {
    pub operator_addresses: Vec<OperatorAddress>,
    pub timestamps: Vec<u64>,
    #[serde_as(as = "Vec<Hex>")]
    pub signatures: Vec<Vec<u8>>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OracleAttestations {
    pub operator_addresses: Vec<OperatorAddress>,
    #[serde_as(as = "Vec<Hex>")]
    pub attestations: Vec<Vec<u8>>,
    #[serde_as(as = "Vec<Hex>")]
    pub snapshots: Vec<Vec<u8>>,
}

/// Transaction 0 of every block past the enable height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoteExtTx {
    pub block_height: u64,
    pub op_and_evm_addrs: OperatorAndEvm,
    pub valset_sigs: ValsetSignatures,
    pub oracle_attestations: OracleAttestations,
    pub extended_commit_info: ExtendedCommitInfo,
}

impl VoteExtTx {
    pub fn encode(&self) -> BridgeResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> BridgeResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// True when every parallel array pair has matching length.
    pub fn is_well_formed(&self) -> bool {
        let evm = &self.op_and_evm_addrs;
        let valset = &self.valset_sigs;
        let oracle = &self.oracle_attestations;
        evm.operator_addresses.len() == evm.evm_addresses.len()
            && valset.operator_addresses.len() == valset.timestamps.len()
            && valset.operator_addresses.len() == valset.signatures.len()
            && oracle.operator_addresses.len() == oracle.attestations.len()
            && oracle.operator_addresses.len() == oracle.snapshots.len()
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVerifyVoteExtension {
    pub validator_address: ConsensusAddress,
    pub height: u64,
    pub vote_extension: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPrepareProposal {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
    pub local_last_commit: ExtendedCommitInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProcessProposal {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
    pub proposed_last_commit: CommitInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFinalizeBlock {
    pub height: u64,
    pub txs: Vec<Vec<u8>>,
}
