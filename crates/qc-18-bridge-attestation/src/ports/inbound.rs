//! # Inbound Ports (Driving Ports)
//!
//! The transaction and query surfaces of the bridge subsystem.
//!
//! Every write runs atomically: an error leaves the store exactly as it
//! was before the message.

use crate::domain::entities::{
    AttestationSnapshotData, BridgeValidatorSet, PositionalSignatures, ValidatorCheckpointParams,
};
use crate::domain::errors::{BridgeError, BridgeResult, ErrorCategory};
use crate::domain::params::Params;
use serde::{Deserialize, Serialize};
use shared_types::{BlockContext, Hash, OperatorAddress};
use thiserror::Error;

// =============================================================================
// MESSAGES
// =============================================================================

/// Ask validators to attest an existing report outside the block-driven flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRequestAttestations {
    pub creator: String,
    /// Hex query id.
    pub query_id: String,
    pub timestamp: u64,
}

/// A validator's signature over an existing snapshot, sent as a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitOracleAttestation {
    pub operator: OperatorAddress,
    pub query_id: String,
    pub timestamp: u64,
    /// Hex `r‖s`.
    pub signature: String,
}

/// A validator's signature over the checkpoint recorded at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitBridgeValsetSignature {
    pub operator: OperatorAddress,
    pub timestamp: u64,
    pub signature: String,
}

/// Link the signer's operator to the EVM address of a secp256k1 public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRegisterOperatorPubkey {
    /// Signing account; the operator it controls is looked up, never supplied.
    pub creator: String,
    /// Hex SEC1 public key, compressed or uncompressed.
    pub pubkey: String,
}

/// Claim that `signature` covers a snapshot that was never created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitAttestationEvidence {
    pub creator: String,
    pub query_id: String,
    /// Hex aggregate value.
    pub value: String,
    pub timestamp: u64,
    pub aggregate_power: u64,
    pub previous_timestamp: u64,
    pub next_timestamp: u64,
    pub valset_checkpoint: String,
    pub attestation_timestamp: u64,
    pub last_consensus_timestamp: u64,
    pub signature: String,
}

/// Claim that `validator_signature` covers a checkpoint that was never recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitValsetSignatureEvidence {
    pub creator: String,
    pub valset_timestamp: u64,
    pub valset_hash: String,
    pub power_threshold: u64,
    pub validator_signature: String,
}

/// Governance update of [`Params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateParams {
    pub authority: String,
    pub params: Params,
}

/// Transaction surface.
pub trait BridgeMsgApi {
    /// Create a fresh snapshot of an existing report.
    ///
    /// Returns `None` when the per-block snapshot limit dropped the request.
    fn request_attestations(
        &mut self,
        ctx: &BlockContext,
        msg: MsgRequestAttestations,
    ) -> BridgeResult<Option<Hash>>;

    fn submit_oracle_attestation(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitOracleAttestation,
    ) -> BridgeResult<()>;

    fn submit_bridge_valset_signature(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitBridgeValsetSignature,
    ) -> BridgeResult<()>;

    /// Returns the registered EVM address.
    fn register_operator_pubkey(
        &mut self,
        ctx: &BlockContext,
        msg: MsgRegisterOperatorPubkey,
    ) -> BridgeResult<[u8; 20]>;

    /// Returns the slashed amount.
    fn submit_attestation_evidence(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitAttestationEvidence,
    ) -> BridgeResult<u64>;

    /// Returns the slashed amount.
    fn submit_valset_signature_evidence(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitValsetSignatureEvidence,
    ) -> BridgeResult<u64>;

    fn update_params(&mut self, ctx: &BlockContext, msg: MsgUpdateParams) -> BridgeResult<()>;
}

// =============================================================================
// QUERIES
// =============================================================================

/// Query failure as seen by RPC clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<BridgeError> for QueryError {
    fn from(err: BridgeError) -> Self {
        match err.category() {
            ErrorCategory::Input => QueryError::InvalidArgument(err.to_string()),
            ErrorCategory::NotFound => QueryError::NotFound(err.to_string()),
            _ => QueryError::Internal(err.to_string()),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Signing status of one validator for one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidSignCheckpoint {
    pub did_sign: bool,
    /// Slot in the previous valset; `None` for the first checkpoint or non-members.
    pub slot: Option<usize>,
}

/// Read-only query surface.
///
/// Byte-valued arguments are hex strings; malformed hex is `InvalidArgument`.
pub trait BridgeQueryApi {
    fn params(&self) -> QueryResult<Params>;

    /// Rebuilt live from the staking module.
    fn current_validator_set(&self) -> QueryResult<BridgeValidatorSet>;

    fn validator_set_by_timestamp(&self, timestamp: u64) -> QueryResult<BridgeValidatorSet>;

    /// Latest checkpoint hash.
    fn validator_checkpoint(&self) -> QueryResult<Hash>;

    fn validator_checkpoint_params(&self, timestamp: u64) -> QueryResult<ValidatorCheckpointParams>;

    fn validator_timestamp_by_index(&self, index: u64) -> QueryResult<u64>;

    fn valset_signatures(&self, timestamp: u64) -> QueryResult<PositionalSignatures>;

    fn oracle_attestations(&self, snapshot: &str) -> QueryResult<PositionalSignatures>;

    fn snapshots_by_report(&self, query_id: &str, timestamp: u64) -> QueryResult<Vec<Hash>>;

    fn attestation_data_by_snapshot(&self, snapshot: &str) -> QueryResult<AttestationSnapshotData>;

    fn attestation_requests_by_height(&self, height: u64) -> QueryResult<Vec<Hash>>;

    fn evm_address_by_operator(&self, operator: &str) -> QueryResult<[u8; 20]>;

    fn operator_by_evm_address(&self, evm_address: &str) -> QueryResult<OperatorAddress>;

    fn last_withdrawal_id(&self) -> QueryResult<u64>;

    fn deposit_claimed(&self, deposit_id: u64) -> QueryResult<bool>;

    fn current_validator_set_timestamp(&self) -> QueryResult<u64>;

    fn latest_checkpoint_index(&self) -> QueryResult<u64>;

    fn validator_did_sign_checkpoint(
        &self,
        operator: &str,
        timestamp: u64,
    ) -> QueryResult<DidSignCheckpoint>;

    fn snapshot_limit(&self) -> QueryResult<u64>;
}
