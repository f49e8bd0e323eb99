//! Collection layout of the bridge store.
//!
//! One prefix byte per collection. Prefixes are part of the persisted
//! format and must never be reused.

use super::{Item, Map};
use crate::domain::entities::{
    AttestationSnapshotData, BridgeValidatorSet, PositionalSignatures, ValidatorCheckpointParams,
};
use crate::domain::params::Params;
use shared_types::{Address, Hash, OperatorAddress};

pub const PARAMS: Item<Params> = Item::new(0x00, "params");
pub const SNAPSHOT_LIMIT: Item<u64> = Item::new(0x01, "snapshot_limit");

// Checkpoints
/// Last saved validator set.
pub const BRIDGE_VALSET: Item<BridgeValidatorSet> = Item::new(0x02, "bridge_valset");
/// Latest checkpoint hash.
pub const VALIDATOR_CHECKPOINT: Item<Hash> = Item::new(0x03, "validator_checkpoint");
pub const LATEST_CHECKPOINT_IDX: Item<u64> = Item::new(0x04, "latest_checkpoint_idx");
pub const VALSET_BY_TIMESTAMP: Map<u64, BridgeValidatorSet> =
    Map::new(0x05, "valset_by_timestamp");
pub const CHECKPOINT_PARAMS: Map<u64, ValidatorCheckpointParams> =
    Map::new(0x06, "checkpoint_params");
pub const CHECKPOINT_TIMESTAMP_BY_HASH: Map<Hash, u64> =
    Map::new(0x07, "checkpoint_timestamp_by_hash");
pub const CHECKPOINT_IDX_TO_TIMESTAMP: Map<u64, u64> = Map::new(0x08, "checkpoint_idx_to_timestamp");
pub const TIMESTAMP_TO_CHECKPOINT_IDX: Map<u64, u64> = Map::new(0x09, "timestamp_to_checkpoint_idx");
pub const VALSET_SIGNATURES: Map<u64, PositionalSignatures> = Map::new(0x0a, "valset_signatures");

// Identity
pub const OPERATOR_TO_EVM: Map<OperatorAddress, Address> = Map::new(0x10, "operator_to_evm");
pub const EVM_TO_OPERATOR: Map<Address, OperatorAddress> = Map::new(0x11, "evm_to_operator");

// Attestations
/// Report key → snapshot hashes in creation order.
pub const SNAPSHOTS_BY_REPORT: Map<Hash, Vec<Hash>> = Map::new(0x18, "snapshots_by_report");
pub const SNAPSHOT_DATA: Map<Hash, AttestationSnapshotData> = Map::new(0x19, "snapshot_data");
pub const SNAPSHOT_ATTESTATIONS: Map<Hash, PositionalSignatures> =
    Map::new(0x1a, "snapshot_attestations");
pub const ATTEST_REQUESTS_BY_HEIGHT: Map<u64, Vec<Hash>> =
    Map::new(0x1b, "attest_requests_by_height");

// Token bridge cells, written by the deposit and withdrawal flows
pub const LATEST_WITHDRAWAL_ID: Item<u64> = Item::new(0x20, "latest_withdrawal_id");
pub const DEPOSIT_CLAIMED: Map<u64, bool> = Map::new(0x21, "deposit_claimed");

// Evidence ledgers
pub const ATTEST_EVIDENCE: Map<(OperatorAddress, u64), bool> = Map::new(0x28, "attest_evidence");
pub const VALSET_EVIDENCE: Map<(OperatorAddress, u64), bool> = Map::new(0x29, "valset_evidence");
