//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the bridge keeper: an ordered key-value store,
//! the staking and oracle collaborators, and the local signing capability
//! used by vote extensions.

use crate::domain::params::Decimal;
use serde::{Deserialize, Serialize};
use shared_types::{ConsensusAddress, OperatorAddress, StoreError};
use std::ops::ControlFlow;
use thiserror::Error;

// =============================================================================
// STORAGE
// =============================================================================

/// Iteration order of a range walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Half-open key range `[start, end)`; `end = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: Option<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end,
        }
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: prefix.to_vec(),
            end: prefix_end(prefix),
        }
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// `None` when the prefix is all `0xff` (no upper bound).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Abstract interface for the deterministic key-value store.
///
/// Keys iterate in lexicographic byte order.
///
/// Production: the host chain's committed store
/// Testing: `InMemoryKVStore` (adapters/memory_store.rs)
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Visit the entries of `range` in `order` until `visit` breaks.
    fn range_walk(
        &self,
        range: &KeyRange,
        order: Order,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<(), StoreError>;
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

/// A staking validator as seen by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingValidator {
    pub operator_address: OperatorAddress,
    pub consensus_address: ConsensusAddress,
    /// Bonded tokens divided by the power reduction.
    pub consensus_power: u64,
    pub jailed: bool,
}

/// Staking module capabilities the bridge consumes.
pub trait StakingKeeper: Send + Sync {
    /// Bonded validators in the staking module's own order.
    fn validators(&self) -> Result<Vec<StakingValidator>, CollaboratorError>;

    fn validator(&self, operator: &OperatorAddress) -> Result<StakingValidator, CollaboratorError>;

    fn validator_by_consensus_address(
        &self,
        consensus: &ConsensusAddress,
    ) -> Result<StakingValidator, CollaboratorError>;

    /// Validator whose operator is controlled by the account `account`.
    ///
    /// Account and operator addresses share key bytes; only the bech32
    /// prefix differs, and converting between them is the host's concern.
    fn validator_by_account(&self, account: &str) -> Result<StakingValidator, CollaboratorError>;

    /// SEC1-encoded secp256k1 consensus key the validator signs votes with.
    fn consensus_pubkey(&self, consensus: &ConsensusAddress) -> Result<Vec<u8>, CollaboratorError>;

    fn unbonding_time_ms(&self) -> Result<u64, CollaboratorError>;

    /// Slash `fraction` of the stake the validator had at `infraction_height`,
    /// where it had `power`. Returns the amount burned.
    fn slash_with_infraction_reason(
        &self,
        consensus: &ConsensusAddress,
        infraction_height: u64,
        power: u64,
        fraction: Decimal,
    ) -> Result<u64, CollaboratorError>;

    fn jail(&self, consensus: &ConsensusAddress) -> Result<(), CollaboratorError>;
}

/// An aggregated oracle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub query_id: Vec<u8>,
    /// Hex-encoded aggregate value.
    pub aggregate_value: String,
    pub aggregate_power: u64,
    pub timestamp_ms: u64,
    pub height: u64,
    /// Disputed and flagged as evidence.
    pub flagged: bool,
}

/// A report submitted without reporter stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoStakeReport {
    pub query_id: Vec<u8>,
    pub value: String,
    pub timestamp_ms: u64,
    pub block_number: u64,
}

/// Oracle module capabilities the bridge consumes.
pub trait OracleKeeper: Send + Sync {
    /// Aggregates finalized at `height`, in finalization order.
    fn aggregated_reports_at_height(&self, height: u64) -> Vec<AggregateReport>;

    fn aggregate_by_timestamp(
        &self,
        query_id: &[u8],
        timestamp_ms: u64,
    ) -> Result<AggregateReport, CollaboratorError>;

    fn no_stake_report_by_timestamp(
        &self,
        query_id: &[u8],
        timestamp_ms: u64,
    ) -> Result<NoStakeReport, CollaboratorError>;

    /// Latest report timestamp strictly before `timestamp_ms`.
    fn timestamp_before(&self, query_id: &[u8], timestamp_ms: u64) -> Result<u64, CollaboratorError>;

    /// Earliest report timestamp strictly after `timestamp_ms`.
    fn timestamp_after(&self, query_id: &[u8], timestamp_ms: u64) -> Result<u64, CollaboratorError>;

    /// Latest aggregate and its timestamp.
    fn current_aggregate_report(
        &self,
        query_id: &[u8],
    ) -> Result<(AggregateReport, u64), CollaboratorError>;
}

// =============================================================================
// LOCAL SIGNING
// =============================================================================

/// Local signing capability of one validator node, configured at startup.
///
/// `sign` hashes its input with SHA-256 and returns a 64-byte `r‖s` signature.
pub trait BridgeSigner: Send + Sync {
    /// Operator this key belongs to.
    fn operator_address(&self) -> &OperatorAddress;

    /// Name of the key in the local key store.
    fn key_id(&self) -> &str;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CollaboratorError>;
}
