//! Events emitted by state transitions.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Address, Hash, OperatorAddress};

/// Bridge event, collected by the keeper and drained by the host.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    NewBridgeValidatorSet {
        #[serde_as(as = "Hex")]
        checkpoint: Hash,
        #[serde_as(as = "Hex")]
        valset_hash: Hash,
        timestamp: u64,
        power_threshold: u64,
        index: u64,
    },
    EvmAddressRegistered {
        operator: OperatorAddress,
        #[serde_as(as = "Hex")]
        evm_address: Address,
    },
    SnapshotCreated {
        #[serde_as(as = "Hex")]
        snapshot: Hash,
        #[serde_as(as = "Hex")]
        query_id: Vec<u8>,
        timestamp: u64,
        external: bool,
    },
    AttestationSignatureSlashed {
        operator: OperatorAddress,
        timestamp: u64,
        slashed: u64,
    },
    ValsetSignatureSlashed {
        operator: OperatorAddress,
        timestamp: u64,
        slashed: u64,
    },
    ParamsUpdated,
}

impl BridgeEvent {
    /// Event type string as seen by indexers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewBridgeValidatorSet { .. } => "new_bridge_validator_set",
            Self::EvmAddressRegistered { .. } => "evm_address_registered",
            Self::SnapshotCreated { .. } => "snapshot_created",
            Self::AttestationSignatureSlashed { .. } => "attestation_signature_slashed",
            Self::ValsetSignatureSlashed { .. } => "valset_signature_slashed",
            Self::ParamsUpdated => "params_updated",
        }
    }
}
