//! Read-only query handlers.

use super::BridgeKeeper;
use crate::domain::encoding::{decode_hex, decode_hex_bytes32};
use crate::domain::entities::{
    AttestationSnapshotData, BridgeValidatorSet, PositionalSignatures, ValidatorCheckpointParams,
};
use crate::domain::errors::BridgeError;
use crate::domain::params::Params;
use crate::ports::inbound::{BridgeQueryApi, DidSignCheckpoint, QueryError, QueryResult};
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::schema;
use shared_types::{Address, Hash, OperatorAddress};

fn parse_evm_address(value: &str) -> QueryResult<Address> {
    let bytes = decode_hex("evm_address", value)?;
    Address::try_from(bytes.as_slice()).map_err(|_| {
        QueryError::InvalidArgument(format!("evm_address must be 20 bytes, got {}", bytes.len()))
    })
}

fn parse_operator(value: &str) -> QueryResult<OperatorAddress> {
    if value.trim().is_empty() {
        return Err(QueryError::InvalidArgument("operator address is empty".into()));
    }
    Ok(OperatorAddress::from(value))
}

impl<S, K, O> BridgeQueryApi for BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    fn params(&self) -> QueryResult<Params> {
        Ok(BridgeKeeper::params(self)?)
    }

    fn current_validator_set(&self) -> QueryResult<BridgeValidatorSet> {
        Ok(BridgeKeeper::current_validator_set(self)?)
    }

    fn validator_set_by_timestamp(&self, timestamp: u64) -> QueryResult<BridgeValidatorSet> {
        Ok(self.valset_by_timestamp(timestamp)?)
    }

    fn validator_checkpoint(&self) -> QueryResult<Hash> {
        Ok(BridgeKeeper::validator_checkpoint(self)?)
    }

    fn validator_checkpoint_params(&self, timestamp: u64) -> QueryResult<ValidatorCheckpointParams> {
        Ok(self.checkpoint_params(timestamp)?)
    }

    fn validator_timestamp_by_index(&self, index: u64) -> QueryResult<u64> {
        Ok(BridgeKeeper::validator_timestamp_by_index(self, index)?)
    }

    fn valset_signatures(&self, timestamp: u64) -> QueryResult<PositionalSignatures> {
        Ok(BridgeKeeper::valset_signatures(self, timestamp)?)
    }

    fn oracle_attestations(&self, snapshot: &str) -> QueryResult<PositionalSignatures> {
        let snapshot = decode_hex_bytes32("snapshot", snapshot)?;
        Ok(BridgeKeeper::oracle_attestations(self, &snapshot)?)
    }

    fn snapshots_by_report(&self, query_id: &str, timestamp: u64) -> QueryResult<Vec<Hash>> {
        let query_id = decode_hex("query_id", query_id)?;
        Ok(BridgeKeeper::snapshots_by_report(self, &query_id, timestamp)?)
    }

    fn attestation_data_by_snapshot(&self, snapshot: &str) -> QueryResult<AttestationSnapshotData> {
        let snapshot = decode_hex_bytes32("snapshot", snapshot)?;
        Ok(BridgeKeeper::attestation_data_by_snapshot(self, &snapshot)?)
    }

    fn attestation_requests_by_height(&self, height: u64) -> QueryResult<Vec<Hash>> {
        Ok(BridgeKeeper::attestation_requests_by_height(self, height)?)
    }

    fn evm_address_by_operator(&self, operator: &str) -> QueryResult<[u8; 20]> {
        let operator = parse_operator(operator)?;
        Ok(BridgeKeeper::evm_address_by_operator(self, &operator)?)
    }

    fn operator_by_evm_address(&self, evm_address: &str) -> QueryResult<OperatorAddress> {
        let evm_address = parse_evm_address(evm_address)?;
        Ok(BridgeKeeper::operator_by_evm_address(self, &evm_address)?)
    }

    fn last_withdrawal_id(&self) -> QueryResult<u64> {
        Ok(schema::LATEST_WITHDRAWAL_ID
            .get(&self.store)
            .map_err(BridgeError::from)?
            .unwrap_or(0))
    }

    fn deposit_claimed(&self, deposit_id: u64) -> QueryResult<bool> {
        Ok(schema::DEPOSIT_CLAIMED
            .get(&self.store, &deposit_id)
            .map_err(BridgeError::from)?
            .unwrap_or(false))
    }

    fn current_validator_set_timestamp(&self) -> QueryResult<u64> {
        Ok(BridgeKeeper::current_validator_set_timestamp(self)?)
    }

    fn latest_checkpoint_index(&self) -> QueryResult<u64> {
        Ok(BridgeKeeper::latest_checkpoint_index(self)?)
    }

    fn validator_did_sign_checkpoint(
        &self,
        operator: &str,
        timestamp: u64,
    ) -> QueryResult<DidSignCheckpoint> {
        let operator = parse_operator(operator)?;
        Ok(BridgeKeeper::validator_did_sign_checkpoint(self, &operator, timestamp)?)
    }

    fn snapshot_limit(&self) -> QueryResult<u64> {
        Ok(BridgeKeeper::snapshot_limit(self)?)
    }
}
