//! In-memory collaborator doubles for tests and local simulation.
//!
//! `MockStakingKeeper` tracks tokens per operator with a power reduction of 1,
//! so consensus power equals tokens. An operator `tellorvaloper1x` is
//! controlled by the account `tellor1x`. `MockOracleKeeper` serves aggregate and
//! no-stake reports registered by the test.

use crate::domain::params::Decimal;
use crate::ports::outbound::{
    AggregateReport, CollaboratorError, NoStakeReport, OracleKeeper, StakingKeeper,
    StakingValidator,
};
use parking_lot::RwLock;
use shared_crypto::{sha256, Secp256k1PublicKey};
use shared_types::{ConsensusAddress, OperatorAddress};
use std::collections::BTreeMap;

/// Default unbonding period: 21 days.
pub const DEFAULT_UNBONDING_TIME_MS: u64 = 21 * 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone)]
struct MockValidator {
    consensus_address: ConsensusAddress,
    consensus_key: Option<Vec<u8>>,
    tokens: u64,
    jailed: bool,
}

/// A slash as observed by the staking double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashRecord {
    pub operator: OperatorAddress,
    pub infraction_height: u64,
    pub power: u64,
    pub fraction: Decimal,
    pub amount: u64,
}

#[derive(Debug, Default)]
struct StakingState {
    validators: BTreeMap<OperatorAddress, MockValidator>,
    unbonding_time_ms: u64,
    slashes: Vec<SlashRecord>,
}

/// Staking double.
#[derive(Debug)]
pub struct MockStakingKeeper {
    state: RwLock<StakingState>,
}

impl Default for MockStakingKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStakingKeeper {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StakingState {
                unbonding_time_ms: DEFAULT_UNBONDING_TIME_MS,
                ..StakingState::default()
            }),
        }
    }

    /// Consensus address the double assigns to `operator`.
    pub fn consensus_address_of(operator: &OperatorAddress) -> ConsensusAddress {
        ConsensusAddress(sha256(operator.as_str().as_bytes())[..20].to_vec())
    }

    /// Account that controls `operator`.
    pub fn account_of(operator: &OperatorAddress) -> String {
        operator.as_str().replacen("valoper", "", 1)
    }

    /// Bond `tokens` for `operator`, replacing any previous entry.
    pub fn add_validator(&self, operator: &OperatorAddress, tokens: u64) -> ConsensusAddress {
        let consensus_address = Self::consensus_address_of(operator);
        self.state.write().validators.insert(
            operator.clone(),
            MockValidator {
                consensus_address: consensus_address.clone(),
                consensus_key: None,
                tokens,
                jailed: false,
            },
        );
        consensus_address
    }

    pub fn set_consensus_key(&self, operator: &OperatorAddress, key: &Secp256k1PublicKey) {
        if let Some(validator) = self.state.write().validators.get_mut(operator) {
            validator.consensus_key = Some(key.to_compressed_bytes().to_vec());
        }
    }

    pub fn set_tokens(&self, operator: &OperatorAddress, tokens: u64) {
        if let Some(validator) = self.state.write().validators.get_mut(operator) {
            validator.tokens = tokens;
        }
    }

    pub fn tokens(&self, operator: &OperatorAddress) -> Option<u64> {
        self.state.read().validators.get(operator).map(|v| v.tokens)
    }

    pub fn is_jailed(&self, operator: &OperatorAddress) -> bool {
        self.state
            .read()
            .validators
            .get(operator)
            .is_some_and(|v| v.jailed)
    }

    pub fn set_unbonding_time(&self, unbonding_time_ms: u64) {
        self.state.write().unbonding_time_ms = unbonding_time_ms;
    }

    pub fn slashes(&self) -> Vec<SlashRecord> {
        self.state.read().slashes.clone()
    }

    fn to_staking_validator(operator: &OperatorAddress, validator: &MockValidator) -> StakingValidator {
        StakingValidator {
            operator_address: operator.clone(),
            consensus_address: validator.consensus_address.clone(),
            consensus_power: if validator.jailed { 0 } else { validator.tokens },
            jailed: validator.jailed,
        }
    }
}

impl StakingKeeper for MockStakingKeeper {
    fn validators(&self) -> Result<Vec<StakingValidator>, CollaboratorError> {
        Ok(self
            .state
            .read()
            .validators
            .iter()
            .map(|(operator, validator)| Self::to_staking_validator(operator, validator))
            .collect())
    }

    fn validator(&self, operator: &OperatorAddress) -> Result<StakingValidator, CollaboratorError> {
        self.state
            .read()
            .validators
            .get(operator)
            .map(|validator| Self::to_staking_validator(operator, validator))
            .ok_or_else(|| CollaboratorError::NotFound(operator.to_string()))
    }

    fn validator_by_consensus_address(
        &self,
        consensus: &ConsensusAddress,
    ) -> Result<StakingValidator, CollaboratorError> {
        self.state
            .read()
            .validators
            .iter()
            .find(|(_, validator)| &validator.consensus_address == consensus)
            .map(|(operator, validator)| Self::to_staking_validator(operator, validator))
            .ok_or_else(|| CollaboratorError::NotFound(consensus.to_string()))
    }

    fn validator_by_account(&self, account: &str) -> Result<StakingValidator, CollaboratorError> {
        self.state
            .read()
            .validators
            .iter()
            .find(|(operator, _)| Self::account_of(operator) == account)
            .map(|(operator, validator)| Self::to_staking_validator(operator, validator))
            .ok_or_else(|| CollaboratorError::NotFound(account.to_string()))
    }

    fn consensus_pubkey(&self, consensus: &ConsensusAddress) -> Result<Vec<u8>, CollaboratorError> {
        self.state
            .read()
            .validators
            .values()
            .find(|validator| &validator.consensus_address == consensus)
            .and_then(|validator| validator.consensus_key.clone())
            .ok_or_else(|| CollaboratorError::NotFound(consensus.to_string()))
    }

    fn unbonding_time_ms(&self) -> Result<u64, CollaboratorError> {
        Ok(self.state.read().unbonding_time_ms)
    }

    fn slash_with_infraction_reason(
        &self,
        consensus: &ConsensusAddress,
        infraction_height: u64,
        power: u64,
        fraction: Decimal,
    ) -> Result<u64, CollaboratorError> {
        let mut state = self.state.write();
        let (operator, validator) = state
            .validators
            .iter_mut()
            .find(|(_, validator)| &validator.consensus_address == consensus)
            .ok_or_else(|| CollaboratorError::NotFound(consensus.to_string()))?;
        let amount = fraction.mul_floor_u64(power).min(validator.tokens);
        validator.tokens -= amount;
        let record = SlashRecord {
            operator: operator.clone(),
            infraction_height,
            power,
            fraction,
            amount,
        };
        state.slashes.push(record);
        Ok(amount)
    }

    fn jail(&self, consensus: &ConsensusAddress) -> Result<(), CollaboratorError> {
        let mut state = self.state.write();
        let validator = state
            .validators
            .values_mut()
            .find(|validator| &validator.consensus_address == consensus)
            .ok_or_else(|| CollaboratorError::NotFound(consensus.to_string()))?;
        validator.jailed = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OracleState {
    /// Aggregates in finalization order.
    aggregates: Vec<AggregateReport>,
    no_stake: Vec<NoStakeReport>,
}

/// Oracle double.
#[derive(Debug, Default)]
pub struct MockOracleKeeper {
    state: RwLock<OracleState>,
}

impl MockOracleKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_aggregate(&self, report: AggregateReport) {
        self.state.write().aggregates.push(report);
    }

    pub fn add_no_stake_report(&self, report: NoStakeReport) {
        self.state.write().no_stake.push(report);
    }

    /// Mark the aggregate at `(query_id, timestamp_ms)` as dispute evidence.
    pub fn flag(&self, query_id: &[u8], timestamp_ms: u64) {
        let mut state = self.state.write();
        for report in state.aggregates.iter_mut() {
            if report.query_id == query_id && report.timestamp_ms == timestamp_ms {
                report.flagged = true;
            }
        }
    }

    fn timestamps(&self, query_id: &[u8]) -> Vec<u64> {
        let mut timestamps: Vec<u64> = self
            .state
            .read()
            .aggregates
            .iter()
            .filter(|r| r.query_id == query_id)
            .map(|r| r.timestamp_ms)
            .collect();
        timestamps.sort_unstable();
        timestamps
    }
}

fn not_found(query_id: &[u8], timestamp_ms: u64) -> CollaboratorError {
    CollaboratorError::NotFound(format!("{}@{}", hex::encode(query_id), timestamp_ms))
}

impl OracleKeeper for MockOracleKeeper {
    fn aggregated_reports_at_height(&self, height: u64) -> Vec<AggregateReport> {
        self.state
            .read()
            .aggregates
            .iter()
            .filter(|r| r.height == height)
            .cloned()
            .collect()
    }

    fn aggregate_by_timestamp(
        &self,
        query_id: &[u8],
        timestamp_ms: u64,
    ) -> Result<AggregateReport, CollaboratorError> {
        self.state
            .read()
            .aggregates
            .iter()
            .find(|r| r.query_id == query_id && r.timestamp_ms == timestamp_ms)
            .cloned()
            .ok_or_else(|| not_found(query_id, timestamp_ms))
    }

    fn no_stake_report_by_timestamp(
        &self,
        query_id: &[u8],
        timestamp_ms: u64,
    ) -> Result<NoStakeReport, CollaboratorError> {
        self.state
            .read()
            .no_stake
            .iter()
            .find(|r| r.query_id == query_id && r.timestamp_ms == timestamp_ms)
            .cloned()
            .ok_or_else(|| not_found(query_id, timestamp_ms))
    }

    fn timestamp_before(&self, query_id: &[u8], timestamp_ms: u64) -> Result<u64, CollaboratorError> {
        self.timestamps(query_id)
            .into_iter()
            .rev()
            .find(|ts| *ts < timestamp_ms)
            .ok_or_else(|| not_found(query_id, timestamp_ms))
    }

    fn timestamp_after(&self, query_id: &[u8], timestamp_ms: u64) -> Result<u64, CollaboratorError> {
        self.timestamps(query_id)
            .into_iter()
            .find(|ts| *ts > timestamp_ms)
            .ok_or_else(|| not_found(query_id, timestamp_ms))
    }

    fn current_aggregate_report(
        &self,
        query_id: &[u8],
    ) -> Result<(AggregateReport, u64), CollaboratorError> {
        let latest = self
            .timestamps(query_id)
            .last()
            .copied()
            .ok_or_else(|| CollaboratorError::NotFound(hex::encode(query_id)))?;
        let report = self.aggregate_by_timestamp(query_id, latest)?;
        Ok((report, latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staking_slash_and_jail() {
        let staking = MockStakingKeeper::new();
        let operator = OperatorAddress::from("tellorvaloper1abc");
        let consensus = staking.add_validator(&operator, 1_000);

        let fraction: Decimal = "0.01".parse().unwrap();
        let amount = staking
            .slash_with_infraction_reason(&consensus, 7, 1_000, fraction)
            .unwrap();
        staking.jail(&consensus).unwrap();

        assert_eq!(amount, 10);
        assert_eq!(staking.tokens(&operator), Some(990));
        assert!(staking.is_jailed(&operator));
        assert_eq!(staking.validator(&operator).unwrap().consensus_power, 0);
        assert_eq!(staking.slashes()[0].infraction_height, 7);
    }

    #[test]
    fn test_staking_account_and_consensus_key() {
        let staking = MockStakingKeeper::new();
        let operator = OperatorAddress::from("tellorvaloper1abc");
        let consensus = staking.add_validator(&operator, 10);

        let by_account = staking.validator_by_account("tellor1abc").unwrap();
        assert_eq!(by_account.operator_address, operator);
        assert!(staking.validator_by_account("tellor1zzz").is_err());

        assert!(staking.consensus_pubkey(&consensus).is_err());
        let key = shared_crypto::Secp256k1KeyPair::generate().public_key();
        staking.set_consensus_key(&operator, &key);
        assert_eq!(
            staking.consensus_pubkey(&consensus).unwrap(),
            key.to_compressed_bytes().to_vec()
        );
    }

    #[test]
    fn test_oracle_neighbour_timestamps() {
        let oracle = MockOracleKeeper::new();
        for ts in [100, 200, 300] {
            oracle.add_aggregate(AggregateReport {
                query_id: vec![1; 32],
                aggregate_value: "01".into(),
                aggregate_power: 10,
                timestamp_ms: ts,
                height: ts / 100,
                flagged: false,
            });
        }

        assert_eq!(oracle.timestamp_before(&[1; 32], 200).unwrap(), 100);
        assert_eq!(oracle.timestamp_after(&[1; 32], 200).unwrap(), 300);
        assert!(oracle.timestamp_before(&[1; 32], 100).is_err());
        assert_eq!(oracle.current_aggregate_report(&[1; 32]).unwrap().1, 300);
        assert_eq!(oracle.aggregated_reports_at_height(2).len(), 1);
    }
}
