//! Validator sets, checkpoints and checkpoint signatures.

use super::{staking_error, BridgeKeeper};
use crate::domain::encoding::{
    encode_and_hash_validator_set, encode_valset_checkpoint, signature_matches,
};
use crate::domain::entities::{
    BridgeValidator, BridgeValidatorSet, PositionalSignatures, ValidatorCheckpointParams,
};
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::domain::valset::{classify, ValsetChange, VALSET_STALE_AFTER_MS};
use crate::ports::inbound::DidSignCheckpoint;
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::schema;
use shared_types::{Address, BlockContext, Hash, OperatorAddress};

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    // =========================================================================
    // VALIDATOR SET CONSTRUCTION
    // =========================================================================

    /// Build the EVM-compatible validator set from staking.
    ///
    /// Validators without an EVM address or without power are left out.
    pub fn current_validator_set(&self) -> BridgeResult<BridgeValidatorSet> {
        let validators = self
            .staking
            .validators()
            .map_err(|e| staking_error("validators", e))?;

        let mut members = Vec::with_capacity(validators.len());
        for validator in validators {
            if validator.consensus_power == 0 {
                continue;
            }
            match schema::OPERATOR_TO_EVM.get(&self.store, &validator.operator_address)? {
                Some(ethereum_address) => members.push(BridgeValidator {
                    ethereum_address,
                    power: validator.consensus_power,
                }),
                None => tracing::debug!(
                    "[qc-18] Skipping {}: no EVM address",
                    validator.operator_address
                ),
            }
        }

        if members.is_empty() {
            return Err(BridgeError::NoValidators);
        }
        Ok(BridgeValidatorSet::sorted(members))
    }

    /// Rebuild the set and record a checkpoint if it changed enough.
    ///
    /// Returns whether a checkpoint was recorded.
    pub fn compare_and_set_bridge_validators(&mut self, ctx: &BlockContext) -> BridgeResult<bool> {
        let current = self.current_validator_set()?;
        let saved = schema::BRIDGE_VALSET.get(&self.store)?;
        let stale = match saved {
            Some(_) => self.last_saved_validator_set_stale(ctx)?,
            None => false,
        };

        let change = classify(saved.as_ref(), &current, stale);
        if !change.needs_checkpoint() {
            return Ok(false);
        }
        match change {
            ValsetChange::Changed { diff_ppm } => {
                tracing::info!("[qc-18] Validator power moved {} ppm", diff_ppm)
            }
            ValsetChange::Stale => tracing::info!("[qc-18] Refreshing stale checkpoint"),
            _ => {}
        }

        schema::BRIDGE_VALSET.set(&mut self.store, &current)?;
        self.record_checkpoint(ctx, &current)?;
        Ok(true)
    }

    /// Whether the checkpoint in force is older than the staleness horizon.
    pub fn last_saved_validator_set_stale(&self, ctx: &BlockContext) -> BridgeResult<bool> {
        let reference = ctx.time_ms + 1_000;
        let (timestamp, _) = schema::CHECKPOINT_PARAMS
            .last_before(&self.store, &reference)?
            .ok_or_else(|| BridgeError::not_found("checkpoint before", reference))?;
        Ok(timestamp < reference.saturating_sub(VALSET_STALE_AFTER_MS))
    }

    // =========================================================================
    // CHECKPOINTS
    // =========================================================================

    /// Hash `valset` into a checkpoint activated at block time and index it.
    pub fn record_checkpoint(
        &mut self,
        ctx: &BlockContext,
        valset: &BridgeValidatorSet,
    ) -> BridgeResult<ValidatorCheckpointParams> {
        let timestamp = ctx.time_ms;
        let latest_index = schema::LATEST_CHECKPOINT_IDX.get(&self.store)?;
        let previous_valset = match latest_index {
            Some(index) => {
                let latest = self.validator_timestamp_by_index(index)?;
                if timestamp <= latest {
                    return Err(BridgeError::CheckpointConflict { timestamp, latest });
                }
                Some(self.valset_by_timestamp(latest)?)
            }
            None => None,
        };
        let index = latest_index.map_or(0, |i| i + 1);

        let power_threshold = valset.power_threshold();
        let (_, valset_hash) = encode_and_hash_validator_set(valset);
        let domain = self.domain_separator()?;
        let checkpoint = encode_valset_checkpoint(&domain, power_threshold, timestamp, &valset_hash);
        let params = ValidatorCheckpointParams {
            checkpoint,
            valset_hash,
            timestamp,
            power_threshold,
            block_height: ctx.height,
        };

        // Signers of checkpoint i are the members of checkpoint i - 1.
        let slots = previous_valset.as_ref().unwrap_or(valset).len();

        schema::VALIDATOR_CHECKPOINT.set(&mut self.store, &checkpoint)?;
        schema::VALSET_BY_TIMESTAMP.set(&mut self.store, &timestamp, valset)?;
        schema::CHECKPOINT_PARAMS.set(&mut self.store, &timestamp, &params)?;
        schema::CHECKPOINT_TIMESTAMP_BY_HASH.set(&mut self.store, &checkpoint, &timestamp)?;
        schema::CHECKPOINT_IDX_TO_TIMESTAMP.set(&mut self.store, &index, &timestamp)?;
        schema::TIMESTAMP_TO_CHECKPOINT_IDX.set(&mut self.store, &timestamp, &index)?;
        schema::LATEST_CHECKPOINT_IDX.set(&mut self.store, &index)?;
        schema::VALSET_SIGNATURES.set(
            &mut self.store,
            &timestamp,
            &PositionalSignatures::new(slots),
        )?;

        tracing::info!(
            "[qc-18] New checkpoint #{} at {} ({} validators, threshold {})",
            index,
            timestamp,
            valset.len(),
            power_threshold
        );
        self.emit(BridgeEvent::NewBridgeValidatorSet {
            checkpoint,
            valset_hash,
            timestamp,
            power_threshold,
            index,
        });
        Ok(params)
    }

    /// Latest checkpoint hash.
    pub fn validator_checkpoint(&self) -> BridgeResult<Hash> {
        schema::VALIDATOR_CHECKPOINT
            .get(&self.store)?
            .ok_or_else(|| BridgeError::not_found("validator checkpoint", "latest"))
    }

    pub fn latest_checkpoint_index(&self) -> BridgeResult<u64> {
        schema::LATEST_CHECKPOINT_IDX
            .get(&self.store)?
            .ok_or_else(|| BridgeError::not_found("checkpoint index", "latest"))
    }

    pub fn validator_timestamp_by_index(&self, index: u64) -> BridgeResult<u64> {
        schema::CHECKPOINT_IDX_TO_TIMESTAMP
            .get(&self.store, &index)?
            .ok_or_else(|| BridgeError::not_found("checkpoint timestamp", index))
    }

    pub fn checkpoint_index_by_timestamp(&self, timestamp: u64) -> BridgeResult<u64> {
        schema::TIMESTAMP_TO_CHECKPOINT_IDX
            .get(&self.store, &timestamp)?
            .ok_or_else(|| BridgeError::not_found("checkpoint index", timestamp))
    }

    /// Activation time of the checkpoint in force.
    pub fn current_validator_set_timestamp(&self) -> BridgeResult<u64> {
        let index = self.latest_checkpoint_index()?;
        self.validator_timestamp_by_index(index)
    }

    pub fn checkpoint_params(&self, timestamp: u64) -> BridgeResult<ValidatorCheckpointParams> {
        schema::CHECKPOINT_PARAMS
            .get(&self.store, &timestamp)?
            .ok_or_else(|| BridgeError::not_found("checkpoint params", timestamp))
    }

    /// Nearest checkpoint strictly before `timestamp`.
    pub fn checkpoint_params_before(
        &self,
        timestamp: u64,
    ) -> BridgeResult<Option<ValidatorCheckpointParams>> {
        Ok(schema::CHECKPOINT_PARAMS
            .last_before(&self.store, &timestamp)?
            .map(|(_, params)| params))
    }

    /// Nearest checkpoint strictly after `timestamp`.
    pub fn checkpoint_params_after(
        &self,
        timestamp: u64,
    ) -> BridgeResult<Option<ValidatorCheckpointParams>> {
        Ok(schema::CHECKPOINT_PARAMS
            .first_after(&self.store, &timestamp)?
            .map(|(_, params)| params))
    }

    pub fn checkpoint_params_by_checkpoint(
        &self,
        checkpoint: &Hash,
    ) -> BridgeResult<ValidatorCheckpointParams> {
        let timestamp = schema::CHECKPOINT_TIMESTAMP_BY_HASH
            .get(&self.store, checkpoint)?
            .ok_or_else(|| BridgeError::not_found("checkpoint", hex::encode(checkpoint)))?;
        self.checkpoint_params(timestamp)
    }

    pub fn valset_by_timestamp(&self, timestamp: u64) -> BridgeResult<BridgeValidatorSet> {
        schema::VALSET_BY_TIMESTAMP
            .get(&self.store, &timestamp)?
            .ok_or_else(|| BridgeError::not_found("validator set", timestamp))
    }

    /// Validator set bound to a checkpoint hash.
    pub fn valset_for_checkpoint(&self, checkpoint: &Hash) -> BridgeResult<BridgeValidatorSet> {
        let params = self.checkpoint_params_by_checkpoint(checkpoint)?;
        self.valset_by_timestamp(params.timestamp)
    }

    // =========================================================================
    // CHECKPOINT SIGNATURES
    // =========================================================================

    pub fn valset_signatures(&self, timestamp: u64) -> BridgeResult<PositionalSignatures> {
        schema::VALSET_SIGNATURES
            .get(&self.store, &timestamp)?
            .ok_or_else(|| BridgeError::not_found("valset signatures", timestamp))
    }

    /// Signers of the checkpoint at `timestamp`; `None` for the first checkpoint.
    pub fn signing_valset(&self, timestamp: u64) -> BridgeResult<Option<BridgeValidatorSet>> {
        let index = self.checkpoint_index_by_timestamp(timestamp)?;
        if index == 0 {
            return Ok(None);
        }
        let previous = self.validator_timestamp_by_index(index - 1)?;
        self.valset_by_timestamp(previous).map(Some)
    }

    pub fn validator_did_sign_checkpoint(
        &self,
        operator: &OperatorAddress,
        timestamp: u64,
    ) -> BridgeResult<DidSignCheckpoint> {
        let Some(signers) = self.signing_valset(timestamp)? else {
            return Ok(DidSignCheckpoint {
                did_sign: false,
                slot: None,
            });
        };
        let evm_address = self.evm_address_by_operator(operator)?;
        let signatures = self.valset_signatures(timestamp)?;
        let slot = signers.position(&evm_address);
        Ok(DidSignCheckpoint {
            did_sign: slot.is_some_and(|s| signatures.is_signed(s)),
            slot,
        })
    }

    /// Check that `signature` is `evm_address`'s signature over the checkpoint at `timestamp`.
    pub fn verify_valset_signature(
        &self,
        evm_address: &Address,
        timestamp: u64,
        signature: &[u8],
    ) -> BridgeResult<()> {
        let params = self.checkpoint_params(timestamp)?;
        if !signature_matches(&params.checkpoint, signature, evm_address)? {
            return Err(BridgeError::SignerMismatch {
                operator: hex::encode(evm_address),
            });
        }
        Ok(())
    }

    /// Store `signature` in the operator's slot of the checkpoint at `timestamp`.
    pub fn record_valset_signature(
        &mut self,
        operator: &OperatorAddress,
        timestamp: u64,
        signature: Vec<u8>,
    ) -> BridgeResult<()> {
        let mut signatures = self.valset_signatures(timestamp)?;
        let evm_address = self.evm_address_by_operator(operator)?;
        let Some(signers) = self.signing_valset(timestamp)? else {
            tracing::debug!("[qc-18] First checkpoint needs no signatures");
            return Ok(());
        };
        let slot = signers
            .position(&evm_address)
            .ok_or_else(|| BridgeError::not_found("signer slot", operator))?;

        signatures.set(slot, signature)?;
        schema::VALSET_SIGNATURES.set(&mut self.store, &timestamp, &signatures)?;
        tracing::debug!(
            "[qc-18] Valset signature from {} for {} in slot {}",
            operator,
            timestamp,
            slot
        );
        Ok(())
    }
}
