//! # Evidence Engine
//!
//! Permissionless fraud proofs against attestation and checkpoint signatures.
//!
//! ```text
//! age check ─→ recompute hash ─→ exists? ──yes──→ NotMalicious
//!                                  │ no
//!                                  ▼
//!                       recover signer ─→ registered operator?
//!                                  │
//!                       rate-limit ledger ─→ record ─→ slash ─→ jail
//! ```
//!
//! The ledger entry is written before slashing so that a failed slash
//! rolls it back together with everything else in the message.

use super::{staking_error, BridgeKeeper};
use crate::domain::encoding::{
    decode_hex, decode_hex_bytes32, encode_oracle_attestation_data, encode_valset_checkpoint,
    OracleAttestationData,
};
use crate::domain::entities::ValidatorCheckpointParams;
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::domain::params::{Decimal, Params};
use crate::domain::rate_limit::check_window;
use crate::ports::inbound::{MsgSubmitAttestationEvidence, MsgSubmitValsetSignatureEvidence};
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::{schema, Map};
use shared_types::{BlockContext, OperatorAddress};

/// Which anti-replay ledger an evidence kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceLedger {
    Attestation,
    Valset,
}

impl EvidenceLedger {
    fn map(self) -> Map<(OperatorAddress, u64), bool> {
        match self {
            EvidenceLedger::Attestation => schema::ATTEST_EVIDENCE,
            EvidenceLedger::Valset => schema::VALSET_EVIDENCE,
        }
    }

    fn window(self, params: &Params) -> u64 {
        match self {
            EvidenceLedger::Attestation => params.attest_rate_limit_window,
            EvidenceLedger::Valset => params.valset_rate_limit_window,
        }
    }
}

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    /// Slash the signer of an attestation over a snapshot that was never created.
    ///
    /// Returns the slashed amount.
    pub fn check_attestation_evidence(
        &mut self,
        ctx: &BlockContext,
        claim: &MsgSubmitAttestationEvidence,
    ) -> BridgeResult<u64> {
        self.check_unbonding_age(ctx, claim.attestation_timestamp)?;

        let checkpoint = decode_hex_bytes32("valset_checkpoint", &claim.valset_checkpoint)?;
        let signature = decode_hex("signature", &claim.signature)?;
        let snapshot = encode_oracle_attestation_data(&OracleAttestationData {
            query_id: decode_hex_bytes32("query_id", &claim.query_id)?,
            value: decode_hex("value", &claim.value)?,
            timestamp: claim.timestamp,
            aggregate_power: claim.aggregate_power,
            previous_timestamp: claim.previous_timestamp,
            next_timestamp: claim.next_timestamp,
            checkpoint,
            attestation_timestamp: claim.attestation_timestamp,
            last_consensus_timestamp: claim.last_consensus_timestamp,
        });

        if schema::SNAPSHOT_ATTESTATIONS.has(&self.store, &snapshot)? {
            return Err(BridgeError::NotMalicious("snapshot exists"));
        }

        let operator = self.operator_from_signature(&snapshot, &signature)?;
        let params = self.params()?;
        let timestamp = claim.attestation_timestamp;
        self.check_evidence_rate_limit(EvidenceLedger::Attestation, &operator, timestamp, &params)?;

        let checkpoint_params = self.checkpoint_params_by_checkpoint(&checkpoint)?;
        EvidenceLedger::Attestation
            .map()
            .set(&mut self.store, &(operator.clone(), timestamp), &true)?;
        let slashed =
            self.slash_validator(&operator, params.attest_slash_percentage, &checkpoint_params)?;

        tracing::info!(
            "[qc-18] Slashed {} by {} for attestation at {}",
            operator,
            slashed,
            timestamp
        );
        self.emit(BridgeEvent::AttestationSignatureSlashed {
            operator,
            timestamp,
            slashed,
        });
        Ok(slashed)
    }

    /// Slash the signer of a checkpoint that was never recorded.
    ///
    /// Returns the slashed amount.
    pub fn check_valset_signature_evidence(
        &mut self,
        ctx: &BlockContext,
        claim: &MsgSubmitValsetSignatureEvidence,
    ) -> BridgeResult<u64> {
        let timestamp = claim.valset_timestamp;
        self.check_unbonding_age(ctx, timestamp)?;

        let params = self.params()?;
        let cutoff = params.attest_penalty_time_cutoff;
        if cutoff > 0 && timestamp < cutoff {
            return Err(BridgeError::BeforePenaltyCutoff { timestamp, cutoff });
        }

        let valset_hash = decode_hex_bytes32("valset_hash", &claim.valset_hash)?;
        let signature = decode_hex("validator_signature", &claim.validator_signature)?;
        let checkpoint = encode_valset_checkpoint(
            &self.domain_separator()?,
            claim.power_threshold,
            timestamp,
            &valset_hash,
        );

        if let Some(recorded) = schema::CHECKPOINT_PARAMS.get(&self.store, &timestamp)? {
            if recorded.checkpoint == checkpoint {
                return Err(BridgeError::NotMalicious(
                    "checkpoint matches the recorded checkpoint",
                ));
            }
        }

        let operator = self.operator_from_signature(&checkpoint, &signature)?;
        self.check_evidence_rate_limit(EvidenceLedger::Valset, &operator, timestamp, &params)?;

        let checkpoint_params = self
            .checkpoint_params_before(timestamp)?
            .ok_or_else(|| BridgeError::not_found("checkpoint before", timestamp))?;
        EvidenceLedger::Valset
            .map()
            .set(&mut self.store, &(operator.clone(), timestamp), &true)?;
        let slashed =
            self.slash_validator(&operator, params.valset_slash_percentage, &checkpoint_params)?;

        tracing::info!(
            "[qc-18] Slashed {} by {} for valset signature at {}",
            operator,
            slashed,
            timestamp
        );
        self.emit(BridgeEvent::ValsetSignatureSlashed {
            operator,
            timestamp,
            slashed,
        });
        Ok(slashed)
    }

    /// Bonded stake can only be slashed within the unbonding period.
    fn check_unbonding_age(&self, ctx: &BlockContext, timestamp: u64) -> BridgeResult<()> {
        let unbonding = self
            .staking
            .unbonding_time_ms()
            .map_err(|e| staking_error("unbonding time", e))?;
        let oldest_allowed = ctx.time_ms.saturating_sub(unbonding);
        if timestamp < oldest_allowed {
            return Err(BridgeError::OlderThanUnbonding {
                timestamp,
                oldest_allowed,
            });
        }
        Ok(())
    }

    /// Reject duplicates and evidence within the window of recorded evidence.
    pub fn check_evidence_rate_limit(
        &self,
        ledger: EvidenceLedger,
        operator: &OperatorAddress,
        timestamp: u64,
        params: &Params,
    ) -> BridgeResult<()> {
        let map = ledger.map();
        if map.has(&self.store, &(operator.clone(), timestamp))? {
            return Err(BridgeError::DuplicateEvidence {
                operator: operator.to_string(),
                timestamp,
            });
        }
        let before = self.evidence_submitted_before(ledger, operator, timestamp)?;
        let after = self.evidence_submitted_after(ledger, operator, timestamp)?;
        check_window(operator, timestamp, ledger.window(params), before, after)
    }

    /// Latest recorded evidence timestamp for `operator` strictly before `timestamp`.
    pub fn evidence_submitted_before(
        &self,
        ledger: EvidenceLedger,
        operator: &OperatorAddress,
        timestamp: u64,
    ) -> BridgeResult<Option<u64>> {
        Ok(ledger
            .map()
            .prefix_last_before(&self.store, operator, &timestamp)?
            .map(|(ts, _)| ts))
    }

    /// Earliest recorded evidence timestamp for `operator` strictly after `timestamp`.
    pub fn evidence_submitted_after(
        &self,
        ledger: EvidenceLedger,
        operator: &OperatorAddress,
        timestamp: u64,
    ) -> BridgeResult<Option<u64>> {
        Ok(ledger
            .map()
            .prefix_first_after(&self.store, operator, &timestamp)?
            .map(|(ts, _)| ts))
    }

    /// Slash `operator` for the power it held in the valset of `checkpoint`, then jail it.
    fn slash_validator(
        &self,
        operator: &OperatorAddress,
        fraction: Decimal,
        checkpoint: &ValidatorCheckpointParams,
    ) -> BridgeResult<u64> {
        let validator = self
            .staking
            .validator(operator)
            .map_err(|e| staking_error("validator", e))?;
        let evm_address = self.evm_address_by_operator(operator)?;
        let historical_power = self
            .valset_by_timestamp(checkpoint.timestamp)?
            .power_of(&evm_address)
            .filter(|power| *power > 0)
            .ok_or_else(|| BridgeError::not_found("historical power", operator))?;

        let slashed = self
            .staking
            .slash_with_infraction_reason(
                &validator.consensus_address,
                checkpoint.block_height,
                historical_power,
                fraction,
            )
            .map_err(|e| staking_error("validator", e))?;
        self.staking
            .jail(&validator.consensus_address)
            .map_err(|e| staking_error("validator", e))?;
        Ok(slashed)
    }
}
