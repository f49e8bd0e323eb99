//! Transaction handlers.
//!
//! Each handler runs inside [`BridgeKeeper::atomically`], so a failing
//! message leaves no writes and no events behind.

use super::{staking_error, BridgeKeeper};
use crate::domain::encoding::decode_hex;
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::ports::inbound::{
    BridgeMsgApi, MsgRegisterOperatorPubkey, MsgRequestAttestations, MsgSubmitAttestationEvidence,
    MsgSubmitBridgeValsetSignature, MsgSubmitOracleAttestation, MsgSubmitValsetSignatureEvidence,
    MsgUpdateParams,
};
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::schema;
use shared_types::{BlockContext, Hash};

impl<S, K, O> BridgeMsgApi for BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    fn request_attestations(
        &mut self,
        ctx: &BlockContext,
        msg: MsgRequestAttestations,
    ) -> BridgeResult<Option<Hash>> {
        let query_id = decode_hex("query_id", &msg.query_id)?;
        tracing::debug!(
            "[qc-18] {} requested attestations for {}@{}",
            msg.creator,
            msg.query_id,
            msg.timestamp
        );
        self.atomically(|k| k.create_snapshot(ctx, &query_id, msg.timestamp, true))
    }

    fn submit_oracle_attestation(
        &mut self,
        _ctx: &BlockContext,
        msg: MsgSubmitOracleAttestation,
    ) -> BridgeResult<()> {
        let query_id = decode_hex("query_id", &msg.query_id)?;
        let signature = decode_hex("signature", &msg.signature)?;
        self.atomically(|k| {
            let evm_address = k.evm_address_by_operator(&msg.operator)?;
            let snapshots = k.snapshots_by_report(&query_id, msg.timestamp)?;

            // Newest snapshot first: that is the one validators sign by default.
            let snapshot = snapshots
                .iter()
                .rev()
                .find(|snapshot| {
                    k.verify_oracle_attestation(
                        &evm_address,
                        &query_id,
                        msg.timestamp,
                        snapshot,
                        &signature,
                    )
                    .is_ok()
                })
                .copied()
                .ok_or_else(|| BridgeError::SignerMismatch {
                    operator: msg.operator.to_string(),
                })?;

            k.record_oracle_attestation(&msg.operator, &snapshot, signature)
        })
    }

    fn submit_bridge_valset_signature(
        &mut self,
        _ctx: &BlockContext,
        msg: MsgSubmitBridgeValsetSignature,
    ) -> BridgeResult<()> {
        let signature = decode_hex("signature", &msg.signature)?;
        self.atomically(|k| {
            let evm_address = k.evm_address_by_operator(&msg.operator)?;
            k.verify_valset_signature(&evm_address, msg.timestamp, &signature)?;
            k.record_valset_signature(&msg.operator, msg.timestamp, signature)
        })
    }

    fn register_operator_pubkey(
        &mut self,
        _ctx: &BlockContext,
        msg: MsgRegisterOperatorPubkey,
    ) -> BridgeResult<[u8; 20]> {
        let pubkey = decode_hex("pubkey", &msg.pubkey)?;
        let operator = self
            .staking
            .validator_by_account(&msg.creator)
            .map_err(|e| staking_error("validator", e))?
            .operator_address;
        self.atomically(|k| k.register_evm_address_from_pubkey(&operator, &pubkey))
    }

    fn submit_attestation_evidence(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitAttestationEvidence,
    ) -> BridgeResult<u64> {
        tracing::info!(
            "[qc-18] Attestation evidence from {} for {}@{}",
            msg.creator,
            msg.query_id,
            msg.attestation_timestamp
        );
        self.atomically(|k| k.check_attestation_evidence(ctx, &msg))
    }

    fn submit_valset_signature_evidence(
        &mut self,
        ctx: &BlockContext,
        msg: MsgSubmitValsetSignatureEvidence,
    ) -> BridgeResult<u64> {
        tracing::info!(
            "[qc-18] Valset signature evidence from {} at {}",
            msg.creator,
            msg.valset_timestamp
        );
        self.atomically(|k| k.check_valset_signature_evidence(ctx, &msg))
    }

    fn update_params(&mut self, _ctx: &BlockContext, msg: MsgUpdateParams) -> BridgeResult<()> {
        if msg.authority != self.config.authority {
            return Err(BridgeError::Unauthorized {
                expected: self.config.authority.clone(),
                actual: msg.authority,
            });
        }
        msg.params.validate()?;
        self.atomically(|k| {
            schema::PARAMS.set(&mut k.store, &msg.params)?;
            tracing::info!("[qc-18] Params updated by {}", msg.authority);
            k.emit(BridgeEvent::ParamsUpdated);
            Ok(())
        })
    }
}
