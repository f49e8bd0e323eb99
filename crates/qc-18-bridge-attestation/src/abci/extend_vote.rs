//! ExtendVote and VerifyVoteExtension.
//!
//! Both run locally on each node, outside the deterministic execution path.
//! ExtendVote degrades per part: a part that cannot be signed is logged and
//! left empty, and the rest of the extension is still returned.

use super::types::{
    BridgeValsetSignature, BridgeVoteExtension, InitialSignature, OracleAttestation,
    RequestVerifyVoteExtension, VerifyStatus,
};
use crate::config::BridgeConfig;
use crate::domain::encoding::{
    evm_address_from_initial_signatures, initial_signature_messages, initial_signature_payload,
};
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::keeper::BridgeKeeper;
use crate::ports::outbound::{BridgeSigner, KeyValueStore, OracleKeeper, StakingKeeper};
use shared_types::{Address, BlockContext, Hash, OperatorAddress};
use std::sync::Arc;

/// Builds and checks bridge vote extensions.
pub struct VoteExtHandler<Sg: BridgeSigner> {
    signer: Arc<Sg>,
    enable_height: u64,
    max_oracle_attestations: usize,
}

impl<Sg: BridgeSigner> VoteExtHandler<Sg> {
    pub fn new(signer: Arc<Sg>, config: &BridgeConfig) -> Self {
        Self {
            signer,
            enable_height: config.vote_extension_enable_height,
            max_oracle_attestations: config.max_oracle_attestations_per_vote,
        }
    }

    /// Produce this node's extension for the vote at `ctx.height`.
    pub fn extend_vote<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        ctx: &BlockContext,
    ) -> BridgeResult<Vec<u8>>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if ctx.height <= self.enable_height {
            return Ok(Vec::new());
        }

        let operator = self.signer.operator_address();
        let mut extension = BridgeVoteExtension::default();

        match keeper.evm_address_by_operator(operator) {
            Ok(_) => {
                extension.oracle_attestations = self.sign_attestation_requests(keeper, ctx.height - 1);
            }
            Err(e) if e.is_not_found() => match self.sign_initial_messages(operator) {
                Ok(initial) => extension.initial_signature = initial,
                Err(e) => tracing::warn!("[qc-18] Failed to sign initial messages: {}", e),
            },
            Err(e) => tracing::warn!("[qc-18] EVM address lookup for {} failed: {}", operator, e),
        }

        match self.sign_latest_checkpoint(keeper, operator) {
            Ok(Some(signature)) => extension.valset_signature = signature,
            Ok(None) => {}
            Err(e) => tracing::warn!("[qc-18] Failed to sign validator checkpoint: {}", e),
        }

        tracing::debug!(
            "[qc-18] Extending vote at height {}: {} attestations, initial={}, valset={}",
            ctx.height,
            extension.oracle_attestations.len(),
            !extension.initial_signature.is_empty(),
            !extension.valset_signature.is_empty()
        );
        extension.encode()
    }

    /// Check a peer's extension before the node accepts its precommit.
    pub fn verify_vote_extension<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        req: &RequestVerifyVoteExtension,
    ) -> VerifyStatus
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if req.height <= self.enable_height {
            return VerifyStatus::Accept;
        }
        match self.check_vote_extension(keeper, req) {
            Ok(()) => VerifyStatus::Accept,
            Err(e) => {
                tracing::warn!(
                    "[qc-18] Rejecting vote extension from {} at height {}: {}",
                    req.validator_address,
                    req.height,
                    e
                );
                VerifyStatus::Reject
            }
        }
    }

    fn sign(&self, payload: &[u8]) -> BridgeResult<Vec<u8>> {
        self.signer
            .sign(payload)
            .map_err(|e| BridgeError::Signer(e.to_string()))
    }

    fn sign_initial_messages(&self, operator: &OperatorAddress) -> BridgeResult<InitialSignature> {
        let (message_a, message_b) = initial_signature_messages(operator);
        Ok(InitialSignature {
            signature_a: self.sign(&initial_signature_payload(&message_a))?,
            signature_b: self.sign(&initial_signature_payload(&message_b))?,
        })
    }

    /// Sign every snapshot requested at `height`, skipping the ones that fail.
    fn sign_attestation_requests<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        height: u64,
    ) -> Vec<OracleAttestation>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let snapshots = match keeper.attestation_requests_by_height(height) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::warn!("[qc-18] Failed to read attestation requests at {}: {}", height, e);
                return Vec::new();
            }
        };

        snapshots
            .iter()
            .take(self.max_oracle_attestations)
            .filter_map(|snapshot| match self.sign_snapshot(keeper, snapshot) {
                Ok(attestation) => Some(attestation),
                Err(e) => {
                    tracing::warn!(
                        "[qc-18] Failed to sign snapshot {}: {}",
                        hex::encode(snapshot),
                        e
                    );
                    None
                }
            })
            .collect()
    }

    fn sign_snapshot<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        snapshot: &Hash,
    ) -> BridgeResult<OracleAttestation>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let data = keeper.attestation_data_by_snapshot(snapshot)?;
        Ok(OracleAttestation {
            query_id: data.query_id,
            timestamp: data.timestamp,
            snapshot: snapshot.to_vec(),
            attestation: self.sign(snapshot)?,
        })
    }

    /// Signature over the latest checkpoint, if this operator owes one.
    fn sign_latest_checkpoint<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        operator: &OperatorAddress,
    ) -> BridgeResult<Option<BridgeValsetSignature>>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let timestamp = match keeper.current_validator_set_timestamp() {
            Ok(timestamp) => timestamp,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let status = match keeper.validator_did_sign_checkpoint(operator, timestamp) {
            Ok(status) => status,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if status.did_sign || status.slot.is_none() {
            return Ok(None);
        }

        let params = keeper.checkpoint_params(timestamp)?;
        Ok(Some(BridgeValsetSignature {
            signature: self.sign(&params.checkpoint)?,
            timestamp,
        }))
    }

    fn check_vote_extension<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        req: &RequestVerifyVoteExtension,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let extension = BridgeVoteExtension::decode(&req.vote_extension)?;
        let operator = keeper
            .staking_validator_by_consensus_address(&req.validator_address)?
            .operator_address;

        if extension.oracle_attestations.len() > self.max_oracle_attestations {
            return Err(BridgeError::InvalidRequest(format!(
                "{} oracle attestations exceed the limit of {}",
                extension.oracle_attestations.len(),
                self.max_oracle_attestations
            )));
        }

        let initial = &extension.initial_signature;
        if !initial.is_empty() {
            evm_address_from_initial_signatures(&initial.signature_a, &initial.signature_b, &operator)?;
        }

        let needs_evm_address =
            !extension.valset_signature.is_empty() || !extension.oracle_attestations.is_empty();
        if !needs_evm_address {
            return Ok(());
        }
        let evm_address: Address = keeper.evm_address_by_operator(&operator)?;

        let valset = &extension.valset_signature;
        if !valset.is_empty() {
            keeper.verify_valset_signature(&evm_address, valset.timestamp, &valset.signature)?;
        }

        for attestation in &extension.oracle_attestations {
            let snapshot = Hash::try_from(attestation.snapshot.as_slice()).map_err(|_| {
                BridgeError::InvalidRequest(format!(
                    "snapshot must be 32 bytes, got {}",
                    attestation.snapshot.len()
                ))
            })?;
            keeper.verify_oracle_attestation(
                &evm_address,
                &attestation.query_id,
                attestation.timestamp,
                &snapshot,
                &attestation.attestation,
            )?;
        }
        Ok(())
    }
}
