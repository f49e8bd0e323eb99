//! PrepareProposal, ProcessProposal and PreBlock.
//!
//! All three are on the deterministic path: the vote-extension transaction
//! is a pure function of the extended commit and committed state, so every
//! node can rebuild it and compare bytes. Before anything is read from a
//! commit, each committed extension must carry a valid signature from its
//! validator's consensus key, and those votes must hold more than two thirds
//! of the commit's power.

use super::types::{
    BlockIdFlag, BridgeVoteExtension, CommitInfo, ExtendedCommitInfo, ExtendedVoteInfo,
    ProposalStatus, RequestFinalizeBlock, RequestPrepareProposal, RequestProcessProposal,
    VoteExtTx,
};
use crate::config::BridgeConfig;
use crate::domain::encoding::{evm_address_from_initial_signatures, vote_extension_sign_bytes};
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::keeper::BridgeKeeper;
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use shared_types::{Address, Hash, OperatorAddress};
use std::collections::BTreeSet;

/// Proposal-side handlers of the vote-extension pipeline.
#[derive(Debug, Clone)]
pub struct ProposalHandler {
    chain_id: String,
    enable_height: u64,
    max_oracle_attestations: usize,
}

/// Identities bootstrapped earlier in the same transaction.
#[derive(Default)]
struct PendingRegistrations {
    operators: BTreeSet<OperatorAddress>,
    evm_addresses: BTreeSet<Address>,
}

impl ProposalHandler {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            chain_id: config.chain_id.clone(),
            enable_height: config.vote_extension_enable_height,
            max_oracle_attestations: config.max_oracle_attestations_per_vote,
        }
    }

    /// Prepend the vote-extension transaction to the proposal.
    pub fn prepare_proposal<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        req: &RequestPrepareProposal,
    ) -> BridgeResult<Vec<Vec<u8>>>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if req.height <= self.enable_height {
            return Ok(req.txs.clone());
        }

        self.validate_vote_extensions(keeper, req.height, &req.local_last_commit)?;
        let tx = self.build_vote_ext_tx(keeper, req.height, &req.local_last_commit);
        tracing::info!(
            "[qc-18] Proposing height {}: {} registrations, {} valset signatures, {} attestations",
            req.height,
            tx.op_and_evm_addrs.operator_addresses.len(),
            tx.valset_sigs.operator_addresses.len(),
            tx.oracle_attestations.operator_addresses.len()
        );

        let mut txs = Vec::with_capacity(req.txs.len() + 1);
        txs.push(tx.encode()?);
        txs.extend(req.txs.iter().cloned());
        Ok(txs)
    }

    /// Authenticate the extensions of the commit carried into block `height`.
    ///
    /// Every `Commit` vote needs a signature by its validator's consensus key
    /// over the extension as cast at `height - 1`. Those votes must hold more
    /// than two thirds of the power in the commit; a commit with no power at
    /// all passes.
    pub fn validate_vote_extensions<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        height: u64,
        commit: &ExtendedCommitInfo,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let extension_height = height.saturating_sub(1);
        let mut seen = BTreeSet::new();
        let mut total_power: u128 = 0;
        let mut committed_power: u128 = 0;

        for vote in &commit.votes {
            let address = &vote.validator.address;
            if !seen.insert(address) {
                return Err(BridgeError::ConsensusIntegrity(format!(
                    "validator {address} votes twice"
                )));
            }
            total_power += u128::from(vote.validator.power);
            if vote.block_id_flag != BlockIdFlag::Commit {
                continue;
            }

            if vote.extension_signature.is_empty() {
                return Err(BridgeError::ConsensusIntegrity(format!(
                    "vote from {address} has no extension signature"
                )));
            }
            let sign_bytes = vote_extension_sign_bytes(
                &self.chain_id,
                extension_height,
                commit.round,
                &vote.vote_extension,
            );
            keeper
                .consensus_pubkey(address)
                .and_then(|key| {
                    key.verify_sha256(&sign_bytes, &vote.extension_signature)
                        .map_err(BridgeError::from)
                })
                .map_err(|e| {
                    BridgeError::ConsensusIntegrity(format!(
                        "extension signature of {address}: {e}"
                    ))
                })?;
            committed_power += u128::from(vote.validator.power);
        }

        if total_power > 0 && committed_power * 3 <= total_power * 2 {
            return Err(BridgeError::ConsensusIntegrity(format!(
                "extensions carry {committed_power} of {total_power} voting power, need more than two thirds"
            )));
        }
        Ok(())
    }

    /// Collect the bridge payload of every committed vote in `commit`.
    ///
    /// The commit must already have passed
    /// [`validate_vote_extensions`](Self::validate_vote_extensions).
    ///
    /// A vote that cannot be decoded or attributed is skipped, as is any
    /// single signature that fails verification.
    pub fn build_vote_ext_tx<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        height: u64,
        commit: &ExtendedCommitInfo,
    ) -> VoteExtTx
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let mut tx = VoteExtTx {
            block_height: height,
            extended_commit_info: commit.clone(),
            ..VoteExtTx::default()
        };
        let mut pending = PendingRegistrations::default();

        let committed = commit
            .votes
            .iter()
            .filter(|vote| vote.block_id_flag == BlockIdFlag::Commit && !vote.vote_extension.is_empty());
        for vote in committed {
            if let Err(e) = self.collect_vote(keeper, vote, &mut tx, &mut pending) {
                tracing::warn!(
                    "[qc-18] Skipping vote extension from {}: {}",
                    vote.validator.address,
                    e
                );
            }
        }
        tx
    }

    /// Accept the proposal only if transaction 0 is exactly what this node
    /// would have built from the same commit.
    pub fn process_proposal<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        req: &RequestProcessProposal,
    ) -> ProposalStatus
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if req.height <= self.enable_height {
            return ProposalStatus::Accept;
        }
        match self.check_proposal(keeper, req) {
            Ok(()) => ProposalStatus::Accept,
            Err(e) => {
                tracing::warn!("[qc-18] Rejecting proposal at height {}: {}", req.height, e);
                ProposalStatus::Reject
            }
        }
    }

    /// Apply the vote-extension transaction before ordinary transactions run.
    ///
    /// Entries are written one at a time; an entry that no longer applies is
    /// logged and skipped without touching the others.
    pub fn pre_block<S, K, O>(
        &self,
        keeper: &mut BridgeKeeper<S, K, O>,
        req: &RequestFinalizeBlock,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if req.height <= self.enable_height {
            return Ok(());
        }
        let Some(first) = req.txs.first() else {
            return Ok(());
        };
        let tx = VoteExtTx::decode(first)
            .map_err(|e| BridgeError::ConsensusIntegrity(format!("vote extension tx: {e}")))?;
        if !tx.is_well_formed() {
            return Err(BridgeError::ConsensusIntegrity(
                "vote extension tx arrays differ in length".into(),
            ));
        }

        let registrations = &tx.op_and_evm_addrs;
        for (operator, evm_address) in registrations
            .operator_addresses
            .iter()
            .zip(&registrations.evm_addresses)
        {
            if let Err(e) = keeper.atomically(|k| k.set_evm_address_by_operator(operator, *evm_address)) {
                tracing::warn!("[qc-18] Failed to register EVM address for {}: {}", operator, e);
            }
        }

        let valset = &tx.valset_sigs;
        for ((operator, timestamp), signature) in valset
            .operator_addresses
            .iter()
            .zip(&valset.timestamps)
            .zip(&valset.signatures)
        {
            if let Err(e) =
                keeper.atomically(|k| k.record_valset_signature(operator, *timestamp, signature.clone()))
            {
                tracing::warn!(
                    "[qc-18] Failed to record valset signature from {} at {}: {}",
                    operator,
                    timestamp,
                    e
                );
            }
        }

        let oracle = &tx.oracle_attestations;
        for ((operator, attestation), snapshot) in oracle
            .operator_addresses
            .iter()
            .zip(&oracle.attestations)
            .zip(&oracle.snapshots)
        {
            let result = keeper.atomically(|k| {
                let snapshot = snapshot_hash(snapshot)?;
                k.record_oracle_attestation(operator, &snapshot, attestation.clone())
            });
            if let Err(e) = result {
                tracing::warn!(
                    "[qc-18] Failed to record attestation from {} for {}: {}",
                    operator,
                    hex::encode(snapshot),
                    e
                );
            }
        }

        tracing::debug!(
            "[qc-18] Applied vote extension tx at height {}",
            req.height
        );
        Ok(())
    }

    fn check_proposal<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        req: &RequestProcessProposal,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let proposed = req
            .txs
            .first()
            .ok_or_else(|| BridgeError::ConsensusIntegrity("missing vote extension tx".into()))?;
        let tx = VoteExtTx::decode(proposed)
            .map_err(|e| BridgeError::ConsensusIntegrity(format!("vote extension tx: {e}")))?;

        if tx.block_height != req.height {
            return Err(BridgeError::ConsensusIntegrity(format!(
                "vote extension tx for height {} in block {}",
                tx.block_height, req.height
            )));
        }
        if CommitInfo::from(&tx.extended_commit_info) != req.proposed_last_commit {
            return Err(BridgeError::ConsensusIntegrity(
                "extended commit does not match the last commit".into(),
            ));
        }
        self.validate_vote_extensions(keeper, req.height, &tx.extended_commit_info)?;

        let expected = self
            .build_vote_ext_tx(keeper, req.height, &tx.extended_commit_info)
            .encode()?;
        if expected != *proposed {
            return Err(BridgeError::ConsensusIntegrity(
                "vote extension tx differs from the locally built one".into(),
            ));
        }
        Ok(())
    }

    fn collect_vote<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        vote: &ExtendedVoteInfo,
        tx: &mut VoteExtTx,
        pending: &mut PendingRegistrations,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        let extension = BridgeVoteExtension::decode(&vote.vote_extension)?;
        let operator = keeper
            .staking_validator_by_consensus_address(&vote.validator.address)?
            .operator_address;

        let evm_address = match keeper.evm_address_by_operator(&operator) {
            Ok(evm_address) => Some(evm_address),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if evm_address.is_none() && !extension.initial_signature.is_empty() {
            if let Err(e) = self.collect_registration(keeper, &operator, &extension, tx, pending) {
                tracing::warn!("[qc-18] Dropping initial signatures from {}: {}", operator, e);
            }
        }

        let Some(evm_address) = evm_address else {
            return Ok(());
        };

        let valset = &extension.valset_signature;
        if !valset.is_empty() {
            match keeper.verify_valset_signature(&evm_address, valset.timestamp, &valset.signature) {
                Ok(()) => {
                    tx.valset_sigs.operator_addresses.push(operator.clone());
                    tx.valset_sigs.timestamps.push(valset.timestamp);
                    tx.valset_sigs.signatures.push(valset.signature.clone());
                }
                Err(e) => tracing::warn!(
                    "[qc-18] Dropping valset signature from {} at {}: {}",
                    operator,
                    valset.timestamp,
                    e
                ),
            }
        }

        for attestation in extension
            .oracle_attestations
            .iter()
            .take(self.max_oracle_attestations)
        {
            let verified = snapshot_hash(&attestation.snapshot).and_then(|snapshot| {
                keeper.verify_oracle_attestation(
                    &evm_address,
                    &attestation.query_id,
                    attestation.timestamp,
                    &snapshot,
                    &attestation.attestation,
                )
            });
            match verified {
                Ok(()) => {
                    tx.oracle_attestations.operator_addresses.push(operator.clone());
                    tx.oracle_attestations
                        .attestations
                        .push(attestation.attestation.clone());
                    tx.oracle_attestations.snapshots.push(attestation.snapshot.clone());
                }
                Err(e) => tracing::warn!(
                    "[qc-18] Dropping attestation from {} for {}: {}",
                    operator,
                    hex::encode(&attestation.snapshot),
                    e
                ),
            }
        }
        Ok(())
    }

    fn collect_registration<S, K, O>(
        &self,
        keeper: &BridgeKeeper<S, K, O>,
        operator: &OperatorAddress,
        extension: &BridgeVoteExtension,
        tx: &mut VoteExtTx,
        pending: &mut PendingRegistrations,
    ) -> BridgeResult<()>
    where
        S: KeyValueStore + Clone,
        K: StakingKeeper,
        O: OracleKeeper,
    {
        if pending.operators.contains(operator) {
            return Err(BridgeError::OperatorAlreadyRegistered {
                operator: operator.to_string(),
            });
        }

        let initial = &extension.initial_signature;
        let evm_address =
            evm_address_from_initial_signatures(&initial.signature_a, &initial.signature_b, operator)?;

        let taken = match keeper.operator_by_evm_address(&evm_address) {
            Ok(_) => true,
            Err(e) if e.is_not_found() => pending.evm_addresses.contains(&evm_address),
            Err(e) => return Err(e),
        };
        if taken {
            return Err(BridgeError::EvmAddressTaken {
                address: hex::encode(evm_address),
            });
        }

        pending.operators.insert(operator.clone());
        pending.evm_addresses.insert(evm_address);
        tx.op_and_evm_addrs.operator_addresses.push(operator.clone());
        tx.op_and_evm_addrs.evm_addresses.push(evm_address);
        Ok(())
    }
}

fn snapshot_hash(bytes: &[u8]) -> BridgeResult<Hash> {
    Hash::try_from(bytes).map_err(|_| {
        BridgeError::InvalidRequest(format!("snapshot must be 32 bytes, got {}", bytes.len()))
    })
}
