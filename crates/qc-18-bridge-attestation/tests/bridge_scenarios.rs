//! # Bridge Scenarios
//!
//! End-to-end flows through the public surface: bootstrap an operator via
//! vote extensions, sign a checkpoint, then slash forged signatures.

use std::sync::Arc;

use qc_18_bridge_attestation::abci::{
    BlockIdFlag, BridgeVoteExtension, CommitInfo, ExtendedCommitInfo, ExtendedVoteInfo,
    ProposalStatus, RequestFinalizeBlock, RequestPrepareProposal, RequestProcessProposal,
    VoteExtTx, VoteValidator,
};
use qc_18_bridge_attestation::domain::encoding::{
    encode_valset_checkpoint, vote_extension_sign_bytes,
};
use qc_18_bridge_attestation::ports::inbound::MsgSubmitValsetSignatureEvidence;
use qc_18_bridge_attestation::testing::{MockOracleKeeper, MockStakingKeeper};
use qc_18_bridge_attestation::{
    BridgeConfig, BridgeDependencies, BridgeError, BridgeKeeper, BridgeMsgApi, BridgeSigner,
    InMemoryKVStore, LocalKeySigner, Params, ProposalHandler, VoteExtHandler,
};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{BlockContext, OperatorAddress};

const T0: u64 = 1_700_000_000_000;
const T1: u64 = T0 + 3_600_000;

type Keeper = BridgeKeeper<InMemoryKVStore, MockStakingKeeper, MockOracleKeeper>;

struct Validator {
    signer: Arc<LocalKeySigner>,
    handler: VoteExtHandler<LocalKeySigner>,
    keypair: Secp256k1KeyPair,
    consensus_key: Secp256k1KeyPair,
    power: u64,
}

struct Chain {
    keeper: Keeper,
    staking: Arc<MockStakingKeeper>,
    proposals: ProposalHandler,
    validators: Vec<Validator>,
}

/// Honors `RUST_LOG`, e.g. `RUST_LOG=qc_18_bridge_attestation=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ctx(height: u64, time_ms: u64) -> BlockContext {
    BlockContext::new("layer", height, time_ms)
}

impl Chain {
    /// Staked validators with no EVM address yet.
    fn new(powers: &[u64]) -> Self {
        init_tracing();
        let config = BridgeConfig::default();
        let staking = Arc::new(MockStakingKeeper::new());
        let mut keeper = BridgeKeeper::new(
            BridgeDependencies {
                store: InMemoryKVStore::new(),
                staking: Arc::clone(&staking),
                oracle: Arc::new(MockOracleKeeper::new()),
            },
            config.clone(),
        );
        keeper.init_genesis(Params::default()).unwrap();

        let validators = powers
            .iter()
            .enumerate()
            .map(|(i, power)| {
                let operator = OperatorAddress::new(format!("tellorvaloper1scenario{i}"));
                staking.add_validator(&operator, *power);
                let consensus_key = Secp256k1KeyPair::generate();
                staking.set_consensus_key(&operator, &consensus_key.public_key());
                let key = Secp256k1KeyPair::generate();
                let keypair = Secp256k1KeyPair::from_bytes(key.to_bytes()).unwrap();
                let signer = Arc::new(LocalKeySigner::new(format!("key{i}"), operator, key));
                Validator {
                    handler: VoteExtHandler::new(Arc::clone(&signer), &config),
                    signer,
                    keypair,
                    consensus_key,
                    power: *power,
                }
            })
            .collect();

        Self {
            keeper,
            staking,
            proposals: ProposalHandler::new(&config),
            validators,
        }
    }

    fn operator(&self, i: usize) -> OperatorAddress {
        self.validators[i].signer.operator_address().clone()
    }

    /// Every validator extends its vote at `height`; the block at
    /// `height + 1` is proposed, checked and applied.
    fn run_vote_extensions(&mut self, height: u64, time_ms: u64) {
        let votes = self
            .validators
            .iter()
            .map(|v| {
                let extension = v.handler.extend_vote(&self.keeper, &ctx(height, time_ms)).unwrap();
                let sign_bytes = vote_extension_sign_bytes("layer", height, 0, &extension);
                ExtendedVoteInfo {
                    validator: VoteValidator {
                        address: MockStakingKeeper::consensus_address_of(v.signer.operator_address()),
                        power: v.power,
                    },
                    extension_signature: v.consensus_key.sign_sha256(&sign_bytes).unwrap().to_vec(),
                    vote_extension: extension,
                    block_id_flag: BlockIdFlag::Commit,
                }
            })
            .collect();
        let commit = ExtendedCommitInfo { round: 0, votes };

        let txs = self
            .proposals
            .prepare_proposal(
                &self.keeper,
                &RequestPrepareProposal {
                    height: height + 1,
                    txs: Vec::new(),
                    local_last_commit: commit.clone(),
                },
            )
            .unwrap();
        let status = self.proposals.process_proposal(
            &self.keeper,
            &RequestProcessProposal {
                height: height + 1,
                txs: txs.clone(),
                proposed_last_commit: CommitInfo::from(&commit),
            },
        );
        assert_eq!(status, ProposalStatus::Accept);

        self.proposals
            .pre_block(
                &mut self.keeper,
                &RequestFinalizeBlock {
                    height: height + 1,
                    txs,
                },
            )
            .unwrap();
    }

    /// Bootstrap every validator, then record checkpoints at T0 and T1.
    fn bootstrapped(powers: &[u64]) -> Self {
        let mut chain = Self::new(powers);
        chain.run_vote_extensions(2, T0 - 10_000);
        chain.keeper.end_block(&ctx(3, T0)).unwrap();

        let first = chain.operator(0);
        chain.staking.set_tokens(&first, powers[0] * 3);
        chain.keeper.end_block(&ctx(4, T1)).unwrap();
        chain
    }

    fn forged_claim(&self, signer: usize, timestamp: u64) -> MsgSubmitValsetSignatureEvidence {
        let valset_hash = [0x5a; 32];
        let checkpoint =
            encode_valset_checkpoint(&self.keeper.domain_separator().unwrap(), 1, timestamp, &valset_hash);
        let signature = self.validators[signer].keypair.sign_sha256(&checkpoint).unwrap();
        MsgSubmitValsetSignatureEvidence {
            creator: "tellor1watcher".into(),
            valset_timestamp: timestamp,
            valset_hash: hex::encode(valset_hash),
            power_threshold: 1,
            validator_signature: hex::encode(signature.as_bytes()),
        }
    }
}

#[test]
fn test_scenario_a_bootstrap_then_checkpoint_signature() {
    let mut chain = Chain::bootstrapped(&[1_000, 1_000]);
    for (i, v) in chain.validators.iter().enumerate() {
        assert_eq!(
            chain.keeper.evm_address_by_operator(&chain.operator(i)).unwrap(),
            v.signer.evm_address()
        );
    }
    assert_eq!(chain.keeper.latest_checkpoint_index().unwrap(), 1);

    chain.run_vote_extensions(5, T1 + 1_000);

    let signatures = chain.keeper.valset_signatures(T1).unwrap();
    let signers = chain.keeper.valset_by_timestamp(T0).unwrap();
    for (i, v) in chain.validators.iter().enumerate() {
        let slot = signers.position(&v.signer.evm_address()).unwrap();
        assert!(signatures.is_signed(slot));
        let status = chain
            .keeper
            .validator_did_sign_checkpoint(&chain.operator(i), T1)
            .unwrap();
        assert_eq!(status.slot, Some(slot));
        assert!(status.did_sign);
    }

    // Nothing left to sign: the next extension carries no valset signature.
    let bytes = chain.validators[0]
        .handler
        .extend_vote(&chain.keeper, &ctx(6, T1 + 2_000))
        .unwrap();
    let extension = BridgeVoteExtension::decode(&bytes).unwrap();
    assert!(extension.valset_signature.is_empty());
}

#[test]
fn test_scenario_b_forged_checkpoint_signature_is_slashed() {
    let mut chain = Chain::bootstrapped(&[1_000, 1_000]);
    let victim = chain.operator(1);
    let claim = chain.forged_claim(1, T1 + 5_000);

    let slashed = chain
        .keeper
        .submit_valset_signature_evidence(&ctx(10, T1 + 10_000), claim)
        .unwrap();

    // 1% of the 1000 power held in the checkpoint before the claim.
    assert_eq!(slashed, 10);
    assert_eq!(chain.staking.tokens(&victim), Some(990));
    assert!(chain.staking.is_jailed(&victim));
    let record = &chain.staking.slashes()[0];
    assert_eq!(record.infraction_height, 4);
    assert_eq!(record.power, 1_000);
}

#[test]
fn test_scenario_c_rate_limit_window() {
    let mut chain = Chain::bootstrapped(&[1_000, 1_000]);
    let window = Params::default().valset_rate_limit_window;
    let base = T1 + 1_000;
    let block = ctx(10, base + 2 * window);

    let first = chain.forged_claim(0, base);
    chain
        .keeper
        .submit_valset_signature_evidence(&block, first)
        .unwrap();

    let too_soon = chain.forged_claim(0, base + window - 1);
    let err = chain
        .keeper
        .submit_valset_signature_evidence(&block, too_soon)
        .unwrap_err();
    assert!(matches!(err, BridgeError::RateLimited { .. }));

    let later = chain.forged_claim(0, base + window);
    chain
        .keeper
        .submit_valset_signature_evidence(&block, later)
        .unwrap();

    let duplicate = chain.forged_claim(0, base);
    let err = chain
        .keeper
        .submit_valset_signature_evidence(&block, duplicate)
        .unwrap_err();
    assert!(matches!(err, BridgeError::DuplicateEvidence { .. }));
    assert_eq!(chain.staking.slashes().len(), 2);
}

#[test]
fn test_vote_ext_tx_is_first_transaction() {
    let chain = Chain::new(&[100]);
    let txs = chain
        .proposals
        .prepare_proposal(
            &chain.keeper,
            &RequestPrepareProposal {
                height: 2,
                txs: vec![b"transfer".to_vec()],
                local_last_commit: ExtendedCommitInfo::default(),
            },
        )
        .unwrap();

    assert_eq!(txs.len(), 2);
    assert_eq!(VoteExtTx::decode(&txs[0]).unwrap().block_height, 2);
    assert_eq!(txs[1], b"transfer".to_vec());
}

#[test]
fn test_proposal_with_forged_extension_is_rejected() {
    let chain = Chain::new(&[100, 200]);
    let victim = &chain.validators[1];
    let mut votes = Vec::new();
    for v in &chain.validators {
        let extension = v.handler.extend_vote(&chain.keeper, &ctx(2, T0)).unwrap();
        let sign_bytes = vote_extension_sign_bytes("layer", 2, 0, &extension);
        votes.push(ExtendedVoteInfo {
            validator: VoteValidator {
                address: MockStakingKeeper::consensus_address_of(v.signer.operator_address()),
                power: v.power,
            },
            extension_signature: v.consensus_key.sign_sha256(&sign_bytes).unwrap().to_vec(),
            vote_extension: extension,
            block_id_flag: BlockIdFlag::Commit,
        });
    }
    // Another node's bootstrap payload under the victim's name.
    votes[1].vote_extension = votes[0].vote_extension.clone();
    let commit = ExtendedCommitInfo { round: 0, votes };

    let tx = chain.proposals.build_vote_ext_tx(&chain.keeper, 3, &commit);
    let status = chain.proposals.process_proposal(
        &chain.keeper,
        &RequestProcessProposal {
            height: 3,
            txs: vec![tx.encode().unwrap()],
            proposed_last_commit: CommitInfo::from(&commit),
        },
    );
    assert_eq!(status, ProposalStatus::Reject);
    assert!(chain
        .keeper
        .evm_address_by_operator(victim.signer.operator_address())
        .unwrap_err()
        .is_not_found());
}
