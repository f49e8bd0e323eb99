use super::*;
use crate::adapters::{InMemoryKVStore, LocalKeySigner};
use crate::config::BridgeConfig;
use crate::domain::encoding::{
    evm_address_from_initial_signatures, initial_signature_messages, initial_signature_payload,
    vote_extension_sign_bytes,
};
use crate::domain::errors::BridgeError;
use crate::domain::params::Params;
use crate::keeper::{BridgeDependencies, BridgeKeeper};
use crate::ports::outbound::{AggregateReport, BridgeSigner};
use crate::testing::{MockOracleKeeper, MockStakingKeeper};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{BlockContext, ConsensusAddress, Hash, OperatorAddress};
use std::sync::Arc;

const T0: u64 = 1_700_000_000_000;
const T1: u64 = T0 + 60_000;
const QUERY_ID: [u8; 32] = [9; 32];

type TestKeeper = BridgeKeeper<InMemoryKVStore, MockStakingKeeper, MockOracleKeeper>;

struct Node {
    signer: Arc<LocalKeySigner>,
    handler: VoteExtHandler<LocalKeySigner>,
    consensus_key: Secp256k1KeyPair,
    power: u64,
}

impl Node {
    fn operator(&self) -> &OperatorAddress {
        self.signer.operator_address()
    }

    fn consensus_address(&self) -> ConsensusAddress {
        MockStakingKeeper::consensus_address_of(self.operator())
    }

    /// Precommit cast at `height`, extension signed with the consensus key.
    fn vote(&self, height: u64, extension: Vec<u8>) -> ExtendedVoteInfo {
        let sign_bytes = vote_extension_sign_bytes("layer", height, 0, &extension);
        ExtendedVoteInfo {
            validator: VoteValidator {
                address: self.consensus_address(),
                power: self.power,
            },
            extension_signature: self.consensus_key.sign_sha256(&sign_bytes).unwrap().to_vec(),
            vote_extension: extension,
            block_id_flag: BlockIdFlag::Commit,
        }
    }
}

struct Pipeline {
    keeper: TestKeeper,
    staking: Arc<MockStakingKeeper>,
    oracle: Arc<MockOracleKeeper>,
    nodes: Vec<Node>,
    proposals: ProposalHandler,
}

fn ctx(height: u64, time_ms: u64) -> BlockContext {
    BlockContext::new("layer", height, time_ms)
}

fn pipeline(powers: &[u64], register: bool) -> Pipeline {
    let config = BridgeConfig::default();
    let staking = Arc::new(MockStakingKeeper::new());
    let oracle = Arc::new(MockOracleKeeper::new());
    let mut keeper = BridgeKeeper::new(
        BridgeDependencies {
            store: InMemoryKVStore::new(),
            staking: Arc::clone(&staking),
            oracle: Arc::clone(&oracle),
        },
        config.clone(),
    );
    keeper.init_genesis(Params::default()).unwrap();

    let mut nodes = Vec::new();
    for (i, power) in powers.iter().enumerate() {
        let operator = OperatorAddress::new(format!("tellorvaloper1node{i}"));
        staking.add_validator(&operator, *power);
        let consensus_key = Secp256k1KeyPair::generate();
        staking.set_consensus_key(&operator, &consensus_key.public_key());
        let signer = Arc::new(LocalKeySigner::new(
            format!("node{i}"),
            operator.clone(),
            Secp256k1KeyPair::generate(),
        ));
        if register {
            keeper
                .set_evm_address_by_operator(&operator, signer.evm_address())
                .unwrap();
        }
        nodes.push(Node {
            handler: VoteExtHandler::new(Arc::clone(&signer), &config),
            signer,
            consensus_key,
            power: *power,
        });
    }
    keeper.take_events();

    Pipeline {
        keeper,
        staking,
        oracle,
        nodes,
        proposals: ProposalHandler::new(&config),
    }
}

/// Two checkpoints (T0, T1) and one snapshot requested at height 3.
fn with_signing_work(powers: &[u64]) -> (Pipeline, Hash) {
    let mut p = pipeline(powers, true);
    p.keeper.end_block(&ctx(2, T0)).unwrap();

    let first = p.nodes[0].operator().clone();
    p.staking.set_tokens(&first, powers[0] * 5);
    p.oracle.add_aggregate(AggregateReport {
        query_id: QUERY_ID.to_vec(),
        aggregate_value: "01".into(),
        aggregate_power: powers.iter().sum(),
        timestamp_ms: T0 + 30_000,
        height: 3,
        flagged: false,
    });
    p.keeper.end_block(&ctx(3, T1)).unwrap();

    let snapshot = p.keeper.attestation_requests_by_height(3).unwrap()[0];
    (p, snapshot)
}

fn committed_votes(p: &Pipeline, height: u64) -> ExtendedCommitInfo {
    ExtendedCommitInfo {
        round: 0,
        votes: p
            .nodes
            .iter()
            .map(|node| {
                let extension = node
                    .handler
                    .extend_vote(&p.keeper, &ctx(height, T1 + 1_000))
                    .unwrap();
                node.vote(height, extension)
            })
            .collect(),
    }
}

fn prepare(p: &Pipeline, height: u64, commit: &ExtendedCommitInfo) -> Vec<Vec<u8>> {
    p.proposals
        .prepare_proposal(
            &p.keeper,
            &RequestPrepareProposal {
                height,
                txs: vec![b"user-tx".to_vec()],
                local_last_commit: commit.clone(),
            },
        )
        .unwrap()
}

fn process(p: &Pipeline, height: u64, txs: &[Vec<u8>], commit: &ExtendedCommitInfo) -> ProposalStatus {
    p.proposals.process_proposal(
        &p.keeper,
        &RequestProcessProposal {
            height,
            txs: txs.to_vec(),
            proposed_last_commit: CommitInfo::from(commit),
        },
    )
}

// =============================================================================
// EXTEND / VERIFY
// =============================================================================

#[test]
fn test_extend_vote_empty_until_enable_height() {
    let p = pipeline(&[100], true);
    let extension = p.nodes[0].handler.extend_vote(&p.keeper, &ctx(1, T0)).unwrap();
    assert!(extension.is_empty());
}

#[test]
fn test_extend_vote_bootstraps_unregistered_operator() {
    let p = pipeline(&[100], false);
    let node = &p.nodes[0];

    let bytes = node.handler.extend_vote(&p.keeper, &ctx(2, T0)).unwrap();
    let extension = BridgeVoteExtension::decode(&bytes).unwrap();

    assert!(extension.oracle_attestations.is_empty());
    assert!(extension.valset_signature.is_empty());
    let recovered = evm_address_from_initial_signatures(
        &extension.initial_signature.signature_a,
        &extension.initial_signature.signature_b,
        node.operator(),
    )
    .unwrap();
    assert_eq!(recovered, node.signer.evm_address());
}

#[test]
fn test_extend_vote_skips_first_checkpoint() {
    let mut p = pipeline(&[100, 100], true);
    p.keeper.end_block(&ctx(2, T0)).unwrap();

    let bytes = p.nodes[0].handler.extend_vote(&p.keeper, &ctx(3, T0 + 1)).unwrap();
    let extension = BridgeVoteExtension::decode(&bytes).unwrap();

    assert!(extension.valset_signature.is_empty());
    assert!(extension.initial_signature.is_empty());
}

#[test]
fn test_extend_vote_signs_snapshots_and_checkpoint() {
    let (p, snapshot) = with_signing_work(&[1_000, 1_000]);
    let node = &p.nodes[0];

    let bytes = node.handler.extend_vote(&p.keeper, &ctx(4, T1 + 1_000)).unwrap();
    let extension = BridgeVoteExtension::decode(&bytes).unwrap();

    assert!(extension.initial_signature.is_empty());
    assert_eq!(extension.valset_signature.timestamp, T1);
    assert_eq!(extension.oracle_attestations.len(), 1);
    let attestation = &extension.oracle_attestations[0];
    assert_eq!(attestation.snapshot, snapshot.to_vec());
    assert_eq!(attestation.query_id, QUERY_ID.to_vec());
    assert_eq!(attestation.timestamp, T0 + 30_000);

    let status = node.handler.verify_vote_extension(
        &p.keeper,
        &RequestVerifyVoteExtension {
            validator_address: node.consensus_address(),
            height: 4,
            vote_extension: bytes,
        },
    );
    assert_eq!(status, VerifyStatus::Accept);
}

#[test]
fn test_verify_rejects_bad_extensions() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let bytes = p.nodes[0]
        .handler
        .extend_vote(&p.keeper, &ctx(4, T1 + 1_000))
        .unwrap();
    let verify = |address: ConsensusAddress, extension: Vec<u8>| {
        p.nodes[1].handler.verify_vote_extension(
            &p.keeper,
            &RequestVerifyVoteExtension {
                validator_address: address,
                height: 4,
                vote_extension: extension,
            },
        )
    };

    // Node 0's signatures claimed by node 1.
    assert_eq!(verify(p.nodes[1].consensus_address(), bytes.clone()), VerifyStatus::Reject);
    let unknown = ConsensusAddress(rand::random::<[u8; 20]>().to_vec());
    assert_eq!(verify(unknown, bytes), VerifyStatus::Reject);
    assert_eq!(
        verify(p.nodes[0].consensus_address(), b"not json".to_vec()),
        VerifyStatus::Reject
    );
}

#[test]
fn test_verify_enforces_attestation_bound() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let node = &p.nodes[0];
    let bytes = node.handler.extend_vote(&p.keeper, &ctx(4, T1 + 1_000)).unwrap();

    let config = BridgeConfig {
        max_oracle_attestations_per_vote: 0,
        ..BridgeConfig::default()
    };
    let strict = VoteExtHandler::new(Arc::clone(&node.signer), &config);
    let status = strict.verify_vote_extension(
        &p.keeper,
        &RequestVerifyVoteExtension {
            validator_address: node.consensus_address(),
            height: 4,
            vote_extension: bytes,
        },
    );
    assert_eq!(status, VerifyStatus::Reject);
}

#[test]
fn test_verify_accepts_empty_extension() {
    let p = pipeline(&[100], true);
    let node = &p.nodes[0];
    let status = node.handler.verify_vote_extension(
        &p.keeper,
        &RequestVerifyVoteExtension {
            validator_address: node.consensus_address(),
            height: 5,
            vote_extension: BridgeVoteExtension::default().encode().unwrap(),
        },
    );
    assert_eq!(status, VerifyStatus::Accept);
}

// =============================================================================
// PROPOSALS
// =============================================================================

#[test]
fn test_proposal_round_trip_records_signatures() {
    let (mut p, snapshot) = with_signing_work(&[1_000, 1_000]);
    let commit = committed_votes(&p, 4);

    let txs = prepare(&p, 5, &commit);
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[1], b"user-tx".to_vec());
    let tx = VoteExtTx::decode(&txs[0]).unwrap();
    assert_eq!(tx.block_height, 5);
    assert_eq!(tx.valset_sigs.operator_addresses.len(), 2);
    assert_eq!(tx.oracle_attestations.operator_addresses.len(), 2);
    assert!(tx.op_and_evm_addrs.operator_addresses.is_empty());

    assert_eq!(process(&p, 5, &txs, &commit), ProposalStatus::Accept);

    p.proposals
        .pre_block(&mut p.keeper, &RequestFinalizeBlock { height: 5, txs })
        .unwrap();
    assert_eq!(p.keeper.valset_signatures(T1).unwrap().signed_count(), 2);
    assert_eq!(p.keeper.oracle_attestations(&snapshot).unwrap().signed_count(), 2);

    let status = p.keeper.validator_did_sign_checkpoint(p.nodes[0].operator(), T1).unwrap();
    assert!(status.did_sign);
}

#[test]
fn test_prepare_proposal_passthrough_before_enable_height() {
    let p = pipeline(&[100], true);
    let txs = prepare(&p, 1, &ExtendedCommitInfo::default());
    assert_eq!(txs, vec![b"user-tx".to_vec()]);
}

#[test]
fn test_prepare_proposal_always_injects_tx() {
    let p = pipeline(&[100], true);
    let txs = prepare(&p, 3, &ExtendedCommitInfo::default());

    assert_eq!(txs.len(), 2);
    let tx = VoteExtTx::decode(&txs[0]).unwrap();
    assert!(tx.valset_sigs.operator_addresses.is_empty());
    assert!(tx.oracle_attestations.operator_addresses.is_empty());
}

#[test]
fn test_prepare_proposal_skips_unusable_votes() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let mut commit = committed_votes(&p, 4);

    // Authentic but undecodable extension.
    commit.votes[1] = p.nodes[1].vote(4, b"not json".to_vec());
    commit.votes.push(ExtendedVoteInfo {
        validator: VoteValidator {
            address: ConsensusAddress(vec![3; 20]),
            power: 1,
        },
        vote_extension: Vec::new(),
        extension_signature: Vec::new(),
        block_id_flag: BlockIdFlag::Absent,
    });

    let txs = prepare(&p, 5, &commit);
    let tx = VoteExtTx::decode(&txs[0]).unwrap();

    assert_eq!(tx.valset_sigs.operator_addresses, vec![p.nodes[0].operator().clone()]);
    assert_eq!(tx.oracle_attestations.operator_addresses.len(), 1);
    assert_eq!(tx.extended_commit_info, commit);
    assert_eq!(process(&p, 5, &txs, &commit), ProposalStatus::Accept);
}

#[test]
fn test_process_proposal_rejects_tampering() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let commit = committed_votes(&p, 4);
    let txs = prepare(&p, 5, &commit);

    let mut dropped = VoteExtTx::decode(&txs[0]).unwrap();
    dropped.valset_sigs.operator_addresses.pop();
    dropped.valset_sigs.timestamps.pop();
    dropped.valset_sigs.signatures.pop();
    let tampered = vec![dropped.encode().unwrap(), txs[1].clone()];
    assert_eq!(process(&p, 5, &tampered, &commit), ProposalStatus::Reject);

    let mut reordered = VoteExtTx::decode(&txs[0]).unwrap();
    reordered.valset_sigs.operator_addresses.reverse();
    reordered.valset_sigs.signatures.reverse();
    let tampered = vec![reordered.encode().unwrap(), txs[1].clone()];
    assert_eq!(process(&p, 5, &tampered, &commit), ProposalStatus::Reject);

    assert_eq!(process(&p, 6, &txs, &commit), ProposalStatus::Reject);
    assert_eq!(process(&p, 5, &[], &commit), ProposalStatus::Reject);
    assert_eq!(
        process(&p, 5, &txs, &ExtendedCommitInfo::default()),
        ProposalStatus::Reject
    );
}

#[test]
fn test_bootstrap_through_pipeline() {
    let mut p = pipeline(&[100, 200], false);
    let commit = committed_votes(&p, 2);

    let txs = prepare(&p, 3, &commit);
    let tx = VoteExtTx::decode(&txs[0]).unwrap();
    assert_eq!(tx.op_and_evm_addrs.operator_addresses.len(), 2);
    assert_eq!(process(&p, 3, &txs, &commit), ProposalStatus::Accept);

    p.proposals
        .pre_block(&mut p.keeper, &RequestFinalizeBlock { height: 3, txs })
        .unwrap();
    for node in &p.nodes {
        assert_eq!(
            p.keeper.evm_address_by_operator(node.operator()).unwrap(),
            node.signer.evm_address()
        );
    }
    assert_eq!(p.keeper.take_events().len(), 2);

    // Registered operators no longer send initial signatures.
    let bytes = p.nodes[0].handler.extend_vote(&p.keeper, &ctx(3, T0)).unwrap();
    assert!(BridgeVoteExtension::decode(&bytes).unwrap().initial_signature.is_empty());
}

#[test]
fn test_pre_block_rejects_malformed_tx() {
    let mut p = pipeline(&[100], true);
    let err = p
        .proposals
        .pre_block(
            &mut p.keeper,
            &RequestFinalizeBlock {
                height: 3,
                txs: vec![b"not json".to_vec()],
            },
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::ConsensusIntegrity(_)));

    let mut uneven = VoteExtTx::default();
    uneven.valset_sigs.timestamps.push(T0);
    let err = p
        .proposals
        .pre_block(
            &mut p.keeper,
            &RequestFinalizeBlock {
                height: 3,
                txs: vec![uneven.encode().unwrap()],
            },
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::ConsensusIntegrity(_)));
}

#[test]
fn test_pre_block_skips_stale_entries() {
    let (mut p, snapshot) = with_signing_work(&[1_000, 1_000]);
    let commit = committed_votes(&p, 4);
    let mut tx = VoteExtTx::decode(&prepare(&p, 5, &commit)[0]).unwrap();
    tx.oracle_attestations.snapshots[0] = vec![0xee; 32];

    p.proposals
        .pre_block(
            &mut p.keeper,
            &RequestFinalizeBlock {
                height: 5,
                txs: vec![tx.encode().unwrap()],
            },
        )
        .unwrap();

    assert_eq!(p.keeper.oracle_attestations(&snapshot).unwrap().signed_count(), 1);
    assert_eq!(p.keeper.valset_signatures(T1).unwrap().signed_count(), 2);
}

// =============================================================================
// EXTENSION AUTHENTICATION
// =============================================================================

fn assert_commit_rejected(p: &Pipeline, height: u64, commit: &ExtendedCommitInfo) {
    let err = p
        .proposals
        .prepare_proposal(
            &p.keeper,
            &RequestPrepareProposal {
                height,
                txs: Vec::new(),
                local_last_commit: commit.clone(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::ConsensusIntegrity(_)), "{err}");

    // A proposer that skips validation and builds the tx itself.
    let forged = p.proposals.build_vote_ext_tx(&p.keeper, height, commit);
    let txs = vec![forged.encode().unwrap()];
    assert_eq!(process(p, height, &txs, commit), ProposalStatus::Reject);
}

#[test]
fn test_forged_bootstrap_extension_rejected() {
    let p = pipeline(&[100, 200], false);
    let victim = &p.nodes[1];
    let attacker = Secp256k1KeyPair::generate();
    let mut commit = committed_votes(&p, 2);

    let (message_a, message_b) = initial_signature_messages(victim.operator());
    let forged = BridgeVoteExtension {
        initial_signature: InitialSignature {
            signature_a: attacker
                .sign_sha256(&initial_signature_payload(&message_a))
                .unwrap()
                .to_vec(),
            signature_b: attacker
                .sign_sha256(&initial_signature_payload(&message_b))
                .unwrap()
                .to_vec(),
        },
        ..BridgeVoteExtension::default()
    };
    // Victim's extension signature kept, payload swapped.
    commit.votes[1].vote_extension = forged.encode().unwrap();

    assert_commit_rejected(&p, 3, &commit);

    // Signed by the attacker's key instead of the victim's consensus key.
    let sign_bytes = vote_extension_sign_bytes("layer", 2, 0, &commit.votes[1].vote_extension);
    commit.votes[1].extension_signature = attacker.sign_sha256(&sign_bytes).unwrap().to_vec();
    assert_commit_rejected(&p, 3, &commit);

    assert!(p
        .keeper
        .evm_address_by_operator(victim.operator())
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_unsigned_extension_rejected() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let mut commit = committed_votes(&p, 4);
    commit.votes[0].extension_signature.clear();
    assert_commit_rejected(&p, 5, &commit);

    let mut commit = committed_votes(&p, 4);
    commit.votes[0].extension_signature = vec![0xab; 64];
    assert_commit_rejected(&p, 5, &commit);
}

#[test]
fn test_extension_signed_for_other_height_rejected() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let mut commit = committed_votes(&p, 4);
    let extension = commit.votes[0].vote_extension.clone();
    commit.votes[0] = p.nodes[0].vote(3, extension);
    assert_commit_rejected(&p, 5, &commit);
}

#[test]
fn test_extension_from_unknown_validator_rejected() {
    let (p, _) = with_signing_work(&[1_000, 1_000]);
    let mut commit = committed_votes(&p, 4);
    commit.votes[1].validator.address = ConsensusAddress(rand::random::<[u8; 20]>().to_vec());
    assert_commit_rejected(&p, 5, &commit);
}

#[test]
fn test_commit_needs_more_than_two_thirds_power() {
    let p = pipeline(&[100, 100, 100], true);
    let mut commit = committed_votes(&p, 4);
    commit.votes[2].block_id_flag = BlockIdFlag::Absent;
    // Exactly two thirds.
    assert_commit_rejected(&p, 5, &commit);

    let p = pipeline(&[100, 200], true);
    let mut commit = committed_votes(&p, 4);
    commit.votes[1].block_id_flag = BlockIdFlag::Nil;
    assert_commit_rejected(&p, 5, &commit);

    let p = pipeline(&[100, 100, 100, 100], true);
    let mut commit = committed_votes(&p, 4);
    commit.votes[3].block_id_flag = BlockIdFlag::Absent;
    let txs = prepare(&p, 5, &commit);
    assert_eq!(process(&p, 5, &txs, &commit), ProposalStatus::Accept);
}

#[test]
fn test_duplicate_vote_rejected() {
    let p = pipeline(&[100, 200], false);
    let mut commit = committed_votes(&p, 2);
    commit.votes.push(commit.votes[0].clone());
    assert_commit_rejected(&p, 3, &commit);
}

#[test]
fn test_registration_deduplicated_within_tx() {
    let p = pipeline(&[100, 200], false);
    let mut commit = committed_votes(&p, 2);
    commit.votes.push(commit.votes[0].clone());

    let tx = p.proposals.build_vote_ext_tx(&p.keeper, 3, &commit);
    assert_eq!(tx.op_and_evm_addrs.operator_addresses.len(), 2);
}
