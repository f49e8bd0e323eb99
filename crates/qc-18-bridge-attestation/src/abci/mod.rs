//! # Vote-Extension Pipeline
//!
//! Per block height `h`:
//!
//! ```text
//! ExtendVote(h)            local     sign bootstrap messages, snapshots of h-1, latest checkpoint
//! VerifyVoteExtension(h)   local     check every signature in a peer's extension
//! PrepareProposal(h+1)     proposer  collect committed extensions into tx 0
//! ProcessProposal(h+1)     all       rebuild tx 0 and compare bytes
//! PreBlock(h+1)            all       write registrations and signatures
//! ```

pub mod extend_vote;
pub mod proposal;
pub mod types;

#[cfg(test)]
mod tests;

pub use extend_vote::VoteExtHandler;
pub use proposal::ProposalHandler;
pub use types::{
    BlockIdFlag, BridgeValsetSignature, BridgeVoteExtension, CommitInfo, ExtendedCommitInfo,
    ExtendedVoteInfo, InitialSignature, OracleAttestation, ProposalStatus, RequestFinalizeBlock,
    RequestPrepareProposal, RequestProcessProposal, RequestVerifyVoteExtension, VerifyStatus,
    VoteExtTx, VoteInfo, VoteValidator,
};
