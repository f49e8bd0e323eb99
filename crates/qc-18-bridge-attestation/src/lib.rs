//! # Bridge Attestation (qc-18)
//!
//! Lets an external EVM chain verify this chain's validator set and oracle
//! reports without running a light client.
//!
//! ## Architecture
//!
//! ```text
//!  EndBlock ──→ checkpoint(valset) ──→ snapshot(report)
//!                     │                       │
//!  ExtendVote ──sign──┴───────────────────────┘
//!       ↓
//!  PrepareProposal ──→ tx 0 ──→ ProcessProposal (rebuild, compare bytes)
//!                                   ↓
//!                               PreBlock ──→ Valset→Signatures, Snapshot→Signatures
//!
//!  Evidence msgs ──→ recompute hash ──→ recover signer ──→ rate limit ──→ slash + jail
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Checkpoint order | Checkpoint timestamps strictly increase with the index |
//! | Signature slots | Slot of checkpoint `i` is the signer's index in valset `i - 1` |
//! | Evidence uniqueness | One ledger entry per (operator, timestamp), outside the rate window |
//! | Atomic messages | A failing message leaves no writes and no events |
//! | Deterministic proposals | Tx 0 is a pure function of the extended commit and state |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - ABI encoding, hashing, entities, params, rate limits
//! - `ports/` - Inbound msg/query traits, outbound store and collaborator traits
//! - `adapters/` - In-memory ordered store, local key signer
//! - `store/` - Typed collections over the store port
//! - `keeper/` - Stateful operations and the inbound port implementations
//! - `abci/` - Vote-extension pipeline
//! - `testing` - Staking and oracle doubles (feature `test-utils`)
//!
//! ## Usage
//!
//! ```ignore
//! use qc_18_bridge_attestation::{BridgeConfig, BridgeDependencies, BridgeKeeper, InMemoryKVStore};
//!
//! let mut keeper = BridgeKeeper::new(
//!     BridgeDependencies { store: InMemoryKVStore::new(), staking, oracle },
//!     BridgeConfig::load("bridge.toml")?,
//! );
//! keeper.init_genesis(Params::default())?;
//! keeper.end_block(&ctx)?;
//! ```

pub mod abci;
pub mod adapters;
pub mod config;
pub mod domain;
pub mod keeper;
pub mod ports;
pub mod store;

/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export key types for convenience
pub use abci::{ProposalHandler, VoteExtHandler};
pub use adapters::{InMemoryKVStore, LocalKeySigner};
pub use config::{BridgeConfig, ConfigError};
pub use domain::{
    AttestationSnapshotData, BridgeError, BridgeEvent, BridgeResult, BridgeValidator,
    BridgeValidatorSet, Decimal, ErrorCategory, Params, PositionalSignatures,
    ValidatorCheckpointParams,
};
pub use keeper::{BridgeDependencies, BridgeKeeper, EvidenceLedger};
pub use ports::inbound::{BridgeMsgApi, BridgeQueryApi, QueryError, QueryResult};
pub use ports::outbound::{BridgeSigner, KeyValueStore, OracleKeeper, StakingKeeper};
