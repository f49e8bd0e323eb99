//! Domain module for the bridge attestation subsystem
//!
//! Pure logic with no storage or collaborator access.
//!
//! ## Modules
//! - abi: Solidity `abi.encode` subset
//! - encoding: checkpoint, snapshot and report-key hashing; signer recovery
//! - entities: validator sets, checkpoint params, snapshots, signature arrays
//! - params: governance parameters
//! - rate_limit: evidence window checks
//! - valset: validator-set change detection

pub mod abi;
pub mod encoding;
pub mod entities;
pub mod errors;
pub mod events;
pub mod params;
pub mod rate_limit;
pub mod valset;

pub use encoding::{DomainSeparator, OracleAttestationData};
pub use entities::{
    AttestationSnapshotData, BridgeValidator, BridgeValidatorSet, PositionalSignatures,
    ValidatorCheckpointParams,
};
pub use errors::{BridgeError, BridgeResult, ErrorCategory};
pub use events::BridgeEvent;
pub use params::{Decimal, Params};
