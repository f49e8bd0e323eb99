//! # Shared Types Crate
//!
//! Primitive identifiers shared by the bridge attestation subsystem and the
//! collaborators it talks to (staking, oracle).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: addresses and hashes are defined once here.
//! - **Explicit Block Context**: consensus-path code never reads the wall
//!   clock; the block height and time arrive in a [`BlockContext`].

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
