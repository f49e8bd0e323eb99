//! Ports (hexagonal architecture)
//!
//! - inbound: transaction and query surfaces this crate exposes
//! - outbound: store, staking, oracle and signer capabilities it requires

pub mod inbound;
pub mod outbound;
