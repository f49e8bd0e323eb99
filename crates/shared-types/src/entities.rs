//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Hashes & Addresses**: `Hash`, `Address`, `U256`
//! - **Validator Identity**: `OperatorAddress`, `ConsensusAddress`
//! - **Execution**: `BlockContext`

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

/// A 32-byte hash (keccak-256 or SHA-256).
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Unix time in milliseconds.
pub type TimestampMs = u64;

/// Bech32 validator operator address (e.g. `tellorvaloper1...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct OperatorAddress(pub String);

impl OperatorAddress {
    /// Wrap an operator address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty address.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OperatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperatorAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Consensus-engine validator address (the key CometBFT votes are signed with).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ConsensusAddress(#[serde_as(as = "Hex")] pub Vec<u8>);

impl ConsensusAddress {
    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ConsensusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Deterministic execution context of the block being processed.
///
/// Every consensus-path operation receives one of these instead of reading
/// the local clock, so all nodes observe identical time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockContext {
    /// Chain identifier.
    pub chain_id: String,
    /// Height of the block being executed.
    pub height: u64,
    /// Block header time in Unix milliseconds.
    pub time_ms: TimestampMs,
}

impl BlockContext {
    /// Create a new block context.
    pub fn new(chain_id: impl Into<String>, height: u64, time_ms: TimestampMs) -> Self {
        Self {
            chain_id: chain_id.into(),
            height,
            time_ms,
        }
    }

    /// Same chain and time, next height.
    pub fn next_block(&self, block_time_ms: u64) -> Self {
        Self {
            chain_id: self.chain_id.clone(),
            height: self.height + 1,
            time_ms: self.time_ms + block_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consensus_address_json_is_hex() {
        let addr = ConsensusAddress(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        assert_eq!(addr.to_string(), "deadbeef");
    }

    #[test]
    fn test_operator_address_is_transparent() {
        let op = OperatorAddress::from("tellorvaloper1abc");
        assert_eq!(serde_json::to_string(&op).unwrap(), "\"tellorvaloper1abc\"");
    }

    #[test]
    fn test_next_block_advances_height_and_time() {
        let ctx = BlockContext::new("layer", 10, 1_000);
        let next = ctx.next_block(500);
        assert_eq!(next.height, 11);
        assert_eq!(next.time_ms, 1_500);
        assert_eq!(next.chain_id, "layer");
    }
}
