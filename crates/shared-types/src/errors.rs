//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors surfaced by key-value store backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend read or write failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored value could not be encoded or decoded.
    #[error("Codec error for {collection}: {reason}")]
    Codec {
        /// Logical collection the value belongs to.
        collection: &'static str,
        /// Underlying codec failure.
        reason: String,
    },

    /// A stored key does not have the expected layout.
    #[error("Malformed key in {collection}")]
    MalformedKey {
        /// Logical collection the key belongs to.
        collection: &'static str,
    },

    /// A variable-length key component does not fit its length prefix.
    #[error("Key component too long: {len} bytes, max {max}")]
    KeyTooLong {
        /// Length of the component.
        len: usize,
        /// Largest length the prefix can express.
        max: usize,
    },
}
