//! Error types for the bridge attestation subsystem
//!
//! Every variant belongs to exactly one [`ErrorCategory`]; transaction
//! handlers roll back all writes on any error, and the query surface maps
//! categories onto [`crate::ports::inbound::QueryError`].

use shared_crypto::CryptoError;
use shared_types::StoreError;
use thiserror::Error;

/// Coarse classification of bridge failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input. Never retried.
    Input,
    /// Missing snapshot, checkpoint, params or identity.
    NotFound,
    /// Rejected as duplicate, rate-limited or not malicious.
    Conflict,
    /// A proposal disagrees with the locally recomputed content.
    ConsensusIntegrity,
    /// Storage or collaborator fault.
    Internal,
}

/// Bridge subsystem errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Field is not valid hex
    #[error("Invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    /// Fixed-width field is too long
    #[error("{field} too long: max {max} bytes, got {actual}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Signature is not 64 bytes
    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// Neither recovery id yields a key
    #[error("Signature recovery failed")]
    RecoveryFailed,

    /// Bootstrap signatures A and B recover to different keys
    #[error("EVM addresses do not match")]
    EvmAddressMismatch,

    /// Public key bytes are not a curve point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature recovers, but not to the claimed signer
    #[error("Signature does not belong to operator {operator}")]
    SignerMismatch { operator: String },

    /// Structurally invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Params failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Sender is not the governance authority
    #[error("Unauthorized: expected {expected}, got {actual}")]
    Unauthorized { expected: String, actual: String },

    /// Missing state
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// No staking validator has both power and an EVM address
    #[error("No validators found")]
    NoValidators,

    /// Evidence too old to slash bonded stake
    #[error("Timestamp {timestamp} is older than unbonding period (oldest allowed {oldest_allowed})")]
    OlderThanUnbonding { timestamp: u64, oldest_allowed: u64 },

    /// Evidence predates the penalty cutoff
    #[error("Timestamp {timestamp} is before penalty cutoff {cutoff}")]
    BeforePenaltyCutoff { timestamp: u64, cutoff: u64 },

    /// The signed data exists on chain
    #[error("Not malicious: {0}")]
    NotMalicious(&'static str),

    /// Evidence for this operator and timestamp was already processed
    #[error("Evidence already submitted for {operator} at {timestamp}")]
    DuplicateEvidence { operator: String, timestamp: u64 },

    /// Evidence lands inside the rate-limit window of earlier evidence
    #[error("Evidence for {operator} at {timestamp} within {window_ms} ms of evidence at {existing}")]
    RateLimited {
        operator: String,
        timestamp: u64,
        existing: u64,
        window_ms: u64,
    },

    /// No recovered address belongs to a registered operator
    #[error("Operator address not found for signature")]
    UnknownSigner,

    /// External attestation requested for a disputed report
    #[error("Report is flagged as dispute evidence")]
    ReportFlagged,

    /// Operator already linked to an EVM address
    #[error("Operator {operator} already has an EVM address")]
    OperatorAlreadyRegistered { operator: String },

    /// EVM address already linked to an operator
    #[error("EVM address {address} already registered")]
    EvmAddressTaken { address: String },

    /// Checkpoint timestamps must strictly increase
    #[error("Checkpoint at {timestamp} does not follow latest checkpoint at {latest}")]
    CheckpointConflict { timestamp: u64, latest: u64 },

    /// Proposal content differs from the recomputed content
    #[error("Consensus integrity violation: {0}")]
    ConsensusIntegrity(String),

    /// Staking collaborator failed
    #[error("Staking error: {0}")]
    Staking(String),

    /// Oracle collaborator failed
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Local signer failed
    #[error("Signer error: {0}")]
    Signer(String),

    /// Key-value store failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Wire encoding failed
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Shorthand for [`BridgeError::NotFound`].
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    /// Taxonomy bucket of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidHex { .. }
            | Self::FieldTooLong { .. }
            | Self::InvalidSignatureLength { .. }
            | Self::RecoveryFailed
            | Self::EvmAddressMismatch
            | Self::InvalidPublicKey
            | Self::SignerMismatch { .. }
            | Self::InvalidRequest(_)
            | Self::InvalidParams(_)
            | Self::Unauthorized { .. } => ErrorCategory::Input,
            Self::NotFound { .. } | Self::NoValidators => ErrorCategory::NotFound,
            Self::OlderThanUnbonding { .. }
            | Self::BeforePenaltyCutoff { .. }
            | Self::NotMalicious(_)
            | Self::DuplicateEvidence { .. }
            | Self::RateLimited { .. }
            | Self::UnknownSigner
            | Self::ReportFlagged
            | Self::OperatorAlreadyRegistered { .. }
            | Self::EvmAddressTaken { .. }
            | Self::CheckpointConflict { .. } => ErrorCategory::Conflict,
            Self::ConsensusIntegrity(_) => ErrorCategory::ConsensusIntegrity,
            Self::Staking(_)
            | Self::Oracle(_)
            | Self::Signer(_)
            | Self::Store(_)
            | Self::Codec(_) => ErrorCategory::Internal,
        }
    }

    /// True for [`ErrorCategory::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

impl From<CryptoError> for BridgeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidSignatureLength { expected, actual } => {
                Self::InvalidSignatureLength { expected, actual }
            }
            CryptoError::RecoveryFailed | CryptoError::InvalidSignature => Self::RecoveryFailed,
            CryptoError::InvalidPublicKey => Self::InvalidPublicKey,
            other => Self::Signer(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
