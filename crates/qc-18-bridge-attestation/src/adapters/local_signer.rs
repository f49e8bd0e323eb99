use crate::ports::outbound::{BridgeSigner, CollaboratorError};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{Address, OperatorAddress};

/// Signer backed by a secp256k1 key held in process memory.
///
/// Built once at node startup from the configured key and handed to the
/// vote-extension handler.
pub struct LocalKeySigner {
    key_id: String,
    operator: OperatorAddress,
    keypair: Secp256k1KeyPair,
}

impl LocalKeySigner {
    pub fn new(key_id: impl Into<String>, operator: OperatorAddress, keypair: Secp256k1KeyPair) -> Self {
        Self {
            key_id: key_id.into(),
            operator,
            keypair,
        }
    }

    /// EVM address of the held key.
    pub fn evm_address(&self) -> Address {
        self.keypair.evm_address()
    }
}

impl BridgeSigner for LocalKeySigner {
    fn operator_address(&self) -> &OperatorAddress {
        &self.operator
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
        self.keypair
            .sign_sha256(message)
            .map(|signature| signature.to_vec())
            .map_err(|e| CollaboratorError::Failed(format!("key {}: {e}", self.key_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::{recover_signer_candidates, sha256};

    #[test]
    fn test_sign_hashes_with_sha256() {
        let signer = LocalKeySigner::new(
            "validator",
            OperatorAddress::from("tellorvaloper1abc"),
            Secp256k1KeyPair::generate(),
        );
        let signature = signer.sign(b"checkpoint").unwrap();

        let candidates = recover_signer_candidates(&signature, &sha256(b"checkpoint")).unwrap();
        assert!(candidates.contains(&signer.evm_address()));
        assert_eq!(signer.key_id(), "validator");
    }
}
