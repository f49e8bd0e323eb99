//! Operator ↔ EVM address identity.

use super::{staking_error, BridgeKeeper};
use crate::domain::encoding::signing_digest;
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::ports::outbound::{KeyValueStore, OracleKeeper, StakingKeeper};
use crate::store::schema;
use shared_crypto::{recover_signer_candidates, Secp256k1PublicKey};
use shared_types::{Address, OperatorAddress};

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    pub fn evm_address_by_operator(&self, operator: &OperatorAddress) -> BridgeResult<Address> {
        schema::OPERATOR_TO_EVM
            .get(&self.store, operator)?
            .ok_or_else(|| BridgeError::not_found("EVM address", operator))
    }

    pub fn operator_by_evm_address(&self, evm_address: &Address) -> BridgeResult<OperatorAddress> {
        schema::EVM_TO_OPERATOR
            .get(&self.store, evm_address)?
            .ok_or_else(|| BridgeError::not_found("operator", hex::encode(evm_address)))
    }

    /// Link `operator` and `evm_address` in both directions.
    ///
    /// An EVM address that is already registered is a no-op (`Ok(false)`), so
    /// replayed bootstrap signatures are harmless.
    pub fn set_evm_address_by_operator(
        &mut self,
        operator: &OperatorAddress,
        evm_address: Address,
    ) -> BridgeResult<bool> {
        if schema::EVM_TO_OPERATOR.has(&self.store, &evm_address)? {
            tracing::info!(
                "[qc-18] EVM address {} already registered, skipping {}",
                hex::encode(evm_address),
                operator
            );
            return Ok(false);
        }
        if schema::OPERATOR_TO_EVM.has(&self.store, operator)? {
            return Err(BridgeError::OperatorAlreadyRegistered {
                operator: operator.to_string(),
            });
        }

        schema::OPERATOR_TO_EVM.set(&mut self.store, operator, &evm_address)?;
        schema::EVM_TO_OPERATOR.set(&mut self.store, &evm_address, operator)?;
        tracing::info!(
            "[qc-18] Registered EVM address {} for {}",
            hex::encode(evm_address),
            operator
        );
        self.emit(BridgeEvent::EvmAddressRegistered {
            operator: operator.clone(),
            evm_address,
        });
        Ok(true)
    }

    /// Register the EVM address of a staked operator's secp256k1 public key.
    pub fn register_evm_address_from_pubkey(
        &mut self,
        operator: &OperatorAddress,
        pubkey: &[u8],
    ) -> BridgeResult<Address> {
        let validator = self
            .staking
            .validator(operator)
            .map_err(|e| staking_error("validator", e))?;
        if validator.consensus_power == 0 {
            return Err(BridgeError::InvalidRequest(format!(
                "validator {operator} is not staked"
            )));
        }

        let evm_address = Secp256k1PublicKey::from_sec1_bytes(pubkey)?.evm_address();
        if schema::OPERATOR_TO_EVM.has(&self.store, operator)? {
            return Err(BridgeError::OperatorAlreadyRegistered {
                operator: operator.to_string(),
            });
        }
        if schema::EVM_TO_OPERATOR.has(&self.store, &evm_address)? {
            return Err(BridgeError::EvmAddressTaken {
                address: hex::encode(evm_address),
            });
        }
        self.set_evm_address_by_operator(operator, evm_address)?;
        Ok(evm_address)
    }

    /// Registered operator whose key produced `signature` over `payload`.
    pub fn operator_from_signature(
        &self,
        payload: &[u8],
        signature: &[u8],
    ) -> BridgeResult<OperatorAddress> {
        let candidates = recover_signer_candidates(signature, &signing_digest(payload))?;
        for candidate in &candidates {
            if let Some(operator) = schema::EVM_TO_OPERATOR.get(&self.store, candidate)? {
                return Ok(operator);
            }
        }
        Err(BridgeError::UnknownSigner)
    }
}
