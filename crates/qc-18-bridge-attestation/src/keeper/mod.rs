//! # Bridge Keeper
//!
//! Stateful side of the bridge: owns the store, talks to the staking and
//! oracle collaborators, and implements the inbound ports.
//!
//! ## Layout
//!
//! - `valset`: validator-set construction, checkpoints, valset signatures
//! - `attestation`: report snapshots and oracle attestations
//! - `operator`: operator ↔ EVM address identity
//! - `evidence`: fraud evidence, rate-limit ledgers, slashing
//! - `end_block`: per-block checkpoint and snapshot production
//! - `msg_server` / `query`: inbound port implementations

mod attestation;
mod end_block;
mod evidence;
mod msg_server;
mod operator;
mod query;
mod valset;


use crate::config::BridgeConfig;
use crate::domain::encoding::DomainSeparator;
use crate::domain::errors::{BridgeError, BridgeResult};
use crate::domain::events::BridgeEvent;
use crate::domain::params::Params;
use crate::ports::outbound::{
    CollaboratorError, KeyValueStore, OracleKeeper, StakingKeeper, StakingValidator,
};
use crate::store::schema;
use parking_lot::RwLock;
use shared_crypto::Secp256k1PublicKey;
use shared_types::ConsensusAddress;
use std::sync::Arc;

pub use evidence::EvidenceLedger;

/// Dependencies for [`BridgeKeeper`].
pub struct BridgeDependencies<S, K, O> {
    pub store: S,
    pub staking: Arc<K>,
    pub oracle: Arc<O>,
}

/// The bridge keeper.
pub struct BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    pub(crate) store: S,
    pub(crate) staking: Arc<K>,
    pub(crate) oracle: Arc<O>,
    pub(crate) config: BridgeConfig,
    /// Cached separator, keyed by the mainnet chain id it was derived with.
    domain_separator: RwLock<Option<(String, DomainSeparator)>>,
    events: Vec<BridgeEvent>,
}

impl<S, K, O> BridgeKeeper<S, K, O>
where
    S: KeyValueStore + Clone,
    K: StakingKeeper,
    O: OracleKeeper,
{
    pub fn new(deps: BridgeDependencies<S, K, O>, config: BridgeConfig) -> Self {
        Self {
            store: deps.store,
            staking: deps.staking,
            oracle: deps.oracle,
            config,
            domain_separator: RwLock::new(None),
            events: Vec::new(),
        }
    }

    /// Write genesis state: params and the snapshot limit.
    pub fn init_genesis(&mut self, params: Params) -> BridgeResult<()> {
        params.validate()?;
        schema::PARAMS.set(&mut self.store, &params)?;
        schema::SNAPSHOT_LIMIT.set(&mut self.store, &self.config.default_snapshot_limit)?;
        tracing::info!(
            "[qc-18] Genesis: chain_id={}, snapshot_limit={}",
            self.config.chain_id,
            self.config.default_snapshot_limit
        );
        Ok(())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn params(&self) -> BridgeResult<Params> {
        schema::PARAMS
            .get(&self.store)?
            .ok_or_else(|| BridgeError::not_found("params", "bridge"))
    }

    pub fn snapshot_limit(&self) -> BridgeResult<u64> {
        Ok(schema::SNAPSHOT_LIMIT
            .get(&self.store)?
            .unwrap_or(self.config.default_snapshot_limit))
    }

    /// Checkpoint domain separator, derived once per mainnet chain id.
    pub fn domain_separator(&self) -> BridgeResult<DomainSeparator> {
        let mainnet_chain_id = self.params()?.mainnet_chain_id;
        if let Some((cached_for, separator)) = self.domain_separator.read().as_ref() {
            if *cached_for == mainnet_chain_id {
                return Ok(*separator);
            }
        }
        let separator = DomainSeparator::for_chain(&self.config.chain_id, &mainnet_chain_id);
        *self.domain_separator.write() = Some((mainnet_chain_id, separator));
        Ok(separator)
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: BridgeEvent) {
        tracing::debug!("[qc-18] event {}", event.kind());
        self.events.push(event);
    }

    /// Run `f`; on error restore the store and drop events emitted by `f`.
    pub fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        let checkpoint = self.store.clone();
        let event_count = self.events.len();
        let result = f(self);
        if result.is_err() {
            self.store = checkpoint;
            self.events.truncate(event_count);
        }
        result
    }

    pub fn staking_validator_by_consensus_address(
        &self,
        consensus: &ConsensusAddress,
    ) -> BridgeResult<StakingValidator> {
        self.staking
            .validator_by_consensus_address(consensus)
            .map_err(|e| staking_error("validator", e))
    }

    /// Consensus key of the validator at `consensus`.
    pub fn consensus_pubkey(&self, consensus: &ConsensusAddress) -> BridgeResult<Secp256k1PublicKey> {
        let bytes = self
            .staking
            .consensus_pubkey(consensus)
            .map_err(|e| staking_error("consensus key", e))?;
        Ok(Secp256k1PublicKey::from_sec1_bytes(&bytes)?)
    }
}

pub(crate) fn staking_error(what: &'static str, err: CollaboratorError) -> BridgeError {
    match err {
        CollaboratorError::NotFound(key) => BridgeError::not_found(what, key),
        CollaboratorError::Failed(reason) => BridgeError::Staking(reason),
    }
}

pub(crate) fn oracle_error(what: &'static str, err: CollaboratorError) -> BridgeError {
    match err {
        CollaboratorError::NotFound(key) => BridgeError::not_found(what, key),
        CollaboratorError::Failed(reason) => BridgeError::Oracle(reason),
    }
}
