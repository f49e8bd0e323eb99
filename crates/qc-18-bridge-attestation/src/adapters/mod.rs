//! Adapters for the outbound ports.

pub mod local_signer;
pub mod memory_store;

pub use local_signer::LocalKeySigner;
pub use memory_store::InMemoryKVStore;
