//! # Typed Collections
//!
//! Thin typed views over the [`KeyValueStore`] port.
//!
//! ```text
//! key   = [prefix byte] ‖ KeyCodec::encode(k)
//! value = bincode(v)
//! ```
//!
//! Integer keys are big-endian and variable-length keys carry a `u16` length
//! prefix, so byte order equals logical order and composite keys can be
//! range-scanned per leading component. A component too long for its prefix
//! is refused with [`StoreError::KeyTooLong`].

pub mod schema;

use crate::ports::outbound::{prefix_end, KeyRange, KeyValueStore, Order};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Hash, OperatorAddress, StoreError};
use std::marker::PhantomData;
use std::ops::ControlFlow;

// =============================================================================
// KEY CODEC
// =============================================================================

/// Order-preserving key encoding.
pub trait KeyCodec: Sized {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError>;

    /// Decode from the front of `bytes`, returning the rest.
    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])>;
}

impl KeyCodec for u64 {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        out.extend_from_slice(&self.to_be_bytes());
        Ok(())
    }

    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (head, rest) = bytes.split_first_chunk::<8>()?;
        Some((u64::from_be_bytes(*head), rest))
    }
}

impl KeyCodec for Hash {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        out.extend_from_slice(self);
        Ok(())
    }

    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (head, rest) = bytes.split_first_chunk::<32>()?;
        Some((*head, rest))
    }
}

impl KeyCodec for [u8; 20] {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        out.extend_from_slice(self);
        Ok(())
    }

    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (head, rest) = bytes.split_first_chunk::<20>()?;
        Some((*head, rest))
    }
}

impl KeyCodec for OperatorAddress {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        let raw = self.as_str().as_bytes();
        let len = u16::try_from(raw.len()).map_err(|_| StoreError::KeyTooLong {
            len: raw.len(),
            max: usize::from(u16::MAX),
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(raw);
        Ok(())
    }

    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (len, rest) = bytes.split_first_chunk::<2>()?;
        let len = u16::from_be_bytes(*len) as usize;
        if rest.len() < len {
            return None;
        }
        let (raw, rest) = rest.split_at(len);
        let text = std::str::from_utf8(raw).ok()?;
        Some((OperatorAddress::from(text), rest))
    }
}

impl<A: KeyCodec, B: KeyCodec> KeyCodec for (A, B) {
    fn encode_key(&self, out: &mut Vec<u8>) -> Result<(), StoreError> {
        self.0.encode_key(out)?;
        self.1.encode_key(out)
    }

    fn decode_key(bytes: &[u8]) -> Option<(Self, &[u8])> {
        let (a, rest) = A::decode_key(bytes)?;
        let (b, rest) = B::decode_key(rest)?;
        Some(((a, b), rest))
    }
}

fn encode_value<V: Serialize>(collection: &'static str, value: &V) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Codec {
        collection,
        reason: e.to_string(),
    })
}

fn decode_value<V: DeserializeOwned>(collection: &'static str, bytes: &[u8]) -> Result<V, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec {
        collection,
        reason: e.to_string(),
    })
}

// =============================================================================
// ITEM
// =============================================================================

/// A single value under a fixed key.
pub struct Item<V> {
    prefix: u8,
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Item<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Item<V> {}

impl<V: Serialize + DeserializeOwned> Item<V> {
    pub const fn new(prefix: u8, name: &'static str) -> Self {
        Self {
            prefix,
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<Option<V>, StoreError> {
        store
            .get(&[self.prefix])?
            .map(|bytes| decode_value(self.name, &bytes))
            .transpose()
    }

    pub fn set<S: KeyValueStore + ?Sized>(&self, store: &mut S, value: &V) -> Result<(), StoreError> {
        store.put(&[self.prefix], &encode_value(self.name, value)?)
    }
}

// =============================================================================
// MAP
// =============================================================================

/// Ordered key → value collection.
pub struct Map<K, V> {
    prefix: u8,
    name: &'static str,
    _entry: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for Map<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Map<K, V> {}

impl<K: KeyCodec, V: Serialize + DeserializeOwned> Map<K, V> {
    pub const fn new(prefix: u8, name: &'static str) -> Self {
        Self {
            prefix,
            name,
            _entry: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn key(&self, key: &K) -> Result<Vec<u8>, StoreError> {
        let mut out = vec![self.prefix];
        key.encode_key(&mut out)?;
        Ok(out)
    }

    pub fn get<S: KeyValueStore + ?Sized>(&self, store: &S, key: &K) -> Result<Option<V>, StoreError> {
        store
            .get(&self.key(key)?)?
            .map(|bytes| decode_value(self.name, &bytes))
            .transpose()
    }

    pub fn has<S: KeyValueStore + ?Sized>(&self, store: &S, key: &K) -> Result<bool, StoreError> {
        store.exists(&self.key(key)?)
    }

    pub fn set<S: KeyValueStore + ?Sized>(
        &self,
        store: &mut S,
        key: &K,
        value: &V,
    ) -> Result<(), StoreError> {
        store.put(&self.key(key)?, &encode_value(self.name, value)?)
    }

    /// Visit entries in `range` (raw bytes after the prefix) until `visit` breaks.
    fn walk_raw<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        start: Vec<u8>,
        end: Option<Vec<u8>>,
        order: Order,
        visit: &mut dyn FnMut(K, V) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        let mut failure = None;
        let range = KeyRange::new(start, end);
        store.range_walk(&range, order, &mut |key: &[u8], value: &[u8]| {
            let decoded = K::decode_key(&key[1..])
                .filter(|(_, rest)| rest.is_empty())
                .ok_or(StoreError::MalformedKey {
                    collection: self.name,
                })
                .and_then(|(k, _)| Ok((k, decode_value(self.name, value)?)));
            match decoded {
                Ok((k, v)) => visit(k, v),
                Err(e) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
            }
        })?;
        failure.map_or(Ok(()), Err)
    }

    /// Every entry, in `order`.
    pub fn walk<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        order: Order,
        visit: &mut dyn FnMut(K, V) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        self.walk_raw(store, vec![self.prefix], prefix_end(&[self.prefix]), order, visit)
    }

    /// Entry with the greatest key strictly below `key`.
    pub fn last_before<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        key: &K,
    ) -> Result<Option<(K, V)>, StoreError> {
        let mut found = None;
        self.walk_raw(
            store,
            vec![self.prefix],
            Some(self.key(key)?),
            Order::Descending,
            &mut |k, v| {
                found = Some((k, v));
                ControlFlow::Break(())
            },
        )?;
        Ok(found)
    }

    /// Entry with the smallest key strictly above `key`.
    pub fn first_after<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        key: &K,
    ) -> Result<Option<(K, V)>, StoreError> {
        let mut start = self.key(key)?;
        start.push(0);
        let mut found = None;
        self.walk_raw(
            store,
            start,
            prefix_end(&[self.prefix]),
            Order::Ascending,
            &mut |k, v| {
                found = Some((k, v));
                ControlFlow::Break(())
            },
        )?;
        Ok(found)
    }
}

impl<A: KeyCodec, B: KeyCodec, V: Serialize + DeserializeOwned> Map<(A, B), V> {
    fn outer_prefix(&self, outer: &A) -> Result<Vec<u8>, StoreError> {
        let mut out = vec![self.prefix];
        outer.encode_key(&mut out)?;
        Ok(out)
    }

    fn composite_key(&self, outer: &A, inner: &B) -> Result<Vec<u8>, StoreError> {
        let mut out = self.outer_prefix(outer)?;
        inner.encode_key(&mut out)?;
        Ok(out)
    }

    /// Within `outer`, the entry with the greatest inner key strictly below `inner`.
    pub fn prefix_last_before<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        outer: &A,
        inner: &B,
    ) -> Result<Option<(B, V)>, StoreError> {
        let mut found = None;
        self.walk_raw(
            store,
            self.outer_prefix(outer)?,
            Some(self.composite_key(outer, inner)?),
            Order::Descending,
            &mut |(_, b), v| {
                found = Some((b, v));
                ControlFlow::Break(())
            },
        )?;
        Ok(found)
    }

    /// Within `outer`, the entry with the smallest inner key strictly above `inner`.
    pub fn prefix_first_after<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        outer: &A,
        inner: &B,
    ) -> Result<Option<(B, V)>, StoreError> {
        let mut start = self.composite_key(outer, inner)?;
        start.push(0);
        let mut found = None;
        self.walk_raw(
            store,
            start,
            prefix_end(&self.outer_prefix(outer)?),
            Order::Ascending,
            &mut |(_, b), v| {
                found = Some((b, v));
                ControlFlow::Break(())
            },
        )?;
        Ok(found)
    }
}
