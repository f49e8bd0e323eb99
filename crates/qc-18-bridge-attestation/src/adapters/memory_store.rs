use crate::ports::outbound::{KeyRange, KeyValueStore, Order};
use shared_types::StoreError;
use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};

/// In-memory ordered key-value store.
///
/// `Clone` gives the keeper a cheap snapshot to restore when a message fails.
/// Production backs the port with the host chain's committed store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn range_walk(
        &self,
        range: &KeyRange,
        order: Order,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<(), StoreError> {
        if range.end.as_ref().is_some_and(|end| *end <= range.start) {
            return Ok(());
        }
        let bounds = (
            Bound::Included(range.start.clone()),
            range
                .end
                .clone()
                .map_or(Bound::Unbounded, Bound::Excluded),
        );
        let entries = self.data.range::<Vec<u8>, _>(bounds);
        match order {
            Order::Ascending => {
                for (k, v) in entries {
                    if visit(k, v).is_break() {
                        break;
                    }
                }
            }
            Order::Descending => {
                for (k, v) in entries.rev() {
                    if visit(k, v).is_break() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(store: &InMemoryKVStore, range: KeyRange, order: Order) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        store
            .range_walk(&range, order, &mut |k: &[u8], _: &[u8]| {
                keys.push(k.to_vec());
                ControlFlow::Continue(())
            })
            .unwrap();
        keys
    }

    #[test]
    fn test_in_memory_kv_store() {
        let mut store = InMemoryKVStore::new();

        store.put(b"key1", b"value1").unwrap();
        store.put(b"key2", b"value2").unwrap();

        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key3").unwrap(), None);
        assert!(store.exists(b"key2").unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_range_walk_orders_and_bounds() {
        let mut store = InMemoryKVStore::new();
        for key in [b"a1", b"a2", b"a3", b"b1"] {
            store.put(key, b"").unwrap();
        }

        let asc = collect(&store, KeyRange::prefix(b"a"), Order::Ascending);
        assert_eq!(asc, vec![b"a1".to_vec(), b"a2".to_vec(), b"a3".to_vec()]);

        let desc = collect(
            &store,
            KeyRange::new(b"a".to_vec(), Some(b"a3".to_vec())),
            Order::Descending,
        );
        assert_eq!(desc, vec![b"a2".to_vec(), b"a1".to_vec()]);
    }

    #[test]
    fn test_range_walk_stops_on_break() {
        let mut store = InMemoryKVStore::new();
        store.put(b"x1", b"").unwrap();
        store.put(b"x2", b"").unwrap();

        let mut visited = 0;
        store
            .range_walk(&KeyRange::prefix(b"x"), Order::Ascending, &mut |_: &[u8], _: &[u8]| {
                visited += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_clone_is_independent_snapshot() {
        let mut store = InMemoryKVStore::new();
        store.put(b"k", b"v1").unwrap();
        let snapshot = store.clone();
        store.put(b"k", b"v2").unwrap();
        assert_eq!(snapshot.get(b"k").unwrap(), Some(b"v1".to_vec()));
    }
}
