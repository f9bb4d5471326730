//! An in-memory `Store`/`StoreRepository` for running the pipeline
//! end-to-end without a real storage engine wired in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use kvnode_core::{Store, StoreError, StoreRepository};
use kvnode_proto::{Key, VectorClock, VersionedValue};

/// A single named store backed by a `Mutex<HashMap<..>>`. Good enough for
/// exercising the pipeline; not a serious storage engine.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<Vec<u8>, Vec<VersionedValue>>>,
}

impl Store for InMemoryStore {
    fn get(&self, key: &Key) -> Result<Vec<VersionedValue>, StoreError> {
        Ok(self.data.lock().unwrap().get(&key.0).cloned().unwrap_or_default())
    }

    fn get_all(&self, keys: &[Key]) -> Result<Vec<(Key, Vec<VersionedValue>)>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| data.get(&k.0).map(|versions| (k.clone(), versions.clone())))
            .collect())
    }

    fn put(&self, key: Key, value: VersionedValue) -> Result<(), StoreError> {
        self.data.lock().unwrap().entry(key.0).or_default().push(value);
        Ok(())
    }

    fn delete(&self, key: &Key, version: &VectorClock) -> Result<bool, StoreError> {
        let mut data = self.data.lock().unwrap();
        let Some(versions) = data.get_mut(&key.0) else {
            return Ok(false);
        };
        let before = versions.len();
        versions.retain(|vv| vv.clock != *version);
        let removed = versions.len() < before;
        if versions.is_empty() {
            data.remove(&key.0);
        }
        Ok(removed)
    }
}

/// Lazily creates one [`InMemoryStore`] per distinct name on first lookup.
/// `is_routed` has no effect: this repository never routes across nodes.
#[derive(Default)]
pub struct InMemoryRepository {
    stores: RwLock<HashMap<String, Arc<dyn Store>>>,
}

impl StoreRepository for InMemoryRepository {
    fn get(&self, name: &str, _is_routed: bool) -> Option<Arc<dyn Store>> {
        if let Some(store) = self.stores.read().unwrap().get(name) {
            return Some(Arc::clone(store));
        }
        let mut stores = self.stores.write().unwrap();
        let store = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryStore::default()) as Arc<dyn Store>);
        Some(Arc::clone(store))
    }
}
