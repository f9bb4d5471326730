//! Collaborator contracts: the synchronous storage engine this pipeline
//! dispatches to. Both traits are external collaborators — their
//! implementations, and any internal synchronization they need to be safely
//! shared across connections, are out of scope here.

use std::sync::Arc;

use kvnode_proto::{Key, VectorClock, VersionedValue};

use crate::error::StoreError;

/// One named key-value store. Implementations may be backed by anything
/// from an in-memory map to a replicated engine; every method is
/// synchronous from the handler's point of view.
pub trait Store: Send + Sync {
    fn get(&self, key: &Key) -> Result<Vec<VersionedValue>, StoreError>;

    /// Returns one entry per key that has at least one version on record;
    /// keys with no data are simply absent from the result.
    fn get_all(&self, keys: &[Key]) -> Result<Vec<(Key, Vec<VersionedValue>)>, StoreError>;

    fn put(&self, key: Key, value: VersionedValue) -> Result<(), StoreError>;

    /// Returns whether a matching version was found and removed.
    fn delete(&self, key: &Key, version: &VectorClock) -> Result<bool, StoreError>;
}

/// Resolves a store by name, optionally honoring client-side routing.
///
/// Lookup is assumed synchronous and fast: it runs on the connection's
/// selector thread once per request.
pub trait StoreRepository: Send + Sync {
    fn get(&self, name: &str, is_routed: bool) -> Option<Arc<dyn Store>>;
}
