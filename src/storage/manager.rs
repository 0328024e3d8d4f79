//! The per-node table of stores: one primary keyed by the node's own
//! id, plus a replica store per primary this node mirrors.
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use super::FileStore;
use super::MemoryStore;
use super::Store;
use crate::dht::RingId;
use crate::error::Result;

/// Which concrete store the manager opens.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Everything on the heap; gone on restart.
    Memory,
    /// One directory per owner under the given root.
    File(PathBuf),
}

/// Keeps the {owner id → store} mapping and runs the store-level
/// operations of the wire protocol. Stores come into being lazily, on
/// the first write or replication batch addressed to their owner.
pub struct StoreManager {
    backend: StoreBackend,
    stores: DashMap<RingId, Arc<dyn Store>>,
}

impl StoreManager {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            stores: DashMap::new(),
        }
    }

    /// The store for `owner`, creating it if absent.
    pub async fn open(&self, owner: RingId) -> Result<Arc<dyn Store>> {
        if let Some(store) = self.stores.get(&owner) {
            return Ok(store.value().clone());
        }
        let store: Arc<dyn Store> = match &self.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File(root) => {
                Arc::new(FileStore::open(root.join(format!("{:016x}", owner.value()))).await?)
            }
        };
        // a racing creator may have beaten us; keep whichever landed
        Ok(self.stores.entry(owner).or_insert(store).value().clone())
    }

    /// The store for `owner` if one exists.
    pub fn get(&self, owner: RingId) -> Option<Arc<dyn Store>> {
        self.stores.get(&owner).map(|s| s.value().clone())
    }

    /// Owners with a store on this node.
    pub fn owners(&self) -> Vec<RingId> {
        self.stores.iter().map(|e| *e.key()).collect()
    }

    /// Write one key into the store of `owner`.
    pub async fn add_key(&self, owner: RingId, key: RingId, value: Vec<u8>) -> Result<u64> {
        let store = self.open(owner).await?;
        if store.contains(key).await? {
            tracing::debug!(%owner, %key, "overwriting existing key");
        }
        store.put(key, value).await
    }

    /// Read one key from the store of `owner`. Absent store reads as
    /// absent key.
    pub async fn find_key(&self, owner: RingId, key: RingId) -> Result<Option<Vec<u8>>> {
        match self.get(owner) {
            Some(store) => store.get(key).await,
            None => Ok(None),
        }
    }

    /// Version of the store of `owner`, zero when there is none.
    pub async fn version_of(&self, owner: RingId) -> Result<u64> {
        match self.get(owner) {
            Some(store) => store.version().await,
            None => Ok(0),
        }
    }

    /// Drop the store of `owner` entirely. Idempotent.
    pub async fn delete_store(&self, owner: RingId) -> Result<()> {
        if let Some((_, store)) = self.stores.remove(&owner) {
            store.clear().await?;
            tracing::debug!(%owner, "deleted store");
        }
        Ok(())
    }

    /// Absorb a replication batch addressed to the replica of `owner`.
    pub async fn replicate_in(
        &self,
        owner: RingId,
        version: u64,
        entries: Vec<(RingId, Vec<u8>)>,
    ) -> Result<()> {
        let store = self.open(owner).await?;
        store.replicate_in(version, entries).await
    }

    /// The entries a replica sitting at `since` is missing: every key the
    /// history records in the versions above it, with current values.
    /// Keys deleted since then simply drop out of the batch.
    pub async fn delta_since(&self, owner: RingId, since: u64) -> Result<Vec<(RingId, Vec<u8>)>> {
        let Some(store) = self.get(owner) else {
            return Ok(vec![]);
        };
        let history = store.history().await?;
        let mut changed = BTreeSet::new();
        for (_, keys) in history.range(since + 1..) {
            changed.extend(keys.iter().copied());
        }
        let mut out = Vec::with_capacity(changed.len());
        for key in changed {
            if let Some(value) = store.get(key).await? {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}
