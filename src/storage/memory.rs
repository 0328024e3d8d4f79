//! In-memory store backend.
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::Store;
use super::VersionHistory;
use crate::dht::RingId;
use crate::error::Error;
use crate::error::Result;

struct Inner {
    entries: HashMap<RingId, Vec<u8>>,
    version: u64,
    history: VersionHistory,
}

impl Inner {
    fn fresh() -> Self {
        // the zero-version bucket exists from the start
        let mut history = VersionHistory::new();
        history.insert(0, vec![]);
        Self {
            entries: HashMap::new(),
            version: 0,
            history,
        }
    }

    fn record(&mut self, key: RingId) -> u64 {
        self.version += 1;
        self.history.insert(self.version, vec![key]);
        self.version
    }
}

/// Store keeping everything on the heap. One lock guards entries,
/// version and history so readers always see the three in agreement.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::fresh()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<Inner>> {
        self.inner.read().map_err(|_| Error::StateLock)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<Inner>> {
        self.inner.write().map_err(|_| Error::StateLock)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn contains(&self, key: RingId) -> Result<bool> {
        Ok(self.read()?.entries.contains_key(&key))
    }

    async fn get(&self, key: RingId) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.entries.get(&key).cloned())
    }

    async fn put(&self, key: RingId, value: Vec<u8>) -> Result<u64> {
        let mut inner = self.write()?;
        inner.entries.insert(key, value);
        Ok(inner.record(key))
    }

    async fn remove(&self, key: RingId) -> Result<()> {
        let mut inner = self.write()?;
        if inner.entries.remove(&key).is_some() {
            inner.record(key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.write()? = Inner::fresh();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RingId>> {
        Ok(self.read()?.entries.keys().copied().collect())
    }

    async fn entries(&self) -> Result<Vec<(RingId, Vec<u8>)>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    async fn version(&self) -> Result<u64> {
        Ok(self.read()?.version)
    }

    async fn history(&self) -> Result<VersionHistory> {
        Ok(self.read()?.history.clone())
    }

    async fn replicate_in(&self, version: u64, entries: Vec<(RingId, Vec<u8>)>) -> Result<()> {
        let mut inner = self.write()?;
        let keys: Vec<RingId> = entries.iter().map(|(k, _)| *k).collect();
        for (key, value) in entries {
            inner.entries.insert(key, value);
        }
        inner.version = version;
        inner.history = VersionHistory::from([(version, keys)]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(id: u64) -> RingId {
        RingId::new(id)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.version().await.unwrap(), 0);
        assert_eq!(store.history().await.unwrap().get(&0), Some(&vec![]));

        assert_eq!(store.put(k(7), b"x".to_vec()).await.unwrap(), 1);
        assert_eq!(store.get(k(7)).await.unwrap(), Some(b"x".to_vec()));
        assert!(store.contains(k(7)).await.unwrap());
        assert_eq!(store.history().await.unwrap().get(&1), Some(&vec![k(7)]));
    }

    #[tokio::test]
    async fn test_overwrite_is_a_mutation() {
        // duplicate keys overwrite; the version still advances and the
        // history still records the key
        let store = MemoryStore::new();
        store.put(k(7), b"old".to_vec()).await.unwrap();
        assert_eq!(store.put(k(7), b"new".to_vec()).await.unwrap(), 2);
        assert_eq!(store.get(k(7)).await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.history().await.unwrap().get(&2), Some(&vec![k(7)]));
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_not_a_mutation() {
        let store = MemoryStore::new();
        store.put(k(1), b"a".to_vec()).await.unwrap();
        store.remove(k(99)).await.unwrap();
        assert_eq!(store.version().await.unwrap(), 1);
        store.remove(k(1)).await.unwrap();
        assert_eq!(store.version().await.unwrap(), 2);
        assert!(!store.contains(k(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_replicate_in_round_trip() {
        let store = MemoryStore::new();
        store.put(k(1), b"stale".to_vec()).await.unwrap();

        let batch = vec![(k(2), b"b".to_vec()), (k(3), b"c".to_vec())];
        store.replicate_in(9, batch).await.unwrap();

        assert_eq!(store.version().await.unwrap(), 9);
        assert_eq!(store.get(k(2)).await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.get(k(3)).await.unwrap(), Some(b"c".to_vec()));
        // merged, not replaced
        assert_eq!(store.get(k(1)).await.unwrap(), Some(b"stale".to_vec()));
        // history restarts at the incoming version
        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(&9), Some(&vec![k(2), k(3)]));
    }

    #[tokio::test]
    async fn test_clear_resets_version() {
        let store = MemoryStore::new();
        store.put(k(1), b"a".to_vec()).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.version().await.unwrap(), 0);
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(store.history().await.unwrap().get(&0), Some(&vec![]));
    }
}
