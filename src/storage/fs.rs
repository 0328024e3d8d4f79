//! Filesystem store backend: one directory per store, one file per key.
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use super::VersionHistory;
use crate::dht::RingId;
use crate::error::Result;

/// Key files are named by the key as 16 lower-case hex digits, no
/// extension. Anything else in the directory is not ours and is skipped.
fn parse_key_file(name: &str) -> Option<RingId> {
    if name.len() != 16 || !name.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
        return None;
    }
    u64::from_str_radix(name, 16).ok().map(RingId::new)
}

fn key_file(key: RingId) -> String {
    format!("{:016x}", key.value())
}

struct Index {
    keys: HashSet<RingId>,
    version: u64,
    history: VersionHistory,
}

/// Store keeping each value as a file on disk. The in-memory index
/// carries the key set, the version counter and the history; values are
/// read from disk on demand. The index lock serializes mutations, and
/// since the counter only describes the current process lifetime, a
/// reopened store starts back at version zero with its surviving keys
/// recorded in the zero bucket.
pub struct FileStore {
    dir: PathBuf,
    index: RwLock<Index>,
}

impl FileStore {
    /// Open (or create) the store directory and index the keys already
    /// in it.
    pub async fn open<P>(dir: P) -> Result<Self>
    where P: AsRef<Path> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut keys = HashSet::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match parse_key_file(name) {
                Some(key) => {
                    keys.insert(key);
                }
                None => {
                    tracing::warn!(file = name, dir = %dir.display(), "skipping foreign file in store directory");
                }
            }
        }

        let mut history = VersionHistory::new();
        history.insert(0, keys.iter().copied().collect());
        tracing::debug!(dir = %dir.display(), keys = keys.len(), "opened file store");

        Ok(Self {
            dir,
            index: RwLock::new(Index {
                keys,
                version: 0,
                history,
            }),
        })
    }

    fn path_of(&self, key: RingId) -> PathBuf {
        self.dir.join(key_file(key))
    }
}

#[async_trait]
impl Store for FileStore {
    async fn contains(&self, key: RingId) -> Result<bool> {
        Ok(self.index.read().await.keys.contains(&key))
    }

    async fn get(&self, key: RingId) -> Result<Option<Vec<u8>>> {
        let index = self.index.read().await;
        if !index.keys.contains(&key) {
            return Ok(None);
        }
        match tokio::fs::read(self.path_of(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: RingId, value: Vec<u8>) -> Result<u64> {
        let mut index = self.index.write().await;
        tokio::fs::write(self.path_of(key), &value).await?;
        index.keys.insert(key);
        index.version += 1;
        let version = index.version;
        index.history.insert(version, vec![key]);
        Ok(version)
    }

    async fn remove(&self, key: RingId) -> Result<()> {
        let mut index = self.index.write().await;
        if !index.keys.remove(&key) {
            return Ok(());
        }
        match tokio::fs::remove_file(self.path_of(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        index.version += 1;
        let version = index.version;
        index.history.insert(version, vec![key]);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut index = self.index.write().await;
        for key in index.keys.iter().copied().collect::<Vec<_>>() {
            match tokio::fs::remove_file(self.path_of(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        index.keys.clear();
        index.version = 0;
        index.history = VersionHistory::from([(0, vec![])]);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RingId>> {
        Ok(self.index.read().await.keys.iter().copied().collect())
    }

    async fn entries(&self) -> Result<Vec<(RingId, Vec<u8>)>> {
        let index = self.index.read().await;
        let mut out = Vec::with_capacity(index.keys.len());
        for key in index.keys.iter().copied() {
            match tokio::fs::read(self.path_of(key)).await {
                Ok(value) => out.push((key, value)),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    async fn version(&self) -> Result<u64> {
        Ok(self.index.read().await.version)
    }

    async fn history(&self) -> Result<VersionHistory> {
        Ok(self.index.read().await.history.clone())
    }

    async fn replicate_in(&self, version: u64, entries: Vec<(RingId, Vec<u8>)>) -> Result<()> {
        let mut index = self.index.write().await;
        let keys: Vec<RingId> = entries.iter().map(|(k, _)| *k).collect();
        for (key, value) in entries {
            tokio::fs::write(self.path_of(key), &value).await?;
            index.keys.insert(key);
        }
        index.version = version;
        index.history = VersionHistory::from([(version, keys)]);
        Ok(())
    }
}
