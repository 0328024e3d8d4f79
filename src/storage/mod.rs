//! Versioned per-owner key-value stores and their replication plumbing.
mod fs;
mod manager;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use fs::FileStore;
pub use manager::StoreBackend;
pub use manager::StoreManager;
pub use memory::MemoryStore;

use crate::dht::RingId;
use crate::error::Result;

/// Which keys changed at which version. The replication task unions the
/// buckets above a replica's version to build the delta it ships.
pub type VersionHistory = BTreeMap<u64, Vec<RingId>>;

/// One key-value store, owned by a single ring position. The manager
/// only ever holds this capability, never a concrete backend.
///
/// A store's version counter and its history move together: every
/// accepted mutation bumps the counter and records the touched keys
/// under the new version in the same critical section.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether `key` is present.
    async fn contains(&self, key: RingId) -> Result<bool>;

    /// Read one value.
    async fn get(&self, key: RingId) -> Result<Option<Vec<u8>>>;

    /// Write one value, overwriting any previous one. Returns the store
    /// version after the write.
    async fn put(&self, key: RingId, value: Vec<u8>) -> Result<u64>;

    /// Drop one key. Removing an absent key is not a mutation.
    async fn remove(&self, key: RingId) -> Result<()>;

    /// Drop every key and reset the version counter.
    async fn clear(&self) -> Result<()>;

    /// All present keys.
    async fn keys(&self) -> Result<Vec<RingId>>;

    /// All entries, for full-store seeding.
    async fn entries(&self) -> Result<Vec<(RingId, Vec<u8>)>>;

    /// Current version counter.
    async fn version(&self) -> Result<u64>;

    /// Snapshot of the change history.
    async fn history(&self) -> Result<VersionHistory>;

    /// Absorb a replication batch from the primary: merge the entries,
    /// jump to the primary's version and restart the history at it.
    async fn replicate_in(&self, version: u64, entries: Vec<(RingId, Vec<u8>)>) -> Result<()>;
}
