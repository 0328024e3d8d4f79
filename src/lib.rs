//! ringkv keeps a set of nodes arranged in a consistent logical ring
//! over an unreliable transport, resolves key lookups in O(log n) hops
//! through per-node finger tables, and replicates each node's key-value
//! store onto its successors so data outlives node departures.
//!
//! The pieces:
//! - [dht]: identifier arithmetic, peer records, and the routing state
//!   (predecessor, successor list, finger table) lookups run on.
//! - [node]: the running participant, its lifecycle and the recursive
//!   lookup driver.
//! - [maintenance]: the periodic tasks that repair the routing state and
//!   push replication batches.
//! - [storage]: versioned per-owner stores behind one capability trait,
//!   with in-memory and filesystem backends.
//! - [rpc]: the wire surface, the retrying client shell, and the
//!   in-process and TCP transports.
pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod node;
pub mod rpc;
pub mod storage;

pub use error::Error;
pub use error::Result;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dht::Peer;
    pub use crate::dht::RingId;
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::node::RingNode;
    pub use crate::node::RingStatus;
    pub use crate::rpc::MemoryNetwork;
    pub use crate::rpc::RingClient;
    pub use crate::rpc::RingService;
    pub use crate::rpc::Transport;
    pub use crate::storage::Store;
    pub use crate::storage::StoreManager;
}
