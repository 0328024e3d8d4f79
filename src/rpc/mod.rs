//! The remote-call surface: wire shapes, the transport seam, and the
//! retrying client every outbound operation goes through.
mod client;
mod memory;
pub mod tcp;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use client::RingClient;
pub use memory::MemoryNetwork;

use crate::dht::Peer;
use crate::dht::RingId;
use crate::error::Result;

/// Every operation a node answers remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RingOp {
    FindSuccessor { target: RingId, hops: u32 },
    Predecessor,
    Successor,
    SuccessorList,
    Notify { caller: Peer },
    AddKey { owner: RingId, key: RingId, value: Vec<u8> },
    FindKey { owner: RingId, key: RingId },
    StoreVersion { owner: RingId },
    DeleteStore { owner: RingId },
    ReplicateIn { owner: RingId, version: u64, entries: Vec<(RingId, Vec<u8>)> },
    Ping,
    Port,
}

/// The matching replies. A failure raised on the remote side travels
/// back as [RingReply::Error] and counts as a failed call at the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RingReply {
    FoundSuccessor { peer: Peer, hops: u32 },
    Predecessor { peer: Option<Peer> },
    Successor { peer: Peer },
    SuccessorList { peers: Vec<Peer> },
    Value { value: Option<Vec<u8>> },
    StoreVersion { version: u64 },
    Done,
    Pong,
    Port { port: u16 },
    Error { message: String },
}

/// How a request reaches another node. Implementations carry the
/// framing; the core only sees this seam.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, target: &Peer, op: RingOp) -> Result<RingReply>;
}

/// The inbound side of the same surface: whatever serves a node's
/// endpoint dispatches decoded operations into this.
#[async_trait]
pub trait RingService: Send + Sync {
    async fn dispatch(&self, op: RingOp) -> RingReply;
}
