//! In-process transport: nodes living in one process reach each other
//! through a shared registry. Used by the test suites and demos; it can
//! also take endpoints offline to act out crashes and partitions.
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::DashSet;

use super::RingOp;
use super::RingReply;
use super::RingService;
use super::Transport;
use crate::dht::Peer;
use crate::dht::RingId;
use crate::error::Error;
use crate::error::Result;

/// Registry of in-process endpoints keyed by ring id.
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: DashMap<RingId, Arc<dyn RingService>>,
    offline: DashSet<RingId>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Expose a node on the network.
    pub fn register(&self, id: RingId, service: Arc<dyn RingService>) {
        self.endpoints.insert(id, service);
    }

    /// Remove a node from the network.
    pub fn unregister(&self, id: RingId) {
        self.endpoints.remove(&id);
        self.offline.remove(&id);
    }

    /// Cut a node off: calls to it and from it start failing, while the
    /// node itself keeps running. Crash and partition in one switch.
    pub fn set_offline(&self, id: RingId, offline: bool) {
        if offline {
            self.offline.insert(id);
        } else {
            self.offline.remove(&id);
        }
    }

    /// The outbound handle of one local node. Per-node handles let the
    /// offline switch cut both directions of a partition.
    pub fn transport(self: &Arc<Self>, local: RingId) -> Arc<dyn Transport> {
        Arc::new(MemoryTransport {
            network: self.clone(),
            local,
        })
    }
}

struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local: RingId,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, target: &Peer, op: RingOp) -> Result<RingReply> {
        if self.network.offline.contains(&self.local) || self.network.offline.contains(&target.id) {
            return Err(Error::Unreachable(target.to_string()));
        }
        let service = self
            .network
            .endpoints
            .get(&target.id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::Unreachable(target.to_string()))?;
        Ok(service.dispatch(op).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PongService;

    #[async_trait]
    impl RingService for PongService {
        async fn dispatch(&self, _op: RingOp) -> RingReply {
            RingReply::Pong
        }
    }

    fn peer(id: u64) -> Peer {
        Peer::with_id(RingId::new(id), "127.0.0.1", 7700)
    }

    #[tokio::test]
    async fn test_dispatch_and_offline_switch() {
        let net = MemoryNetwork::new();
        net.register(RingId::new(2), Arc::new(PongService));
        let transport = net.transport(RingId::new(1));

        assert!(matches!(
            transport.call(&peer(2), RingOp::Ping).await,
            Ok(RingReply::Pong)
        ));
        // unknown endpoint
        assert!(transport.call(&peer(3), RingOp::Ping).await.is_err());

        // cutting either side severs the link
        net.set_offline(RingId::new(2), true);
        assert!(transport.call(&peer(2), RingOp::Ping).await.is_err());
        net.set_offline(RingId::new(2), false);
        net.set_offline(RingId::new(1), true);
        assert!(transport.call(&peer(2), RingOp::Ping).await.is_err());
        net.set_offline(RingId::new(1), false);
        assert!(transport.call(&peer(2), RingOp::Ping).await.is_ok());
    }
}
