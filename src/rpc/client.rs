//! Retrying facade over the transport seam.
use std::sync::Arc;

use super::RingOp;
use super::RingReply;
use super::Transport;
use crate::dht::Peer;
use crate::dht::RingId;
use crate::error::Error;
use crate::error::Result;

/// Every outbound operation runs through the same shell: try, log the
/// failure at debug, retry while the budget lasts, then surface the last
/// error for the caller to map into its sentinel. The budget is spent
/// per call, never forwarded, so a lookup crossing many nodes cannot
/// amplify its retry cost.
#[derive(Clone)]
pub struct RingClient {
    transport: Arc<dyn Transport>,
    retries: u32,
}

impl RingClient {
    pub fn new(transport: Arc<dyn Transport>, retries: u32) -> Self {
        Self { transport, retries }
    }

    async fn call(&self, target: &Peer, op: RingOp) -> Result<RingReply> {
        let mut remaining = self.retries;
        loop {
            let outcome = match self.transport.call(target, op.clone()).await {
                Ok(RingReply::Error { message }) => Err(Error::Remote(message)),
                other => other,
            };
            match outcome {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::debug!(peer = %target, error = %e, remaining, "remote call failed");
                    if remaining == 0 {
                        return Err(e);
                    }
                    remaining -= 1;
                }
            }
        }
    }

    pub async fn find_successor(
        &self,
        target: &Peer,
        id: RingId,
        hops: u32,
    ) -> Result<(Peer, u32)> {
        match self
            .call(target, RingOp::FindSuccessor { target: id, hops })
            .await?
        {
            RingReply::FoundSuccessor { peer, hops } => Ok((peer, hops)),
            _ => Err(Error::UnexpectedReply("find_successor")),
        }
    }

    pub async fn predecessor(&self, target: &Peer) -> Result<Option<Peer>> {
        match self.call(target, RingOp::Predecessor).await? {
            RingReply::Predecessor { peer } => Ok(peer),
            _ => Err(Error::UnexpectedReply("predecessor")),
        }
    }

    pub async fn successor(&self, target: &Peer) -> Result<Peer> {
        match self.call(target, RingOp::Successor).await? {
            RingReply::Successor { peer } => Ok(peer),
            _ => Err(Error::UnexpectedReply("successor")),
        }
    }

    pub async fn successor_list(&self, target: &Peer) -> Result<Vec<Peer>> {
        match self.call(target, RingOp::SuccessorList).await? {
            RingReply::SuccessorList { peers } => Ok(peers),
            _ => Err(Error::UnexpectedReply("successor_list")),
        }
    }

    pub async fn notify(&self, target: &Peer, caller: Peer) -> Result<()> {
        match self.call(target, RingOp::Notify { caller }).await? {
            RingReply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply("notify")),
        }
    }

    pub async fn add_key(
        &self,
        target: &Peer,
        owner: RingId,
        key: RingId,
        value: Vec<u8>,
    ) -> Result<()> {
        match self
            .call(target, RingOp::AddKey { owner, key, value })
            .await?
        {
            RingReply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply("add_key")),
        }
    }

    pub async fn find_key(
        &self,
        target: &Peer,
        owner: RingId,
        key: RingId,
    ) -> Result<Option<Vec<u8>>> {
        match self.call(target, RingOp::FindKey { owner, key }).await? {
            RingReply::Value { value } => Ok(value),
            _ => Err(Error::UnexpectedReply("find_key")),
        }
    }

    pub async fn store_version(&self, target: &Peer, owner: RingId) -> Result<u64> {
        match self.call(target, RingOp::StoreVersion { owner }).await? {
            RingReply::StoreVersion { version } => Ok(version),
            _ => Err(Error::UnexpectedReply("store_version")),
        }
    }

    pub async fn delete_store(&self, target: &Peer, owner: RingId) -> Result<()> {
        match self.call(target, RingOp::DeleteStore { owner }).await? {
            RingReply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply("delete_store")),
        }
    }

    pub async fn replicate_in(
        &self,
        target: &Peer,
        owner: RingId,
        version: u64,
        entries: Vec<(RingId, Vec<u8>)>,
    ) -> Result<()> {
        match self
            .call(target, RingOp::ReplicateIn { owner, version, entries })
            .await?
        {
            RingReply::Done => Ok(()),
            _ => Err(Error::UnexpectedReply("replicate_in")),
        }
    }

    /// Liveness probe; exhausting the retry budget reads as dead.
    pub async fn ping(&self, target: &Peer) -> bool {
        matches!(self.call(target, RingOp::Ping).await, Ok(RingReply::Pong))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;

    /// Fails the first `failures` calls, then answers Pong.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn call(&self, target: &Peer, _op: RingOp) -> Result<RingReply> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::Unreachable(target.to_string()))
            } else {
                Ok(RingReply::Pong)
            }
        }
    }

    fn target() -> Peer {
        Peer::with_id(RingId::new(42), "127.0.0.1", 7700)
    }

    #[tokio::test]
    async fn test_retries_within_budget() {
        let transport = Arc::new(FlakyTransport {
            failures: 3,
            calls: AtomicU32::new(0),
        });
        let client = RingClient::new(transport.clone(), 3);
        assert!(client.ping(&target()).await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_failure() {
        let transport = Arc::new(FlakyTransport {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let client = RingClient::new(transport.clone(), 3);
        assert!(!client.ping(&target()).await);
        // one initial try plus three retries, no more
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_remote_error_reply_counts_as_failure() {
        struct AlwaysError;
        #[async_trait]
        impl Transport for AlwaysError {
            async fn call(&self, _target: &Peer, _op: RingOp) -> Result<RingReply> {
                Ok(RingReply::Error {
                    message: "boom".into(),
                })
            }
        }
        let client = RingClient::new(Arc::new(AlwaysError), 1);
        let err = client.predecessor(&target()).await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }
}
