//! The node runtime: lifecycle, the recursive lookup driver, the
//! key-value entry points, and the inbound dispatch of the wire surface.
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::BackendKind;
use crate::config::Config;
use crate::dht::LookupStep;
use crate::dht::Peer;
use crate::dht::RingId;
use crate::dht::RingState;
use crate::error::Error;
use crate::error::Result;
use crate::maintenance;
use crate::rpc::RingClient;
use crate::rpc::RingOp;
use crate::rpc::RingReply;
use crate::rpc::RingService;
use crate::rpc::Transport;
use crate::storage::StoreBackend;
use crate::storage::StoreManager;

/// A running ring participant. Owns the routing state, the store table
/// and the outbound client; the maintenance tasks and the inbound
/// endpoint both borrow it through an [Arc].
pub struct RingNode {
    config: Config,
    ring: RingState,
    storage: StoreManager,
    client: RingClient,
    seed: Mutex<Option<Peer>>,
    shutdown: watch::Sender<bool>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// A point-in-time snapshot of a node's view, for logs and operators.
#[derive(Debug, Clone)]
pub struct RingStatus {
    pub local: Peer,
    pub predecessor: Option<Peer>,
    pub successors: Vec<Peer>,
    pub finger_entries: usize,
    pub store_versions: Vec<(RingId, u64)>,
}

impl RingNode {
    pub fn new(local: Peer, config: Config, transport: Arc<dyn Transport>) -> Arc<Self> {
        let backend = match config.storage.backend {
            BackendKind::Memory => StoreBackend::Memory,
            BackendKind::File => {
                StoreBackend::File(crate::config::expand_home(&config.storage.path))
            }
        };
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            ring: RingState::new(
                local,
                config.ring.successor_list_max,
                config.ring.finger_bits,
            ),
            storage: StoreManager::new(backend),
            client: RingClient::new(transport, config.rpc.retry_budget),
            seed: Mutex::new(None),
            shutdown,
            tasks: tokio::sync::Mutex::new(vec![]),
            config,
        })
    }

    pub fn local(&self) -> &Peer {
        self.ring.local()
    }

    pub fn id(&self) -> RingId {
        self.ring.local().id
    }

    pub fn ring(&self) -> &RingState {
        &self.ring
    }

    pub fn storage(&self) -> &StoreManager {
        &self.storage
    }

    pub fn client(&self) -> &RingClient {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The seed this node was told to attach through.
    pub fn seed(&self) -> Option<Peer> {
        self.seed.lock().ok().and_then(|s| s.clone())
    }

    /// Listen to the shutdown channel; flips to true on depart.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Enter the ring. Without a seed (or with ourselves as seed) this
    /// founds a ring of one. Either way the maintenance tasks start; the
    /// primary store exists from here on.
    pub async fn join(self: &Arc<Self>, seed: Option<Peer>) -> Result<()> {
        let seed = seed.filter(|s| s.id != self.id());
        if let Ok(mut slot) = self.seed.lock() {
            *slot = seed.clone();
        }
        self.storage.open(self.id()).await?;
        match &seed {
            Some(seed) => {
                self.attach(seed).await?;
                tracing::info!(local = %self.local(), seed = %seed, "joined ring");
            }
            None => tracing::info!(local = %self.local(), "founded ring of one"),
        }
        let handles = maintenance::spawn_all(self.clone(), self.shutdown.subscribe());
        self.tasks.lock().await.extend(handles);
        Ok(())
    }

    /// Ask a contact for our place on the ring and prime the routing
    /// state with the answer. The contact itself also goes in: until
    /// stabilization refines the view it is our best-known neighbor.
    pub(crate) async fn attach(&self, seed: &Peer) -> Result<()> {
        if seed.id == self.id() {
            return Ok(());
        }
        self.ring.successors().insert(seed.clone())?;
        self.ring.learn_peer(seed.clone())?;
        let (successor, hops) = self
            .client
            .find_successor(seed, self.id(), 0)
            .await
            .map_err(|e| Error::JoinFailed(e.to_string()))?;
        if successor.id != self.id() {
            self.ring.successors().insert(successor.clone())?;
            self.ring.learn_peer(successor)?;
        }
        tracing::debug!(hops, "attached through seed");
        Ok(())
    }

    /// Leave the ring: stop every maintenance task and wait for their
    /// current iterations to finish.
    pub async fn depart(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!(local = %self.local(), "departed ring");
        Ok(())
    }

    /// Resolve the owner of `target`. Local knowledge answers directly
    /// when it can; otherwise the query hops through closest-preceding
    /// peers, dropping any that turn out dead and rescanning. The hop
    /// count rides along for diagnostics only.
    pub async fn find_successor(&self, target: RingId, hops: u32) -> Result<(Peer, u32)> {
        loop {
            match self.ring.lookup_step(target)? {
                LookupStep::Found(peer) => return Ok((peer, hops)),
                LookupStep::Forward(next) => {
                    match self.client.find_successor(&next, target, hops + 1).await {
                        Ok(found) => return Ok(found),
                        Err(e) => {
                            tracing::debug!(peer = %next, error = %e, "lookup hop failed, dropping peer");
                            self.ring.remove(next.id)?;
                        }
                    }
                }
            }
        }
    }

    /// Write into the store of `owner` on this node. Writes to our own
    /// primary fan out to the successor list right away; a lost copy is
    /// only logged, the replication task will close the gap.
    pub async fn add_key(&self, owner: RingId, key: RingId, value: Vec<u8>) -> Result<()> {
        self.storage.add_key(owner, key, value.clone()).await?;
        if owner != self.id() {
            return Ok(());
        }
        for replica in self.ring.successors().list()? {
            let client = self.client.clone();
            let value = value.clone();
            tokio::spawn(async move {
                if let Err(e) = client.add_key(&replica, owner, key, value).await {
                    tracing::debug!(replica = %replica, error = %e, "replica fan-out dropped");
                }
            });
        }
        Ok(())
    }

    /// Store a value on the ring under `key`: resolve the owner, then
    /// write into its primary store.
    pub async fn put(&self, key: RingId, value: Vec<u8>) -> Result<()> {
        let (owner, _) = self.find_successor(key, 0).await?;
        if owner.id == self.id() {
            self.add_key(owner.id, key, value).await
        } else {
            self.client.add_key(&owner, owner.id, key, value).await
        }
    }

    /// Read a value from the ring. Failures read as absence.
    pub async fn get(&self, key: RingId) -> Option<Vec<u8>> {
        let (owner, _) = self.find_successor(key, 0).await.ok()?;
        if owner.id == self.id() {
            self.storage.find_key(owner.id, key).await.ok().flatten()
        } else {
            self.client
                .find_key(&owner, owner.id, key)
                .await
                .ok()
                .flatten()
        }
    }

    /// Snapshot the node's current view.
    pub async fn status(&self) -> Result<RingStatus> {
        let mut store_versions = vec![];
        for owner in self.storage.owners() {
            store_versions.push((owner, self.storage.version_of(owner).await?));
        }
        Ok(RingStatus {
            local: self.local().clone(),
            predecessor: self.ring.predecessor()?,
            successors: self.ring.successors().list()?,
            finger_entries: self.ring.finger_len()?,
            store_versions,
        })
    }
}

#[async_trait]
impl RingService for RingNode {
    async fn dispatch(&self, op: RingOp) -> RingReply {
        let outcome = match op {
            RingOp::FindSuccessor { target, hops } => self
                .find_successor(target, hops)
                .await
                .map(|(peer, hops)| RingReply::FoundSuccessor { peer, hops }),
            RingOp::Predecessor => self
                .ring
                .predecessor()
                .map(|peer| RingReply::Predecessor { peer }),
            RingOp::Successor => self.ring.successor().map(|peer| RingReply::Successor { peer }),
            RingOp::SuccessorList => self
                .ring
                .successors()
                .list()
                .map(|peers| RingReply::SuccessorList { peers }),
            RingOp::Notify { caller } => self.ring.notify(caller).map(|_| RingReply::Done),
            RingOp::AddKey { owner, key, value } => self
                .add_key(owner, key, value)
                .await
                .map(|_| RingReply::Done),
            RingOp::FindKey { owner, key } => self
                .storage
                .find_key(owner, key)
                .await
                .map(|value| RingReply::Value { value }),
            RingOp::StoreVersion { owner } => self
                .storage
                .version_of(owner)
                .await
                .map(|version| RingReply::StoreVersion { version }),
            RingOp::DeleteStore { owner } => self
                .storage
                .delete_store(owner)
                .await
                .map(|_| RingReply::Done),
            RingOp::ReplicateIn {
                owner,
                version,
                entries,
            } => self
                .storage
                .replicate_in(owner, version, entries)
                .await
                .map(|_| RingReply::Done),
            RingOp::Ping => Ok(RingReply::Pong),
            RingOp::Port => Ok(RingReply::Port {
                port: self.local().port,
            }),
        };
        outcome.unwrap_or_else(|e| RingReply::Error {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MemoryNetwork;

    fn node_at(id: u64) -> Arc<RingNode> {
        let net = MemoryNetwork::new();
        let peer = Peer::with_id(RingId::new(id), "127.0.0.1", 7700);
        let transport = net.transport(peer.id);
        RingNode::new(peer, Config::default(), transport)
    }

    #[tokio::test]
    async fn test_singleton_owns_everything() {
        let node = node_at(100);
        node.join(None).await.unwrap();
        let (owner, hops) = node.find_successor(RingId::new(7), 0).await.unwrap();
        assert_eq!(owner.id, node.id());
        assert_eq!(hops, 0);
        node.depart().await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_basics() {
        let node = node_at(100);
        node.join(None).await.unwrap();

        assert!(matches!(
            node.dispatch(RingOp::Ping).await,
            RingReply::Pong
        ));
        assert!(matches!(
            node.dispatch(RingOp::Predecessor).await,
            RingReply::Predecessor { peer: None }
        ));
        match node.dispatch(RingOp::Port).await {
            RingReply::Port { port } => assert_eq!(port, 7700),
            other => panic!("unexpected reply {other:?}"),
        }

        node.dispatch(RingOp::AddKey {
            owner: node.id(),
            key: RingId::new(7),
            value: b"x".to_vec(),
        })
        .await;
        match node
            .dispatch(RingOp::FindKey {
                owner: node.id(),
                key: RingId::new(7),
            })
            .await
        {
            RingReply::Value { value } => assert_eq!(value, Some(b"x".to_vec())),
            other => panic!("unexpected reply {other:?}"),
        }
        node.depart().await.unwrap();
    }
}
