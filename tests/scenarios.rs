//! End-to-end ring behavior over the in-process transport: rings of one
//! and two, replication, successor failure, wrapped lookups, and
//! recovery from a partition. Nodes run with short maintenance periods
//! and every assertion polls with a generous deadline.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use ringkv::config::Config;
use ringkv::dht::Peer;
use ringkv::dht::RingId;
use ringkv::node::RingNode;
use ringkv::rpc::MemoryNetwork;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.periods.stabilize_successors_ms = 50;
    config.periods.stabilize_predecessor_ms = 50;
    config.periods.fix_fingers_ms = 50;
    config.periods.rejoin_ms = 150;
    config.periods.replicate_ms = 100;
    config
}

async fn start_node(
    net: &Arc<MemoryNetwork>,
    id: u64,
    seed: Option<&Arc<RingNode>>,
) -> Arc<RingNode> {
    start_node_with(net, id, seed, fast_config()).await
}

async fn start_node_with(
    net: &Arc<MemoryNetwork>,
    id: u64,
    seed: Option<&Arc<RingNode>>,
    config: Config,
) -> Arc<RingNode> {
    let peer = Peer::with_id(RingId::new(id), "127.0.0.1", 7700 + (id % 1000) as u16);
    let node = RingNode::new(peer.clone(), config, net.transport(peer.id));
    net.register(peer.id, node.clone());
    node.join(seed.map(|s| s.local().clone()))
        .await
        .expect("join failed");
    node
}

async fn eventually<F, Fut>(what: &str, cond: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if cond().await {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn successor_id(node: &Arc<RingNode>) -> u64 {
    node.ring().successor().unwrap().id.value()
}

fn predecessor_id(node: &Arc<RingNode>) -> Option<u64> {
    node.ring().predecessor().unwrap().map(|p| p.id.value())
}

async fn ring_is_pair(a: &Arc<RingNode>, b: &Arc<RingNode>) -> bool {
    successor_id(a) == b.id().value()
        && successor_id(b) == a.id().value()
        && predecessor_id(a) == Some(b.id().value())
        && predecessor_id(b) == Some(a.id().value())
}

#[tokio::test]
async fn ring_of_one_owns_every_key() {
    let net = MemoryNetwork::new();
    let node = start_node(&net, 100, None).await;

    assert_eq!(successor_id(&node), 100);
    assert_eq!(predecessor_id(&node), None);

    node.put(RingId::new(7), b"x".to_vec()).await.unwrap();
    assert_eq!(node.get(RingId::new(7)).await, Some(b"x".to_vec()));
    assert_eq!(
        node.storage().version_of(node.id()).await.unwrap(),
        1
    );

    node.depart().await.unwrap();
}

#[tokio::test]
async fn two_nodes_stabilize_into_a_ring() {
    let net = MemoryNetwork::new();
    let a = start_node(&net, 100, None).await;
    let b = start_node(&net, 200, Some(&a)).await;

    eventually("mutual successor/predecessor pointers", || {
        let (a, b) = (a.clone(), b.clone());
        async move { ring_is_pair(&a, &b).await }
    })
    .await;

    let (owner, _) = a.find_successor(RingId::new(150), 0).await.unwrap();
    assert_eq!(owner.id.value(), 200);
    let (owner, _) = a.find_successor(RingId::new(50), 0).await.unwrap();
    assert_eq!(owner.id.value(), 100);
    // lookups are stable while the ring is quiet
    let (again, _) = a.find_successor(RingId::new(150), 0).await.unwrap();
    assert_eq!(again.id.value(), 200);

    a.depart().await.unwrap();
    b.depart().await.unwrap();
}

#[tokio::test]
async fn writes_route_to_the_owner_and_replicate_back() {
    let net = MemoryNetwork::new();
    let a = start_node(&net, 100, None).await;
    let b = start_node(&net, 200, Some(&a)).await;
    eventually("ring formed", || {
        let (a, b) = (a.clone(), b.clone());
        async move { ring_is_pair(&a, &b).await }
    })
    .await;

    // 150 sits in (100, 200], so node 200 owns it
    a.put(RingId::new(150), b"v".to_vec()).await.unwrap();
    assert_eq!(
        b.storage()
            .find_key(b.id(), RingId::new(150))
            .await
            .unwrap(),
        Some(b"v".to_vec())
    );

    // node 100 is a successor of 200, so it ends up holding a replica of
    // 200's store
    eventually("replica of the owner's store on its successor", || {
        let (a, b) = (a.clone(), b.clone());
        async move {
            a.storage()
                .find_key(b.id(), RingId::new(150))
                .await
                .unwrap()
                == Some(b"v".to_vec())
        }
    })
    .await;

    // reading through either node resolves to the same value
    assert_eq!(a.get(RingId::new(150)).await, Some(b"v".to_vec()));
    assert_eq!(b.get(RingId::new(150)).await, Some(b"v".to_vec()));

    a.depart().await.unwrap();
    b.depart().await.unwrap();
}

#[tokio::test]
async fn successor_failure_promotes_the_next_and_keeps_replicas_readable() {
    let net = MemoryNetwork::new();
    let mut config = fast_config();
    config.ring.successor_list_max = 2;

    let n10 = start_node_with(&net, 10, None, config.clone()).await;
    let n20 = start_node_with(&net, 20, Some(&n10), config.clone()).await;
    let n30 = start_node_with(&net, 30, Some(&n10), config.clone()).await;

    // wait for full successor lists, not just first pointers: losing
    // node 20 must leave node 10 with node 30 already cached
    eventually("three-node ring closed with full lists", || {
        let (n10, n20, n30) = (n10.clone(), n20.clone(), n30.clone());
        async move {
            let ids = |n: &Arc<RingNode>| -> Vec<u64> {
                n.ring()
                    .successors()
                    .list()
                    .unwrap()
                    .into_iter()
                    .map(|p| p.id.value())
                    .collect()
            };
            ids(&n10) == vec![20, 30] && ids(&n20) == vec![30, 10] && ids(&n30) == vec![10, 20]
        }
    })
    .await;

    // 15 sits in (10, 20], so node 20 owns it; its replicas land on
    // nodes 30 and 10
    n10.put(RingId::new(15), b"held".to_vec()).await.unwrap();
    eventually("replica of node 20's store on node 10", || {
        let (n10, n20) = (n10.clone(), n20.clone());
        async move {
            n10.storage()
                .find_key(n20.id(), RingId::new(15))
                .await
                .unwrap()
                .is_some()
        }
    })
    .await;

    // node 20 goes down
    n20.depart().await.unwrap();
    net.set_offline(n20.id(), true);

    eventually("node 10 promotes node 30", || {
        let n10 = n10.clone();
        async move { successor_id(&n10) == 30 }
    })
    .await;

    // the replica node 10 held for node 20 stays readable
    assert_eq!(
        n10.storage()
            .find_key(n20.id(), RingId::new(15))
            .await
            .unwrap(),
        Some(b"held".to_vec())
    );

    n10.depart().await.unwrap();
    n30.depart().await.unwrap();
}

#[tokio::test]
async fn lookups_wrap_across_zero() {
    let net = MemoryNetwork::new();
    let high = start_node(&net, 250, None).await;
    let low = start_node(&net, 10, Some(&high)).await;

    eventually("two-node ring closed", || {
        let (high, low) = (high.clone(), low.clone());
        async move { ring_is_pair(&high, &low).await }
    })
    .await;

    // 5 lies in (250, 10], crossing zero, so the low node owns it
    let (owner, _) = high.find_successor(RingId::new(5), 0).await.unwrap();
    assert_eq!(owner.id.value(), 10);

    high.depart().await.unwrap();
    low.depart().await.unwrap();
}

#[tokio::test]
async fn partitioned_node_rejoins_through_its_seed() {
    let net = MemoryNetwork::new();
    let seed = start_node(&net, 100, None).await;
    let node = start_node(&net, 200, Some(&seed)).await;

    eventually("ring formed", || {
        let (seed, node) = (seed.clone(), node.clone());
        async move { ring_is_pair(&seed, &node).await }
    })
    .await;

    // cut the node off; its view of the ring collapses
    net.set_offline(node.id(), true);
    eventually("node view collapsed", || {
        let node = node.clone();
        async move { node.ring().needs_rejoin().unwrap() }
    })
    .await;

    // heal the network; the watchdog re-attaches through the seed
    net.set_offline(node.id(), false);
    eventually("ring re-formed after partition", || {
        let (seed, node) = (seed.clone(), node.clone());
        async move { ring_is_pair(&seed, &node).await }
    })
    .await;

    seed.depart().await.unwrap();
    node.depart().await.unwrap();
}
