//! The periodic tasks that keep a node's view of the ring honest:
//! successor stabilization, predecessor liveness, finger fixing, the
//! rejoin watchdog, and storage replication. Every iteration is
//! fail-soft: a failure is logged and the task sleeps on.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dht::in_arc_open;
use crate::error::Result;
use crate::node::RingNode;

/// Start the full task set. Each task sleeps its configured period,
/// runs one iteration, and exits promptly when the shutdown channel
/// flips, even mid-sleep.
pub fn spawn_all(node: Arc<RingNode>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let periods = node.config().periods.clone();
    vec![
        spawn_task(
            "stabilize-successors",
            Duration::from_millis(periods.stabilize_successors_ms),
            node.clone(),
            shutdown.clone(),
            |n| async move { stabilize_successors(&n).await },
        ),
        spawn_task(
            "stabilize-predecessor",
            Duration::from_millis(periods.stabilize_predecessor_ms),
            node.clone(),
            shutdown.clone(),
            |n| async move { stabilize_predecessor(&n).await },
        ),
        spawn_task(
            "fix-fingers",
            Duration::from_millis(periods.fix_fingers_ms),
            node.clone(),
            shutdown.clone(),
            |n| async move { fix_fingers(&n).await },
        ),
        spawn_task(
            "rejoin",
            Duration::from_millis(periods.rejoin_ms),
            node.clone(),
            shutdown.clone(),
            |n| async move { rejoin(&n).await },
        ),
        spawn_task(
            "replicate-storage",
            Duration::from_millis(periods.replicate_ms),
            node,
            shutdown,
            |n| async move { replicate_storage(&n).await },
        ),
    ]
}

fn spawn_task<F, Fut>(
    name: &'static str,
    period: Duration,
    node: Arc<RingNode>,
    mut shutdown: watch::Receiver<bool>,
    step: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<RingNode>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            {
                let sleep = Delay::new(period).fuse();
                let stop = shutdown.changed().fuse();
                pin_mut!(sleep, stop);
                select! {
                    _ = stop => break,
                    _ = sleep => {}
                }
            }
            if let Err(e) = step(node.clone()).await {
                tracing::warn!(task = name, error = %e, "maintenance iteration failed");
            }
        }
        tracing::debug!(task = name, "maintenance task stopped");
    })
}

/// Reconcile our successor view with the successor's own. Dead cache
/// entries are dropped along the way; on a ring of one the "successor"
/// is ourselves and the exchange collapses to local reads, which is
/// exactly how a founder picks up its first successor after somebody
/// notifies it.
pub async fn stabilize_successors(node: &Arc<RingNode>) -> Result<()> {
    let local = node.local().clone();

    let mut successor = None;
    for candidate in node.ring().successors().list()? {
        if node.client().ping(&candidate).await {
            successor = Some(candidate);
            break;
        }
        tracing::debug!(peer = %candidate, "successor unreachable, dropping");
        node.ring().remove(candidate.id)?;
    }
    let mut successor = successor.unwrap_or_else(|| local.clone());

    // Whoever our successor believes precedes it may sit between us and
    // it, and then is our better successor.
    let between = if successor.id == local.id {
        node.ring().predecessor()?
    } else {
        match node.client().predecessor(&successor).await {
            Ok(peer) => peer,
            Err(e) => {
                tracing::debug!(peer = %successor, error = %e, "predecessor query failed");
                None
            }
        }
    };
    if let Some(peer) = between {
        if peer.id != local.id && in_arc_open(peer.id, local.id, successor.id) {
            tracing::debug!(peer = %peer, "adopting closer successor");
            node.ring().successors().insert(peer.clone())?;
            node.ring().learn_peer(peer.clone())?;
            successor = peer;
        }
    }

    if successor.id == local.id {
        return Ok(());
    }

    if let Err(e) = node.client().notify(&successor, local.clone()).await {
        tracing::debug!(peer = %successor, error = %e, "notify failed");
    }

    // Pull the successor's own list and splice it behind the successor,
    // so losing it still leaves us its heirs.
    match node.client().successor_list(&successor).await {
        Ok(peers) => {
            let max = node.ring().successors().max();
            let mut merged = Vec::with_capacity(max);
            merged.push(successor.clone());
            merged.extend(peers.into_iter().take(max.saturating_sub(1)));
            node.ring().successors().replace(merged)?;
        }
        Err(e) => {
            tracing::debug!(peer = %successor, error = %e, "successor list refresh failed");
        }
    }
    Ok(())
}

/// Drop a predecessor that stopped answering; a Notify will bring the
/// next one. Keys that strayed outside the owned arc stay put until the
/// ring re-forms around a new predecessor.
pub async fn stabilize_predecessor(node: &Arc<RingNode>) -> Result<()> {
    let Some(predecessor) = node.ring().predecessor()? else {
        return Ok(());
    };
    if !node.client().ping(&predecessor).await {
        tracing::warn!(peer = %predecessor, "predecessor unreachable, clearing");
        node.ring().clear_predecessor()?;
    }
    Ok(())
}

/// Refresh one finger slot per iteration, round-robin. A failed lookup
/// leaves the slot as it was until the cursor comes around again.
pub async fn fix_fingers(node: &Arc<RingNode>) -> Result<()> {
    let (index, target) = node.ring().next_finger_target()?;
    match node.find_successor(target, 0).await {
        Ok((peer, _)) => node.ring().set_finger(index, peer)?,
        Err(e) => tracing::debug!(index, error = %e, "finger refresh failed"),
    }
    Ok(())
}

/// Watchdog for a collapsed view: no successors, no predecessor. A node
/// configured with a seed re-attaches through it; a founder just waits
/// to be found again.
pub async fn rejoin(node: &Arc<RingNode>) -> Result<()> {
    if !node.ring().needs_rejoin()? {
        return Ok(());
    }
    let Some(seed) = node.seed() else {
        return Ok(());
    };
    tracing::info!(seed = %seed, "ring view collapsed, rejoining");
    node.attach(&seed).await
}

/// Push our primary store at every listed successor: full seed for an
/// empty replica, a history delta for a lagging one, and a reset for a
/// replica claiming a version we never issued.
pub async fn replicate_storage(node: &Arc<RingNode>) -> Result<()> {
    let owner = node.id();
    let local_version = node.storage().version_of(owner).await?;
    for replica in node.ring().successors().list()? {
        let remote_version = match node.client().store_version(&replica, owner).await {
            Ok(version) => version,
            Err(e) => {
                tracing::debug!(replica = %replica, error = %e, "version probe failed");
                continue;
            }
        };
        if remote_version == local_version {
            continue;
        }
        let entries = if remote_version == 0 {
            node.storage().open(owner).await?.entries().await?
        } else if local_version < remote_version {
            tracing::warn!(
                replica = %replica,
                remote_version,
                local_version,
                "replica ahead of primary, resetting"
            );
            if let Err(e) = node.client().delete_store(&replica, owner).await {
                tracing::debug!(replica = %replica, error = %e, "replica reset failed");
                continue;
            }
            node.storage().open(owner).await?.entries().await?
        } else {
            node.storage().delta_since(owner, remote_version).await?
        };
        tracing::debug!(
            replica = %replica,
            entries = entries.len(),
            version = local_version,
            "shipping replication batch"
        );
        if let Err(e) = node
            .client()
            .replicate_in(&replica, owner, local_version, entries)
            .await
        {
            tracing::debug!(replica = %replica, error = %e, "replication batch dropped");
        }
    }
    Ok(())
}
