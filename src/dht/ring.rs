//! Per-node routing state and the local half of the lookup algorithm.
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use super::finger::FingerTable;
use super::peer::Peer;
use super::rid::in_arc_half_open;
use super::rid::in_arc_open;
use super::rid::RingId;
use super::successor::SuccessorList;
use crate::error::Error;
use crate::error::Result;

/// Everything a node believes about the ring around it: its
/// predecessor, its successor list, and its finger table. Each field
/// sits behind its own lock so a slow remote call in one code path never
/// blocks an unrelated neighbor update; lookups copy peers out before
/// going remote.
#[derive(Clone)]
pub struct RingState {
    local: Peer,
    predecessor: Arc<Mutex<Option<Peer>>>,
    successors: SuccessorList,
    finger: Arc<Mutex<FingerTable>>,
}

/// What the local lookup step decided. The remote continuation, when
/// there is one, is driven by the caller which owns the rpc client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupStep {
    /// The answer is known locally.
    Found(Peer),
    /// Ask this closer peer to continue the lookup.
    Forward(Peer),
}

impl RingState {
    pub fn new(local: Peer, successor_max: usize, finger_bits: usize) -> Self {
        // the id space is 64 bits wide, a larger table has nothing to point at
        let finger_bits = finger_bits.clamp(1, 64);
        let id = local.id;
        Self {
            local,
            predecessor: Arc::new(Mutex::new(None)),
            successors: SuccessorList::new(id, successor_max),
            finger: Arc::new(Mutex::new(FingerTable::new(id, finger_bits))),
        }
    }

    /// The peer record of this node.
    pub fn local(&self) -> &Peer {
        &self.local
    }

    pub fn predecessor(&self) -> Result<Option<Peer>> {
        Ok(self.lock_predecessor()?.clone())
    }

    pub fn clear_predecessor(&self) -> Result<()> {
        *self.lock_predecessor()? = None;
        Ok(())
    }

    /// The successor list.
    pub fn successors(&self) -> &SuccessorList {
        &self.successors
    }

    /// The believed immediate successor; a node that knows no other peer
    /// is its own successor.
    pub fn successor(&self) -> Result<Peer> {
        Ok(self.successors.first()?.unwrap_or_else(|| self.local.clone()))
    }

    /// One local step of `find_successor`. If the target hangs between
    /// us and our successor the answer is the successor; otherwise hand
    /// back the closest preceding finger for the caller to forward to.
    pub fn lookup_step(&self, target: RingId) -> Result<LookupStep> {
        let successor = self.successor()?;
        if in_arc_half_open(target, self.local.id, successor.id) {
            return Ok(LookupStep::Found(successor));
        }
        let next = self.lock_finger()?.closest_preceding(target);
        match next {
            Some(peer) if peer.id != self.local.id => Ok(LookupStep::Forward(peer)),
            // Nobody better is known; our successor is the best guess.
            _ => Ok(LookupStep::Found(successor)),
        }
    }

    /// Handle an unsolicited "I may be your predecessor" announcement.
    /// Returns whether the caller was adopted.
    pub fn notify(&self, caller: Peer) -> Result<bool> {
        if caller.id == self.local.id {
            return Ok(false);
        }
        let mut predecessor = self.lock_predecessor()?;
        let adopt = match &*predecessor {
            Some(current) => in_arc_open(caller.id, current.id, self.local.id),
            None => true,
        };
        if adopt {
            tracing::debug!(peer = %caller, "adopted predecessor");
            *predecessor = Some(caller);
        }
        Ok(adopt)
    }

    /// Record a peer in the finger table wherever it improves a slot.
    pub fn learn_peer(&self, peer: Peer) -> Result<()> {
        self.lock_finger()?.join(peer);
        Ok(())
    }

    /// Refresh one finger slot with a lookup result.
    pub fn set_finger(&self, index: usize, peer: Peer) -> Result<()> {
        self.lock_finger()?.set(index, peer);
        Ok(())
    }

    /// The next finger slot to refresh and the id it tracks.
    pub fn next_finger_target(&self) -> Result<(usize, RingId)> {
        Ok(self.lock_finger()?.next_fix_target())
    }

    /// Count of populated finger slots.
    pub fn finger_len(&self) -> Result<usize> {
        Ok(self.lock_finger()?.len())
    }

    /// Forget a peer that stopped answering. Purges it from the finger
    /// table, the successor list and the predecessor slot; an emptied
    /// successor list falls back to the nearest finger so the node keeps
    /// a way forward until stabilization rebuilds the list.
    pub fn remove(&self, id: RingId) -> Result<()> {
        {
            let mut predecessor = self.lock_predecessor()?;
            if predecessor.as_ref().map(|p| p.id) == Some(id) {
                *predecessor = None;
            }
        }
        let fallback = {
            let mut finger = self.lock_finger()?;
            finger.remove(id);
            finger.first()
        };
        self.successors.remove(id)?;
        if self.successors.is_empty()? {
            if let Some(peer) = fallback {
                self.successors.insert(peer)?;
            }
        }
        Ok(())
    }

    /// Whether this node's view of the ring has collapsed and only a
    /// fresh attach to the seed can recover it.
    pub fn needs_rejoin(&self) -> Result<bool> {
        Ok(self.successors.is_empty()? && self.lock_predecessor()?.is_none())
    }

    fn lock_predecessor(&self) -> Result<MutexGuard<Option<Peer>>> {
        self.predecessor.lock().map_err(|_| Error::StateLock)
    }

    fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::StateLock)
    }
}
