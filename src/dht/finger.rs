//! Finger table of the ring.
use super::peer::Peer;
use super::rid::in_arc_open;
use super::rid::RingId;

/// Per-node cache of `find_successor(self + 2^i)` hints. The table only
/// accelerates lookup; a stale entry never breaks correctness, it just
/// costs hops until the fixing task refreshes it.
#[derive(Debug, Clone)]
pub struct FingerTable {
    owner: RingId,
    size: usize,
    slots: Vec<Option<Peer>>,
    fix_index: usize,
}

impl FingerTable {
    /// builder
    pub fn new(owner: RingId, size: usize) -> Self {
        Self {
            owner,
            size,
            slots: vec![None; size],
            fix_index: 0,
        }
    }

    /// Count of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<Peer> {
        self.slots.get(index).cloned().flatten()
    }

    /// First populated entry, scanning from slot 0.
    pub fn first(&self) -> Option<Peer> {
        self.slots.iter().flatten().next().cloned()
    }

    /// Farthest populated entry.
    pub fn farthest(&self) -> Option<Peer> {
        self.slots.iter().rev().flatten().next().cloned()
    }

    /// setter; the owner itself is never cached.
    pub fn set(&mut self, index: usize, peer: Peer) {
        if index >= self.size {
            tracing::error!(index, "finger index out of range");
            return;
        }
        if peer.id == self.owner {
            return;
        }
        tracing::debug!(index, peer = %peer, "set finger entry");
        self.slots[index] = Some(peer);
    }

    /// Fill every slot the peer is a valid hint for: slot i wants the
    /// successor of `owner + 2^i`, so the peer qualifies when it is at
    /// least 2^i away and no known entry is closer.
    pub fn join(&mut self, peer: Peer) {
        if peer.id == self.owner {
            return;
        }
        let dist = peer.id.distance_from(self.owner);
        for i in 0..self.size as u32 {
            if dist < (1u64 << i) {
                break;
            }
            if let Some(existing) = &self.slots[i as usize] {
                if existing.id.distance_from(self.owner) < dist {
                    continue;
                }
            }
            self.slots[i as usize] = Some(peer.clone());
        }
    }

    /// Drop a peer from every slot it occupies, forward-filling the gap
    /// with the next farther entry when one exists.
    pub fn remove(&mut self, id: RingId) {
        let occupied: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().map(|p| p.id) == Some(id))
            .map(|(i, _)| i)
            .collect();
        let (Some(&first), Some(&last)) = (occupied.first(), occupied.last()) else {
            return;
        };
        let fill = self.slots.get(last + 1).cloned().flatten();
        for slot in &mut self.slots[first..=last] {
            *slot = fill.clone();
        }
    }

    /// Closest known node strictly preceding `target`, per the
    /// highest-slot-first scan. Falls back to the farthest known entry so
    /// a lookup can always advance somewhere.
    pub fn closest_preceding(&self, target: RingId) -> Option<Peer> {
        for slot in self.slots.iter().rev() {
            if let Some(peer) = slot {
                if in_arc_open(peer.id, self.owner, target) {
                    return Some(peer.clone());
                }
            }
        }
        self.farthest()
    }

    /// Advance the round-robin fix cursor and return the slot to refresh
    /// next along with the id it should track.
    pub fn next_fix_target(&mut self) -> (usize, RingId) {
        self.fix_index = (self.fix_index + 1) % self.size;
        (self.fix_index, self.owner.step(self.fix_index as u32))
    }

    /// Whether some entry points at `id`.
    pub fn contains(&self, id: RingId) -> bool {
        self.slots.iter().flatten().any(|p| p.id == id)
    }
}
