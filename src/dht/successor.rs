//! Successor list of the ring.
use std::sync::Arc;
use std::sync::RwLock;

use super::peer::Peer;
use super::rid::RingId;
use super::rid::SortClockwise;
use crate::error::Error;
use crate::error::Result;

/// The short list of consecutive successors a node keeps so that losing
/// one neighbor never severs the ring. Entry 0 is the immediate
/// successor; entries stay pairwise distinct and clockwise-ordered.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    owner: RingId,
    max: usize,
    entries: Arc<RwLock<Vec<Peer>>>,
}

impl SuccessorList {
    pub fn new(owner: RingId, max: usize) -> Self {
        Self {
            owner,
            max,
            entries: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Capacity of the list.
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// The believed immediate successor, if any remote one is known.
    pub fn first(&self) -> Result<Option<Peer>> {
        Ok(self.read()?.first().cloned())
    }

    pub fn list(&self) -> Result<Vec<Peer>> {
        Ok(self.read()?.clone())
    }

    pub fn contains(&self, id: RingId) -> Result<bool> {
        Ok(self.read()?.iter().any(|p| p.id == id))
    }

    /// Offer a candidate. The list keeps the `max` closest distinct
    /// peers clockwise from the owner, so a farther candidate simply
    /// drops off the tail of a full list.
    pub fn insert(&self, candidate: Peer) -> Result<()> {
        if candidate.id == self.owner {
            return Ok(());
        }
        let mut entries = self.write()?;
        if entries.iter().any(|p| p.id == candidate.id) {
            return Ok(());
        }
        entries.push(candidate);
        entries.sort_clockwise(self.owner);
        entries.truncate(self.max);
        Ok(())
    }

    /// Offer several candidates.
    pub fn extend(&self, candidates: &[Peer]) -> Result<()> {
        for c in candidates {
            self.insert(c.clone())?;
        }
        Ok(())
    }

    /// Swap in a freshly assembled view, deduped, self-free, clockwise,
    /// truncated to capacity.
    pub fn replace(&self, candidates: Vec<Peer>) -> Result<()> {
        let mut next: Vec<Peer> = vec![];
        for c in candidates {
            if c.id == self.owner || next.iter().any(|p| p.id == c.id) {
                continue;
            }
            next.push(c);
        }
        next.sort_clockwise(self.owner);
        next.truncate(self.max);
        *self.write()? = next;
        Ok(())
    }

    pub fn remove(&self, id: RingId) -> Result<()> {
        self.write()?.retain(|p| p.id != id);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<Vec<Peer>>> {
        self.entries.read().map_err(|_| Error::StateLock)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<Vec<Peer>>> {
        self.entries.write().map_err(|_| Error::StateLock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::tests::peer_at;

    #[test]
    fn test_insert_keeps_clockwise_order() {
        let list = SuccessorList::new(RingId::new(100), 3);
        assert!(list.is_empty().unwrap());

        list.insert(peer_at(300)).unwrap();
        list.insert(peer_at(150)).unwrap();
        list.insert(peer_at(50)).unwrap(); // wraps, farthest from 100
        let ids: Vec<u64> = list
            .list()
            .unwrap()
            .into_iter()
            .map(|p| p.id.value())
            .collect();
        assert_eq!(ids, vec![150, 300, 50]);

        // full list: a closer candidate evicts the farthest
        list.insert(peer_at(200)).unwrap();
        let ids: Vec<u64> = list
            .list()
            .unwrap()
            .into_iter()
            .map(|p| p.id.value())
            .collect();
        assert_eq!(ids, vec![150, 200, 300]);

        // a farther candidate is dropped
        list.insert(peer_at(40)).unwrap();
        assert_eq!(list.len().unwrap(), 3);
        assert!(!list.contains(RingId::new(40)).unwrap());
    }

    #[test]
    fn test_insert_ignores_self_and_duplicates() {
        let list = SuccessorList::new(RingId::new(100), 3);
        list.insert(peer_at(100)).unwrap();
        assert!(list.is_empty().unwrap());

        list.insert(peer_at(150)).unwrap();
        list.insert(peer_at(150)).unwrap();
        assert_eq!(list.len().unwrap(), 1);
    }

    #[test]
    fn test_replace_and_remove() {
        let list = SuccessorList::new(RingId::new(100), 2);
        list.extend(&[peer_at(150), peer_at(200)]).unwrap();

        list.replace(vec![peer_at(300), peer_at(100), peer_at(250), peer_at(300)])
            .unwrap();
        let ids: Vec<u64> = list
            .list()
            .unwrap()
            .into_iter()
            .map(|p| p.id.value())
            .collect();
        assert_eq!(ids, vec![250, 300]);

        list.remove(RingId::new(250)).unwrap();
        assert_eq!(list.first().unwrap().map(|p| p.id.value()), Some(300));
        list.remove(RingId::new(300)).unwrap();
        assert!(list.is_empty().unwrap());
    }
}
