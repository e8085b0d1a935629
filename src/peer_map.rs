//! Component A, the peer-invoke map (`tsm_get_peer_id_data`/
//! `tsm_get_peer_id`/`tsm_clear_peer_id` in `tsm.c`): binds an inbound
//! segmented request's `(peer, peer-invoke-id)` -- the id the *peer* chose,
//! which two different peers may pick the same value for -- to a distinct,
//! locally-allocated invoke-id used to claim that request's
//! `SegmentedRequestServer` slot in [`crate::tsm::TransactionTable`].
//! Without this indirection, two peers reassembling at the same time under
//! the same wire invoke-id would collide in the transaction table, which
//! indexes slots by invoke-id alone.

use crate::address::PeerAddress;
use crate::tsm::TransactionTable;

/// A capacity-bounded map from `(peer, peer-invoke-id)` to a locally
/// allocated invoke-id. Matches `max_tsm_peers` from `StackConfig`: once
/// full, `resolve_or_create` refuses rather than evicting, mirroring the
/// original's fixed-size peer table returning no free entry
/// (`tsm_get_peer_id_data`'s `ix == MAX_TSM_PEERS` case).
pub struct PeerMap {
    capacity: usize,
    order: Vec<(PeerAddress, u8)>,
    entries: std::collections::HashMap<(PeerAddress, u8), u8>,
}

impl PeerMap {
    pub fn new(capacity: usize) -> Self {
        PeerMap {
            capacity: capacity.max(1),
            order: Vec::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    /// Lookup-only: the local invoke-id already bound to this
    /// `(peer, peer_invoke_id)` pair, if any.
    pub fn resolve(&self, peer: &PeerAddress, peer_invoke_id: u8) -> Option<u8> {
        self.entries.get(&(*peer, peer_invoke_id)).copied()
    }

    /// Bind `(peer, peer_invoke_id)` to a freshly allocated local invoke-id
    /// claimed from `tsm`'s cursor, or return the existing binding if this
    /// is a retransmitted first segment. `None` means either this table or
    /// `tsm` is full; the caller must Abort
    /// `PREEMPTED_BY_HIGHER_PRIORITY_TASK` (spec §4.A) rather than proceed.
    pub fn resolve_or_create(
        &mut self,
        peer: PeerAddress,
        peer_invoke_id: u8,
        tsm: &mut TransactionTable,
    ) -> Option<u8> {
        let key = (peer, peer_invoke_id);
        if let Some(&existing) = self.entries.get(&key) {
            return Some(existing);
        }
        if self.order.len() >= self.capacity {
            return None;
        }
        let local_invoke_id = tsm.next_free_invoke_id().ok()?;
        self.order.push(key);
        self.entries.insert(key, local_invoke_id);
        Some(local_invoke_id)
    }

    /// `tsm_clear_peer_id`: unbind whichever entry was bound to this local
    /// invoke-id. A no-op if none matches (e.g. `invoke_id` belongs to an
    /// outbound transaction, which never has a peer-map entry).
    pub fn clear(&mut self, local_invoke_id: u8) {
        let key = self
            .entries
            .iter()
            .find(|(_, &v)| v == local_invoke_id)
            .map(|(k, _)| *k);
        if let Some(key) = key {
            self.entries.remove(&key);
            self.order.retain(|k| *k != key);
        }
    }

    /// All `(local_invoke_id, peer_invoke_id)` bindings currently held for
    /// `peer`. Used by `Stack::forget_peer` to release every in-flight
    /// inbound reassembly for a peer at once.
    pub fn entries_for(&self, peer: &PeerAddress) -> Vec<(u8, u8)> {
        self.entries
            .iter()
            .filter(|((p, _), _)| p == peer)
            .map(|((_, peer_invoke_id), &local_invoke_id)| (local_invoke_id, *peer_invoke_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_or_create_is_idempotent() {
        let mut tsm = TransactionTable::new(4);
        let mut map = PeerMap::new(2);
        let peer = PeerAddress::local(&[1, 2, 3]);
        let first = map.resolve_or_create(peer, 9, &mut tsm).unwrap();
        let second = map.resolve_or_create(peer, 9, &mut tsm).unwrap();
        assert_eq!(first, second);
        assert_eq!(map.resolve(&peer, 9), Some(first));
    }

    #[test]
    fn refuses_rather_than_evicting_when_full() {
        let mut tsm = TransactionTable::new(8);
        let mut map = PeerMap::new(2);
        let a = PeerAddress::local(&[1]);
        let b = PeerAddress::local(&[2]);
        let c = PeerAddress::local(&[3]);
        assert!(map.resolve_or_create(a, 1, &mut tsm).is_some());
        assert!(map.resolve_or_create(b, 1, &mut tsm).is_some());
        assert!(map.resolve_or_create(c, 1, &mut tsm).is_none());
        assert!(map.resolve(&a, 1).is_some());
        assert!(map.resolve(&b, 1).is_some());
        assert!(map.resolve(&c, 1).is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn clear_removes_entry_by_local_invoke_id() {
        let mut tsm = TransactionTable::new(4);
        let mut map = PeerMap::new(2);
        let peer = PeerAddress::local(&[9]);
        let local_invoke_id = map.resolve_or_create(peer, 5, &mut tsm).unwrap();
        map.clear(local_invoke_id);
        assert!(map.resolve(&peer, 5).is_none());
        assert!(map.is_empty());
    }
}
