//! Outbound segment chunking/windowing and inbound reassembly (spec §4.B/C).
//! Grounded on `tsm_set_segmented_confirmed_service_received`,
//! `tsm_segmentack_received`, and `FillWindow`/`InWindow` in `tsm.c`; the
//! teacher's `stack::segments::Reassembler` (keyed `BTreeMap` per peer)
//! supplies the idiomatic shape, adapted to run synchronously instead of
//! behind an async task per spec §5.

use crate::address::PeerAddress;
use crate::error::AbortReason;
use crate::seq::{duplicate_in_window, in_window, SeqNum};
use std::collections::BTreeMap;

/// Split `body` into window-sized segments, each no larger than
/// `max_apdu - header_len`. Mirrors `bacnet_calc_transmittable_length` plus
/// the per-segment slicing the original does inline in
/// `tsm_set_segmented_confirmed_service_received`.
pub fn chunk_body(body: &[u8], max_apdu: usize, header_len: usize) -> Vec<&[u8]> {
    let segment_size = max_apdu.saturating_sub(header_len).max(1);
    if body.is_empty() {
        return vec![&body[0..0]];
    }
    body.chunks(segment_size).collect()
}

/// `FillWindow`: the inclusive range of segment indices to (re)send this
/// round, starting at `initial`, bounded by `window_size` and by the total
/// segment count.
pub fn fill_window(total_segments: usize, initial: SeqNum, window_size: u8) -> Vec<SeqNum> {
    let mut out = Vec::new();
    let mut seq = initial;
    for _ in 0..window_size {
        if seq.wrapping_diff(SeqNum(0)) as usize >= total_segments {
            break;
        }
        out.push(seq);
        seq = seq.next();
    }
    out
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SegmentAckOutcome {
    /// Ack advances the window; send the next batch starting after it.
    NewAck,
    /// Ack covers the last segment; the transaction is complete.
    FinalAck,
    /// Ack falls outside the outstanding window; ignore it.
    DuplicateAck,
}

/// `tsm_segmentack_received`: classify an inbound segment-ack against the
/// outstanding window of an outbound segmented transaction.
pub fn classify_segment_ack(
    acked_sequence_number: SeqNum,
    initial_sequence_number: SeqNum,
    window_size: u8,
    total_segments: usize,
) -> SegmentAckOutcome {
    if !in_window(acked_sequence_number, initial_sequence_number, window_size) {
        return SegmentAckOutcome::DuplicateAck;
    }
    let acked_index = acked_sequence_number.wrapping_diff(SeqNum(0)) as usize;
    if acked_index + 1 >= total_segments {
        SegmentAckOutcome::FinalAck
    } else {
        SegmentAckOutcome::NewAck
    }
}

/// Outcome of feeding one inbound segment to a [`ReassemblyTable`] entry.
#[derive(Debug)]
pub enum FeedResult {
    /// Already seen; caller should re-ack the current window, not re-store.
    Duplicate,
    /// Stored. `window_filled` tells the caller to send a positive ack now
    /// instead of waiting for the final segment.
    Accepted { window_filled: bool },
    /// The final segment arrived; the concatenated body is ready.
    Complete(Vec<u8>),
    /// The sender violated the window/sequencing contract; the whole
    /// transaction must be aborted.
    Rejected(AbortReason),
}

struct Reassembly {
    segments: BTreeMap<u8, Vec<u8>>,
    first_sequence_number: SeqNum,
    last_sequence_number: SeqNum,
    window_size: u8,
    received_count: u32,
}

/// Inbound reassembly buffers, one per (peer, invoke-id) in flight. Kept
/// separate from [`crate::transaction::Slot`] so the transaction table
/// doesn't need to know about segment bookkeeping, matching the teacher's
/// split between `FullStack` and its dedicated `Reassembler`.
#[derive(Default)]
pub struct ReassemblyTable {
    entries: std::collections::HashMap<(PeerAddress, u8), Reassembly>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        ReassemblyTable {
            entries: std::collections::HashMap::new(),
        }
    }

    pub fn abandon(&mut self, peer: &PeerAddress, invoke_id: u8) {
        self.entries.remove(&(*peer, invoke_id));
    }

    /// `tsm_set_segmented_confirmed_service_received`: fold one inbound
    /// segment into the reassembly buffer for `(peer, invoke_id)`.
    /// `max_segments_accepted` bounds how many segments this buffer will
    /// ever hold (spec §3 invariant 5); exceeding it aborts the transaction
    /// with `BUFFER_OVERFLOW` rather than growing without bound.
    pub fn feed_segment(
        &mut self,
        peer: PeerAddress,
        invoke_id: u8,
        sequence_number: SeqNum,
        proposed_window_size: u8,
        more_follows: bool,
        data: &[u8],
        max_segments_accepted: u8,
    ) -> FeedResult {
        let key = (peer, invoke_id);
        if !self.entries.contains_key(&key) {
            if sequence_number != SeqNum::ZERO {
                // First segment we've seen must be sequence zero; anything
                // else means we missed the start of the transaction.
                return FeedResult::Rejected(AbortReason::InvalidApduInThisState);
            }
            if proposed_window_size == 0 || proposed_window_size > 127 {
                return FeedResult::Rejected(AbortReason::WindowSizeOutOfRange);
            }
            let mut segments = BTreeMap::new();
            segments.insert(0u8, data.to_vec());
            self.entries.insert(
                key,
                Reassembly {
                    segments,
                    first_sequence_number: SeqNum::ZERO,
                    last_sequence_number: SeqNum::ZERO,
                    window_size: proposed_window_size,
                    received_count: 1,
                },
            );
            if more_follows {
                return FeedResult::Accepted {
                    window_filled: proposed_window_size == 1,
                };
            }
            return self.finish(&key);
        }

        let entry = self.entries.get_mut(&key).expect("just checked");
        if duplicate_in_window(
            sequence_number,
            entry.first_sequence_number,
            entry.last_sequence_number,
            entry.window_size,
        ) {
            return FeedResult::Duplicate;
        }
        if sequence_number != entry.last_sequence_number.next() {
            self.entries.remove(&key);
            return FeedResult::Rejected(AbortReason::InvalidApduInThisState);
        }
        entry.segments.insert(sequence_number.0, data.to_vec());
        entry.last_sequence_number = sequence_number;
        entry.received_count += 1;
        if entry.received_count > max_segments_accepted as u32 {
            self.entries.remove(&key);
            return FeedResult::Rejected(AbortReason::BufferOverflow);
        }

        if !more_follows {
            return self.finish(&key);
        }

        let entry = self.entries.get(&key).expect("just inserted");
        let received = entry
            .last_sequence_number
            .wrapping_diff(entry.first_sequence_number)
            + 1;
        FeedResult::Accepted {
            window_filled: received >= entry.window_size,
        }
    }

    fn finish(&mut self, key: &(PeerAddress, u8)) -> FeedResult {
        let entry = self.entries.remove(key).expect("caller checked presence");
        let mut body = Vec::new();
        for (_, chunk) in entry.segments.into_iter() {
            body.extend_from_slice(&chunk);
        }
        FeedResult::Complete(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_body_splits_on_segment_boundary() {
        let body = [0u8; 10];
        let chunks = chunk_body(&body, 8, 3);
        // max_apdu 8, header 3 -> 5 bytes per segment -> 2 segments of 5.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 5);
        assert_eq!(chunks[1].len(), 5);
    }

    #[test]
    fn fill_window_stops_at_total_segments() {
        let window = fill_window(3, SeqNum(0), 8);
        assert_eq!(window, vec![SeqNum(0), SeqNum(1), SeqNum(2)]);
    }

    #[test]
    fn classify_ack_detects_final_and_duplicate() {
        assert_eq!(
            classify_segment_ack(SeqNum(3), SeqNum(0), 8, 4),
            SegmentAckOutcome::FinalAck
        );
        assert_eq!(
            classify_segment_ack(SeqNum(1), SeqNum(0), 8, 4),
            SegmentAckOutcome::NewAck
        );
        assert_eq!(
            classify_segment_ack(SeqNum(20), SeqNum(0), 4, 30),
            SegmentAckOutcome::DuplicateAck
        );
    }

    #[test]
    fn reassembles_in_order_segments() {
        let mut table = ReassemblyTable::new();
        let peer = PeerAddress::local(&[1]);
        let r1 = table.feed_segment(peer, 5, SeqNum(0), 2, true, &[1, 2], 64);
        assert!(matches!(r1, FeedResult::Accepted { window_filled: false }));
        let r2 = table.feed_segment(peer, 5, SeqNum(1), 2, true, &[3, 4], 64);
        assert!(matches!(r2, FeedResult::Accepted { window_filled: true }));
        let r3 = table.feed_segment(peer, 5, SeqNum(2), 2, false, &[5], 64);
        match r3 {
            FeedResult::Complete(body) => assert_eq!(body, vec![1, 2, 3, 4, 5]),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_sequence_segment() {
        let mut table = ReassemblyTable::new();
        let peer = PeerAddress::local(&[2]);
        table.feed_segment(peer, 1, SeqNum(0), 4, true, &[1], 64);
        let r = table.feed_segment(peer, 1, SeqNum(2), 4, true, &[9], 64);
        assert!(matches!(
            r,
            FeedResult::Rejected(AbortReason::InvalidApduInThisState)
        ));
    }

    #[test]
    fn duplicate_segment_is_reported_not_stored_twice() {
        let mut table = ReassemblyTable::new();
        let peer = PeerAddress::local(&[3]);
        table.feed_segment(peer, 1, SeqNum(0), 4, true, &[1], 64);
        let r = table.feed_segment(peer, 1, SeqNum(0), 4, true, &[1], 64);
        assert!(matches!(r, FeedResult::Duplicate));
    }

    #[test]
    fn rejects_window_size_zero_or_over_127() {
        let mut table = ReassemblyTable::new();
        let peer = PeerAddress::local(&[4]);
        assert!(matches!(
            table.feed_segment(peer, 1, SeqNum(0), 0, true, &[1], 64),
            FeedResult::Rejected(AbortReason::WindowSizeOutOfRange)
        ));
        assert!(matches!(
            table.feed_segment(peer, 1, SeqNum(0), 128, true, &[1], 64),
            FeedResult::Rejected(AbortReason::WindowSizeOutOfRange)
        ));
    }

    #[test]
    fn rejects_once_max_segments_accepted_is_exceeded() {
        let mut table = ReassemblyTable::new();
        let peer = PeerAddress::local(&[5]);
        assert!(matches!(
            table.feed_segment(peer, 1, SeqNum(0), 8, true, &[1], 2),
            FeedResult::Accepted { .. }
        ));
        assert!(matches!(
            table.feed_segment(peer, 1, SeqNum(1), 8, true, &[2], 2),
            FeedResult::Accepted { .. }
        ));
        assert!(matches!(
            table.feed_segment(peer, 1, SeqNum(2), 8, true, &[3], 2),
            FeedResult::Rejected(AbortReason::BufferOverflow)
        ));
    }
}
