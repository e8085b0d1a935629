//! The invoke-id allocation table and its per-millisecond timer sweep
//! (`tsm.c`'s `tsm_*` free functions, minus the segmentation-specific parts
//! that live in [`crate::segmentation`]).

use crate::address::PeerAddress;
use crate::transaction::{ApduHeaderParams, NpduParams, Slot, SlotState};

/// What the timer sweep wants done for a slot this tick. The caller (the
/// top-level `Stack`) is the one with a `PduSender`, so the table only
/// reports intent.
#[derive(Clone, Debug)]
pub enum TimerAction {
    Resend { peer: PeerAddress, pdu: Vec<u8> },
    /// An `AwaitConfirmation` slot exhausted its retries: no PDU goes out
    /// (the original never calls `abort_pdu_send` on this path, only
    /// `Timeout_Function`), the caller's registered
    /// [`crate::registry::TimeoutHandler`] is notified once with the
    /// invoke-id, and the slot is freed.
    Timeout { invoke_id: u8 },
    /// A stalled inbound segmented request, or a segmented response that
    /// exhausted its segment-ack retries, was silently dropped: no PDU is
    /// sent and no callback fires, matching the original's
    /// `SEGMENTED_REQUEST_SERVER`/`SEGMENTED_RESPONSE_SERVER` timeout paths.
    /// `peer`/`peer_invoke_id` let the caller also release any inbound
    /// reassembly/peer-invoke-map state keyed off the wire invoke-id; they
    /// are zeroed for the response-server case, which has none.
    SilentlyDropped {
        invoke_id: u8,
        peer: PeerAddress,
        peer_invoke_id: u8,
    },
}

#[derive(Copy, Clone, Debug)]
pub enum TsmError {
    NoFreeInvokeId,
    NoFreeTransaction,
    UnknownInvokeId,
    WrongState,
}

/// `tsm_next_free_invokeID`'s cursor plus the fixed-size slot table.
pub struct TransactionTable {
    slots: Vec<Slot>,
    cursor: u8,
    /// `id -> true` iff the most recently completed transaction on that
    /// invoke-id ended in failure; consulted by `invoke_id_failed` after
    /// the slot has already gone back to `Idle`.
    last_failed: std::collections::HashMap<u8, bool>,
}

impl TransactionTable {
    pub fn new(max_transactions: usize) -> Self {
        let slots = (0..max_transactions)
            .map(|i| Slot::idle((i + 1) as u8))
            .collect();
        TransactionTable {
            slots,
            cursor: 0,
            last_failed: std::collections::HashMap::new(),
        }
    }

    pub fn find_invoke_id_index(&self, invoke_id: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| !s.is_idle() && s.invoke_id == invoke_id)
    }

    fn find_first_free_index(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_idle())
    }

    /// `tsm_transaction_available`.
    pub fn transaction_available(&self) -> bool {
        self.slots.iter().any(|s| s.is_idle())
    }

    /// `tsm_transaction_idle_count`.
    pub fn transaction_idle_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_idle()).count()
    }

    /// `tsm_next_free_invokeID`: advance a cursor over the 1..=255 space
    /// (0 is reserved, matching the original), wrapping around, until an
    /// id with a free slot is found.
    pub fn next_free_invoke_id(&mut self) -> Result<u8, TsmError> {
        if !self.transaction_available() {
            return Err(TsmError::NoFreeTransaction);
        }
        for _ in 0..255u16 {
            self.cursor = if self.cursor == 255 { 1 } else { self.cursor + 1 };
            if self.cursor == 0 {
                continue;
            }
            if self.find_invoke_id_index(self.cursor).is_none() {
                return Ok(self.cursor);
            }
        }
        Err(TsmError::NoFreeInvokeId)
    }

    /// `tsm_set_confirmed_unsegmented_transaction`: claim a slot for an
    /// outbound confirmed request we are about to (re)send.
    pub fn set_confirmed_unsegmented_transaction(
        &mut self,
        invoke_id: u8,
        peer: PeerAddress,
        npdu: NpduParams,
        apdu_header: ApduHeaderParams,
        blob: Vec<u8>,
        timeout_ms: u32,
    ) -> Result<(), TsmError> {
        let idx = self.find_first_free_index().ok_or(TsmError::NoFreeTransaction)?;
        let slot = &mut self.slots[idx];
        slot.invoke_id = invoke_id;
        slot.state = SlotState::AwaitConfirmation;
        slot.peer = peer;
        slot.npdu = npdu;
        slot.apdu_header = apdu_header;
        slot.blob = blob;
        slot.request_timer_ms = timeout_ms;
        slot.retry_count = 0;
        self.last_failed.remove(&invoke_id);
        Ok(())
    }

    /// `tsm_set_complexack_transaction`'s segmented branch: claim a slot to
    /// track an outbound segmented response while we wait for the client's
    /// segment-acks to advance the window.
    pub fn set_segmented_response(
        &mut self,
        invoke_id: u8,
        peer: PeerAddress,
        service_choice: u8,
        body: Vec<u8>,
        window_size: u8,
        segment_timeout_ms: u32,
    ) -> Result<(), TsmError> {
        let idx = self.find_first_free_index().ok_or(TsmError::NoFreeTransaction)?;
        let slot = &mut self.slots[idx];
        slot.invoke_id = invoke_id;
        slot.state = SlotState::SegmentedResponseServer;
        slot.peer = peer;
        slot.npdu = NpduParams::default();
        slot.apdu_header = ApduHeaderParams {
            service_choice,
            max_segs_max_resp: 0,
            segmented_response_accepted: false,
        };
        slot.blob = body;
        slot.proposed_window_size = window_size;
        slot.initial_sequence_number = crate::seq::SeqNum::ZERO;
        slot.last_sequence_number = crate::seq::SeqNum::ZERO;
        slot.segment_timer_ms = segment_timeout_ms;
        slot.segment_retry_count = 0;
        self.last_failed.remove(&invoke_id);
        Ok(())
    }

    /// Claim a slot for an inbound segmented-request reassembly in progress
    /// (the `SEGMENTED_REQUEST_SERVER` branch of `tsm_get_peer_id_data`
    /// creating an entry): `invoke_id` is the locally-allocated id the
    /// peer-invoke map bound to `(peer, peer_invoke_id)`, not the wire
    /// invoke-id the peer sent. Ticked by the same `timer_milliseconds`
    /// sweep as everything else, so a stalled sender is abandoned instead
    /// of leaking forever.
    pub fn set_segmented_request_server(
        &mut self,
        invoke_id: u8,
        peer: PeerAddress,
        peer_invoke_id: u8,
        segment_timeout_ms: u32,
    ) -> Result<(), TsmError> {
        let idx = self.find_first_free_index().ok_or(TsmError::NoFreeTransaction)?;
        let slot = &mut self.slots[idx];
        slot.invoke_id = invoke_id;
        slot.state = SlotState::SegmentedRequestServer;
        slot.peer = peer;
        slot.peer_invoke_id = peer_invoke_id;
        slot.npdu = NpduParams::default();
        slot.blob.clear();
        slot.request_timer_ms = segment_timeout_ms;
        self.last_failed.remove(&invoke_id);
        Ok(())
    }

    /// `tsm_get_transaction_pdu`: the stored APDU body for a retransmit.
    pub fn get_transaction_pdu(&self, invoke_id: u8) -> Option<(&PeerAddress, &[u8])> {
        let idx = self.find_invoke_id_index(invoke_id)?;
        let slot = &self.slots[idx];
        Some((&slot.peer, slot.blob.as_slice()))
    }

    pub fn slot(&self, invoke_id: u8) -> Option<&Slot> {
        self.find_invoke_id_index(invoke_id).map(|i| &self.slots[i])
    }

    pub fn slot_mut(&mut self, invoke_id: u8) -> Option<&mut Slot> {
        let idx = self.find_invoke_id_index(invoke_id)?;
        Some(&mut self.slots[idx])
    }

    fn free_with_outcome(&mut self, invoke_id: u8, failed: bool) {
        if let Some(idx) = self.find_invoke_id_index(invoke_id) {
            self.slots[idx].clear();
        }
        self.last_failed.insert(invoke_id, failed);
    }

    /// `tsm_free_invoke_id`: transaction completed normally.
    pub fn free_invoke_id(&mut self, invoke_id: u8) {
        self.free_with_outcome(invoke_id, false);
    }

    /// `tsm_free_invoke_id_check` / `tsm_invoke_id_failed`'s write side:
    /// transaction completed (or was abandoned) unsuccessfully.
    pub fn free_invoke_id_failed(&mut self, invoke_id: u8) {
        self.free_with_outcome(invoke_id, true);
    }

    /// `tsm_invoke_id_free`: true once the slot has gone back to idle.
    pub fn invoke_id_free(&self, invoke_id: u8) -> bool {
        self.find_invoke_id_index(invoke_id).is_none()
    }

    /// `tsm_invoke_id_failed`: true iff the invoke-id is free *and* the last
    /// transaction that used it did not complete successfully.
    pub fn invoke_id_failed(&self, invoke_id: u8) -> bool {
        self.invoke_id_free(invoke_id) && *self.last_failed.get(&invoke_id).unwrap_or(&false)
    }

    /// `tsm_timer_milliseconds`: advance every live slot's timers by
    /// `elapsed_ms` and report what each expired slot needs done next.
    /// Segmented-transaction specifics (window re-send, give-up thresholds
    /// beyond plain retry count) are driven by [`crate::segmentation`]
    /// calling back into this table; this sweep only handles the
    /// unsegmented `AwaitConfirmation` retry/timeout path and the silent
    /// drop of a stalled `SegmentedRequestServer`.
    pub fn timer_milliseconds(&mut self, elapsed_ms: u32, retries: u8, timeout_ms: u32) -> Vec<TimerAction> {
        let mut actions = Vec::new();
        let mut to_fail = Vec::new();
        for slot in self.slots.iter_mut() {
            match slot.state {
                SlotState::Idle => continue,
                SlotState::AwaitConfirmation => {
                    if slot.request_timer_ms > elapsed_ms {
                        slot.request_timer_ms -= elapsed_ms;
                        continue;
                    }
                    if slot.retry_count < retries {
                        slot.retry_count += 1;
                        slot.request_timer_ms = timeout_ms;
                        actions.push(TimerAction::Resend {
                            peer: slot.peer,
                            pdu: slot.blob.clone(),
                        });
                    } else {
                        actions.push(TimerAction::Timeout {
                            invoke_id: slot.invoke_id,
                        });
                        to_fail.push(slot.invoke_id);
                    }
                }
                SlotState::SegmentedRequestServer => {
                    if slot.request_timer_ms > elapsed_ms {
                        slot.request_timer_ms -= elapsed_ms;
                        continue;
                    }
                    actions.push(TimerAction::SilentlyDropped {
                        invoke_id: slot.invoke_id,
                        peer: slot.peer,
                        peer_invoke_id: slot.peer_invoke_id,
                    });
                    to_fail.push(slot.invoke_id);
                }
                SlotState::SegmentedResponseServer => {
                    if slot.segment_timer_ms > elapsed_ms {
                        slot.segment_timer_ms -= elapsed_ms;
                        continue;
                    }
                    if slot.segment_retry_count < retries {
                        slot.segment_retry_count += 1;
                        slot.segment_timer_ms = timeout_ms;
                        actions.push(TimerAction::Resend {
                            peer: slot.peer,
                            pdu: slot.blob.clone(),
                        });
                    } else {
                        actions.push(TimerAction::SilentlyDropped {
                            invoke_id: slot.invoke_id,
                            peer: slot.peer,
                            peer_invoke_id: 0,
                        });
                        to_fail.push(slot.invoke_id);
                    }
                }
            }
        }
        for id in to_fail {
            self.free_invoke_id_failed(id);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ApduHeaderParams {
        ApduHeaderParams {
            service_choice: 14,
            max_segs_max_resp: 0,
            segmented_response_accepted: true,
        }
    }

    #[test]
    fn allocates_skipping_zero_and_wraps() {
        let mut table = TransactionTable::new(4);
        table.cursor = 254;
        let first = table.next_free_invoke_id().unwrap();
        assert_eq!(first, 255);
        let second = table.next_free_invoke_id().unwrap();
        assert_eq!(second, 1);
    }

    #[test]
    fn refuses_when_all_slots_busy() {
        let mut table = TransactionTable::new(1);
        let id = table.next_free_invoke_id().unwrap();
        table
            .set_confirmed_unsegmented_transaction(
                id,
                PeerAddress::local(&[1]),
                NpduParams::default(),
                header(),
                vec![1, 2, 3],
                3000,
            )
            .unwrap();
        assert!(!table.transaction_available());
        assert!(matches!(
            table.next_free_invoke_id(),
            Err(TsmError::NoFreeTransaction)
        ));
    }

    #[test]
    fn retry_then_timeout_callback_on_exhaustion() {
        let mut table = TransactionTable::new(1);
        let id = table.next_free_invoke_id().unwrap();
        table
            .set_confirmed_unsegmented_transaction(
                id,
                PeerAddress::local(&[1]),
                NpduParams::default(),
                header(),
                vec![9],
                100,
            )
            .unwrap();
        let actions = table.timer_milliseconds(100, 1, 100);
        assert!(matches!(actions[0], TimerAction::Resend { .. }));
        assert!(!table.invoke_id_free(id));

        let actions = table.timer_milliseconds(100, 1, 100);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], TimerAction::Timeout { invoke_id } if invoke_id == id));
        assert!(table.invoke_id_free(id));
        assert!(table.invoke_id_failed(id));
    }

    #[test]
    fn stalled_segmented_request_server_is_dropped_silently() {
        let mut table = TransactionTable::new(1);
        let id = table.next_free_invoke_id().unwrap();
        let peer = PeerAddress::local(&[7]);
        table
            .set_segmented_request_server(id, peer, 200, 100)
            .unwrap();
        let actions = table.timer_milliseconds(100, 3, 100);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            TimerAction::SilentlyDropped {
                invoke_id,
                peer: dropped_peer,
                peer_invoke_id,
            } => {
                assert_eq!(*invoke_id, id);
                assert_eq!(*dropped_peer, peer);
                assert_eq!(*peer_invoke_id, 200);
            }
            other => panic!("expected SilentlyDropped, got {:?}", other),
        }
        assert!(table.invoke_id_free(id));
    }

    #[test]
    fn free_invoke_id_clears_failure_flag() {
        let mut table = TransactionTable::new(1);
        let id = table.next_free_invoke_id().unwrap();
        table
            .set_confirmed_unsegmented_transaction(
                id,
                PeerAddress::local(&[1]),
                NpduParams::default(),
                header(),
                vec![9],
                100,
            )
            .unwrap();
        table.free_invoke_id(id);
        assert!(table.invoke_id_free(id));
        assert!(!table.invoke_id_failed(id));
    }
}
