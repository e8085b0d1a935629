//! The per-invoke-id transaction record (`BACNET_TSM_DATA` in `tsm.c`) and
//! the small parameter bundles it needs to remember across a retry or a
//! segment boundary. `Vec<u8>` stands in for the original's fixed blob
//! buffer and its `ensure_extra_blob_size`/`add_blob_data` bookkeeping --
//! growth is Rust's problem, not ours.

use crate::address::PeerAddress;
use crate::seq::SeqNum;

/// Which phase of a confirmed transaction a slot is in. Matches the four
/// live states `tsm_timer_milliseconds` distinguishes (spec §3, §4.C).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SlotState {
    /// Slot is unused and available for allocation.
    Idle,
    /// We sent a confirmed request (segmented or not) and are waiting for
    /// an ack, a segment-ack, or a response. Drives the retry/timeout path.
    AwaitConfirmation,
    /// We are the server reassembling an inbound segmented request. No
    /// retries here: a stalled sender is simply abandoned (silent drop).
    SegmentedRequestServer,
    /// We are the server that sent (or is sending) a segmented response and
    /// are waiting for the client's segment-ack window to advance. Retried
    /// up to `apdu_retries` times before the slot is given up.
    SegmentedResponseServer,
}

/// NPDU-level parameters the slot must remember to reconstruct a
/// retransmission; NPDU encoding itself is an external collaborator.
#[derive(Copy, Clone, Debug)]
pub struct NpduParams {
    pub priority: u8,
    pub data_expecting_reply: bool,
}

impl Default for NpduParams {
    fn default() -> Self {
        NpduParams {
            priority: 0,
            data_expecting_reply: true,
        }
    }
}

/// The handful of APDU header fields a retransmit or a segment-ack handler
/// needs without re-deriving them from the stored blob.
#[derive(Copy, Clone, Debug)]
pub struct ApduHeaderParams {
    pub service_choice: u8,
    pub max_segs_max_resp: u8,
    pub segmented_response_accepted: bool,
}

/// One live transaction. Spec §3's canonical model: invoke-id, peer, current
/// state, the retry/segment timers, and the full APDU body being sent or
/// reassembled.
#[derive(Clone, Debug)]
pub struct Slot {
    pub invoke_id: u8,
    pub state: SlotState,
    pub peer: PeerAddress,
    pub npdu: NpduParams,
    pub apdu_header: ApduHeaderParams,

    /// The wire invoke-id the peer used, recovered on timeout so a stalled
    /// `SegmentedRequestServer` can release its peer-invoke-map binding and
    /// reassembly buffer, both keyed by `(peer, peer_invoke_id)` rather than
    /// by this slot's own (locally-allocated) `invoke_id`. Unused outside
    /// that state.
    pub peer_invoke_id: u8,

    /// Milliseconds remaining before the next retry (AwaitConfirmation,
    /// SegmentedResponseServer) or before a stalled inbound reassembly is
    /// abandoned (SegmentedRequestServer).
    pub request_timer_ms: u32,
    /// Milliseconds remaining before the in-flight segment window is
    /// considered unacknowledged and re-sent.
    pub segment_timer_ms: u32,
    pub retry_count: u8,
    pub segment_retry_count: u8,

    /// The full APDU body: the request we may need to resend, or the
    /// response being segmented out.
    pub blob: Vec<u8>,

    pub segmented_response_accepted: bool,
    pub max_segments_accepted: u8,
    pub actual_window_size: u8,
    pub proposed_window_size: u8,
    pub initial_sequence_number: SeqNum,
    pub last_sequence_number: SeqNum,

    /// Per-slot duplicate-segment tally. The original keeps a single
    /// process-wide `Duplicate_Count`, which conflates unrelated
    /// transactions; tracking it per slot is an intentional divergence
    /// (see DESIGN.md).
    pub duplicate_count: u8,
}

impl Slot {
    pub fn idle(invoke_id: u8) -> Self {
        Slot {
            invoke_id,
            state: SlotState::Idle,
            peer: PeerAddress::local(&[]),
            npdu: NpduParams::default(),
            apdu_header: ApduHeaderParams {
                service_choice: 0,
                max_segs_max_resp: 0,
                segmented_response_accepted: false,
            },
            peer_invoke_id: 0,
            request_timer_ms: 0,
            segment_timer_ms: 0,
            retry_count: 0,
            segment_retry_count: 0,
            blob: Vec::new(),
            segmented_response_accepted: false,
            max_segments_accepted: 0,
            actual_window_size: 1,
            proposed_window_size: 1,
            initial_sequence_number: SeqNum::ZERO,
            last_sequence_number: SeqNum::ZERO,
            duplicate_count: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == SlotState::Idle
    }

    /// Reset to `Idle` and drop the stored APDU body, matching
    /// `tsm_free_invoke_id`'s effect on the slot (the index itself is
    /// released by the caller, the `TransactionTable`).
    pub fn clear(&mut self) {
        let invoke_id = self.invoke_id;
        *self = Slot::idle(invoke_id);
    }
}
