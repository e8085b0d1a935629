//! Glue between the wire, the transaction table, and a confirmed-service
//! handler (spec §4.D "request framing errors", grounded on the
//! allocate/encode/send/free-on-failure pattern common to `s_wp.c` and
//! `s_cevent.c`, generalized past a single service).

use crate::address::PeerAddress;
use crate::apdu::{self, pdu_type, ComplexAckHeader, ConfirmedRequestHeader};
use crate::config::{RuntimeParams, StackConfig};
use crate::error::{AbortReason, RejectReason, ServiceStatus};
use crate::peer_map::PeerMap;
use crate::segmentation::{self, FeedResult, ReassemblyTable};
use crate::seq::SeqNum;
use crate::transaction::{ApduHeaderParams, NpduParams, SlotState};
use crate::tsm::{TransactionTable, TsmError};

/// The one thing dispatch needs from the datalink/NPDU layer: a way to put
/// bytes on the wire to a peer. Replaces the original's direct call into
/// `datalink_send_pdu`.
pub trait PduSender {
    fn send_pdu(&mut self, dest: &PeerAddress, pdu: &[u8]) -> usize;
}

/// A confirmed-service implementation (e.g. the RPM assembler in
/// [`crate::rpm`]) that dispatch can hand a decoded request to.
pub trait ConfirmedServiceHandler {
    /// Returns the encoded complex-ack payload, or `None` for a
    /// simple-ack-only service, or `Err` to have dispatch encode an
    /// Abort/Reject/Error in its place.
    fn handle(
        &mut self,
        peer: PeerAddress,
        service_choice: u8,
        service_data: &[u8],
    ) -> Result<Option<Vec<u8>>, ServiceStatus>;
}

#[derive(Copy, Clone, Debug)]
pub enum DispatchError {
    Tsm(TsmError),
}

impl From<TsmError> for DispatchError {
    fn from(e: TsmError) -> Self {
        DispatchError::Tsm(e)
    }
}

/// `tsm_*` allocate-encode-send-or-free pattern, generalized past a single
/// service the way `s_wp.c`/`s_cevent.c` each inline it for their own
/// service choice.
pub fn send_confirmed_request(
    tsm: &mut TransactionTable,
    sender: &mut dyn PduSender,
    peer: PeerAddress,
    service_choice: u8,
    service_data: &[u8],
    config: &StackConfig,
    runtime: &dyn RuntimeParams,
) -> Result<u8, DispatchError> {
    let invoke_id = tsm.next_free_invoke_id()?;
    let header = ConfirmedRequestHeader {
        segmented_message: false,
        more_follows: false,
        segmented_response_accepted: true,
        max_segs_max_resp: 0,
        invoke_id,
        sequence_number: 0,
        proposed_window_size: 0,
        service_choice,
    };
    let mut pdu = Vec::with_capacity(apdu::header_size(pdu_type::CONFIRMED_REQUEST, false) + service_data.len());
    header.encode(&mut pdu);
    pdu.extend_from_slice(service_data);

    tsm.set_confirmed_unsegmented_transaction(
        invoke_id,
        peer,
        NpduParams::default(),
        ApduHeaderParams {
            service_choice,
            max_segs_max_resp: 0,
            segmented_response_accepted: true,
        },
        pdu.clone(),
        runtime.apdu_timeout_ms(),
    )?;

    if sender.send_pdu(&peer, &pdu) == 0 {
        tsm.free_invoke_id_failed(invoke_id);
        return Err(DispatchError::Tsm(TsmError::NoFreeTransaction));
    }
    Ok(invoke_id)
}

/// Decode and act on one inbound confirmed-request APDU: complete
/// (unsegmented or just-reassembled) requests are handed to `handler` and
/// the resulting ack/error is sent back immediately; a still-incomplete
/// segmented request claims (or rejoins) a `SegmentedRequestServer` slot via
/// `peer_map` (spec §4.A) and updates the reassembly table, sending a
/// positive segment-ack if the window just filled.
#[allow(clippy::too_many_arguments)]
pub fn handle_confirmed_request(
    pdu: &[u8],
    peer: PeerAddress,
    reassembly: &mut ReassemblyTable,
    peer_map: &mut PeerMap,
    tsm: &mut TransactionTable,
    sender: &mut dyn PduSender,
    handler: &mut dyn ConfirmedServiceHandler,
    config: &StackConfig,
    runtime: &dyn RuntimeParams,
) {
    let (header, consumed) = match ConfirmedRequestHeader::decode(pdu) {
        Ok(v) => v,
        Err(_) => return,
    };
    let body = &pdu[consumed..];

    if header.segmented_message {
        if header.sequence_number == 0 {
            let local_invoke_id = match peer_map.resolve_or_create(peer, header.invoke_id, tsm) {
                Some(id) => id,
                None => {
                    abort(sender, peer, header.invoke_id, AbortReason::PreemptedByHigherPriorityTask, true);
                    return;
                }
            };
            if tsm
                .set_segmented_request_server(
                    local_invoke_id,
                    peer,
                    header.invoke_id,
                    runtime.apdu_segment_timeout_ms(),
                )
                .is_err()
            {
                peer_map.clear(local_invoke_id);
                abort(sender, peer, header.invoke_id, AbortReason::PreemptedByHigherPriorityTask, true);
                return;
            }
        } else {
            let local_invoke_id = peer_map.resolve(&peer, header.invoke_id);
            let in_expected_state = local_invoke_id
                .map(|id| check_unexpected_pdu(tsm, id, SlotState::SegmentedRequestServer).is_ok())
                .unwrap_or(false);
            if !in_expected_state {
                abort(sender, peer, header.invoke_id, AbortReason::InvalidApduInThisState, true);
                return;
            }
            // A fresh segment arrived in the expected state: re-arm the
            // slot's segment timer so a live transaction isn't abandoned.
            if let Some(slot) = tsm.slot_mut(local_invoke_id.expect("checked above")) {
                slot.request_timer_ms = runtime.apdu_segment_timeout_ms();
            }
        }

        let window_size = header.proposed_window_size;
        match reassembly.feed_segment(
            peer,
            header.invoke_id,
            SeqNum(header.sequence_number),
            window_size,
            header.more_follows,
            body,
            config.max_segments_accepted,
        ) {
            FeedResult::Duplicate => {
                send_segment_ack(sender, peer, header.invoke_id, header.sequence_number, window_size, false);
            }
            FeedResult::Accepted { window_filled } => {
                if window_filled {
                    send_segment_ack(sender, peer, header.invoke_id, header.sequence_number, window_size, false);
                }
            }
            FeedResult::Rejected(reason) => {
                if let Some(local_invoke_id) = peer_map.resolve(&peer, header.invoke_id) {
                    tsm.free_invoke_id_failed(local_invoke_id);
                    peer_map.clear(local_invoke_id);
                }
                abort(sender, peer, header.invoke_id, reason, true);
            }
            FeedResult::Complete(full_body) => {
                if let Some(local_invoke_id) = peer_map.resolve(&peer, header.invoke_id) {
                    tsm.free_invoke_id(local_invoke_id);
                    peer_map.clear(local_invoke_id);
                }
                send_segment_ack(sender, peer, header.invoke_id, header.sequence_number, window_size, false);
                respond(
                    sender,
                    peer,
                    header.invoke_id,
                    header.service_choice,
                    header.segmented_response_accepted,
                    header.max_segs_max_resp,
                    &full_body,
                    handler,
                    tsm,
                    config,
                    runtime,
                );
            }
        }
        return;
    }

    respond(
        sender,
        peer,
        header.invoke_id,
        header.service_choice,
        header.segmented_response_accepted,
        header.max_segs_max_resp,
        body,
        handler,
        tsm,
        config,
        runtime,
    );
}

fn abort(sender: &mut dyn PduSender, peer: PeerAddress, invoke_id: u8, reason: AbortReason, server: bool) {
    let mut out = Vec::new();
    apdu::encode_abort(invoke_id, reason, server, &mut out);
    sender.send_pdu(&peer, &out);
}

fn send_segment_ack(
    sender: &mut dyn PduSender,
    peer: PeerAddress,
    invoke_id: u8,
    sequence_number: u8,
    window_size: u8,
    negative: bool,
) {
    let mut out = Vec::new();
    apdu::encode_segment_ack(negative, true, invoke_id, sequence_number, window_size, &mut out);
    sender.send_pdu(&peer, &out);
}

#[allow(clippy::too_many_arguments)]
fn respond(
    sender: &mut dyn PduSender,
    peer: PeerAddress,
    invoke_id: u8,
    service_choice: u8,
    segmented_response_accepted: bool,
    max_segs_max_resp: u8,
    service_data: &[u8],
    handler: &mut dyn ConfirmedServiceHandler,
    tsm: &mut TransactionTable,
    config: &StackConfig,
    runtime: &dyn RuntimeParams,
) {
    match handler.handle(peer, service_choice, service_data) {
        Ok(Some(payload)) => {
            let max_resp = apdu::decode_max_resp(max_segs_max_resp);
            match crate::rpm::finalize_response(
                payload,
                max_resp,
                config.max_apdu,
                config.segmentation_enabled,
                segmented_response_accepted,
            ) {
                Ok(body) => {
                    let max_resp_len = max_resp.min(config.max_apdu);
                    if body.len() <= max_resp_len {
                        let mut out = Vec::new();
                        let header = ComplexAckHeader {
                            segmented_message: false,
                            more_follows: false,
                            invoke_id,
                            sequence_number: 0,
                            proposed_window_size: 0,
                            service_choice,
                        };
                        header.encode(&mut out);
                        out.extend_from_slice(&body);
                        sender.send_pdu(&peer, &out);
                    } else {
                        let window_size = StackConfig::DEFAULT_WINDOW_SIZE;
                        if tsm
                            .set_segmented_response(
                                invoke_id,
                                peer,
                                service_choice,
                                body,
                                window_size,
                                runtime.apdu_segment_timeout_ms(),
                            )
                            .is_ok()
                        {
                            send_segment_window(tsm, sender, invoke_id, config.max_apdu);
                        } else {
                            let mut out = Vec::new();
                            apdu::encode_abort(invoke_id, AbortReason::BufferOverflow, true, &mut out);
                            sender.send_pdu(&peer, &out);
                        }
                    }
                }
                Err(status) => send_status(sender, peer, invoke_id, service_choice, status),
            }
        }
        Ok(None) => {
            let mut out = Vec::new();
            apdu::encode_simple_ack(invoke_id, service_choice, &mut out);
            sender.send_pdu(&peer, &out);
        }
        Err(status) => send_status(sender, peer, invoke_id, service_choice, status),
    }
}

fn send_status(
    sender: &mut dyn PduSender,
    peer: PeerAddress,
    invoke_id: u8,
    service_choice: u8,
    status: ServiceStatus,
) {
    let mut out = Vec::new();
    match status {
        ServiceStatus::Abort(reason) => apdu::encode_abort(invoke_id, reason, true, &mut out),
        ServiceStatus::Reject(reason) => apdu::encode_reject(invoke_id, reason, &mut out),
        ServiceStatus::Error(class, code) => {
            apdu::encode_error(invoke_id, service_choice, class, code, &mut out)
        }
    }
    sender.send_pdu(&peer, &out);
}

/// Send the next outstanding window of a segmented response
/// (`tsm_set_complexack_transaction`'s segmented branch plus `FillWindow`).
/// Called both when a segmented response is first created and again each
/// time a `NewAck` advances the window.
pub fn send_segment_window(
    tsm: &mut TransactionTable,
    sender: &mut dyn PduSender,
    invoke_id: u8,
    max_apdu: usize,
) {
    let header_len = apdu::header_size(pdu_type::COMPLEX_ACK, true);
    let (peer, service_choice, window_size, start) = match tsm.slot(invoke_id) {
        Some(slot) => (
            slot.peer,
            slot.apdu_header.service_choice,
            slot.proposed_window_size,
            slot.initial_sequence_number,
        ),
        None => return,
    };
    let slot = tsm.slot(invoke_id).expect("checked above");
    let chunks = segmentation::chunk_body(&slot.blob, max_apdu, header_len);
    let total = chunks.len();
    let window = segmentation::fill_window(total, start, window_size);
    for seq in &window {
        let idx = seq.wrapping_diff(SeqNum::ZERO) as usize;
        let more_follows = idx + 1 < total;
        let header = ComplexAckHeader {
            segmented_message: true,
            more_follows,
            invoke_id,
            sequence_number: seq.0,
            proposed_window_size: window_size,
            service_choice,
        };
        let mut out = Vec::with_capacity(header_len + chunks[idx].len());
        header.encode(&mut out);
        out.extend_from_slice(chunks[idx]);
        sender.send_pdu(&peer, &out);
    }
    if let Some(last) = window.last() {
        if let Some(slot) = tsm.slot_mut(invoke_id) {
            slot.last_sequence_number = *last;
        }
    }
}

/// Fold an inbound segment-ack for an outbound segmented response into its
/// slot: advance the window and send the next batch, or free the slot on
/// the final ack (`tsm_segmentack_received`).
pub fn handle_response_segment_ack(
    tsm: &mut TransactionTable,
    sender: &mut dyn PduSender,
    invoke_id: u8,
    acked_sequence_number: u8,
    max_apdu: usize,
) {
    let header_len = apdu::header_size(pdu_type::COMPLEX_ACK, true);
    let (window_size, start, total) = match tsm.slot(invoke_id) {
        Some(slot) if slot.state == SlotState::SegmentedResponseServer => {
            let chunks = segmentation::chunk_body(&slot.blob, max_apdu, header_len);
            (slot.proposed_window_size, slot.initial_sequence_number, chunks.len())
        }
        _ => return,
    };
    match segmentation::classify_segment_ack(SeqNum(acked_sequence_number), start, window_size, total) {
        segmentation::SegmentAckOutcome::FinalAck => {
            tsm.free_invoke_id(invoke_id);
        }
        segmentation::SegmentAckOutcome::NewAck => {
            if let Some(slot) = tsm.slot_mut(invoke_id) {
                slot.initial_sequence_number = SeqNum(acked_sequence_number).next();
                slot.segment_retry_count = 0;
            }
            send_segment_window(tsm, sender, invoke_id, max_apdu);
        }
        segmentation::SegmentAckOutcome::DuplicateAck => {}
    }
}

/// Guard against an inbound segment-ack or segmented PDU that doesn't
/// match a slot we actually have in the expected state
/// (`check_unexpected_pdu_received`): Abort `InvalidApduInThisState` rather
/// than acting on it.
pub fn check_unexpected_pdu(tsm: &TransactionTable, invoke_id: u8, expected: SlotState) -> Result<(), AbortReason> {
    match tsm.slot(invoke_id) {
        Some(slot) if slot.state == expected => Ok(()),
        Some(_) => Err(AbortReason::InvalidApduInThisState),
        None => Err(AbortReason::InvalidApduInThisState),
    }
}

pub fn reject_malformed(reason: RejectReason) -> ServiceStatus {
    ServiceStatus::Reject(reason)
}
