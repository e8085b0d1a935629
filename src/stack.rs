//! The top-level handle a host binds its datalink and device registry to
//! (spec §2 "Stack" overview). Mirrors the teacher's `FullStack`: the
//! mutable engine state sits behind a `parking_lot::RwLock` so a single
//! owner can be shared by value across the host's cooperative tick loop
//! without the stack itself spawning any threads (spec §5 non-goal).

use parking_lot::RwLock;

use crate::address::PeerAddress;
use crate::apdu::pdu_type;
use crate::config::{RuntimeParams, StackConfig};
use crate::dispatch::{self, ConfirmedServiceHandler, DispatchError, PduSender};
use crate::peer_map::PeerMap;
use crate::registry::TimeoutHandler;
use crate::segmentation::ReassemblyTable;
use crate::tsm::{TimerAction, TransactionTable};

struct StackInternals {
    tsm: TransactionTable,
    peer_map: PeerMap,
    reassembly: ReassemblyTable,
}

pub struct Stack<R: RuntimeParams> {
    config: StackConfig,
    runtime: R,
    internals: RwLock<StackInternals>,
}

impl<R: RuntimeParams> Stack<R> {
    pub fn new(config: StackConfig, runtime: R) -> Self {
        let internals = StackInternals {
            tsm: TransactionTable::new(config.max_tsm_transactions),
            peer_map: PeerMap::new(config.max_tsm_peers),
            reassembly: ReassemblyTable::new(),
        };
        Stack {
            config,
            runtime,
            internals: RwLock::new(internals),
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Allocate an invoke-id and send a confirmed-service request.
    pub fn send_confirmed_request(
        &self,
        sender: &mut dyn PduSender,
        peer: PeerAddress,
        service_choice: u8,
        service_data: &[u8],
    ) -> Result<u8, DispatchError> {
        let mut internals = self.internals.write();
        dispatch::send_confirmed_request(
            &mut internals.tsm,
            sender,
            peer,
            service_choice,
            service_data,
            &self.config,
            &self.runtime,
        )
    }

    /// Feed one inbound APDU to the stack. Confirmed requests are routed to
    /// `handler`; everything else (simple-ack, complex-ack, segment-ack,
    /// abort, reject, error) updates the transaction table directly since
    /// those only make sense in the context of a transaction we initiated.
    pub fn handle_inbound_pdu(
        &self,
        peer: PeerAddress,
        pdu: &[u8],
        sender: &mut dyn PduSender,
        handler: &mut dyn ConfirmedServiceHandler,
    ) {
        if pdu.is_empty() {
            return;
        }
        let found_type = pdu[0] >> 4;
        let mut internals = self.internals.write();
        match found_type {
            pdu_type::CONFIRMED_REQUEST => {
                dispatch::handle_confirmed_request(
                    pdu,
                    peer,
                    &mut internals.reassembly,
                    &mut internals.peer_map,
                    &mut internals.tsm,
                    sender,
                    handler,
                    &self.config,
                    &self.runtime,
                );
            }
            pdu_type::SIMPLE_ACK => {
                if let Ok((invoke_id, _service_choice, _)) = crate::apdu::decode_simple_ack(pdu) {
                    internals.tsm.free_invoke_id(invoke_id);
                }
            }
            pdu_type::COMPLEX_ACK => {
                // Unsegmented complex-ack completes the transaction outright;
                // a segmented one is left for a follow-up feed via the
                // reassembly table (mirrors the confirmed-request path).
                if let Ok((header, _)) = crate::apdu::ComplexAckHeader::decode(pdu) {
                    if !header.segmented_message {
                        internals.tsm.free_invoke_id(header.invoke_id);
                    }
                }
            }
            pdu_type::SEGMENT_ACK => {
                if let Ok((ack, _)) = crate::apdu::decode_segment_ack(pdu) {
                    if !ack.server {
                        // Ack from the client about our outbound segmented
                        // response.
                        dispatch::handle_response_segment_ack(
                            &mut internals.tsm,
                            sender,
                            ack.invoke_id,
                            ack.sequence_number,
                            self.config.max_apdu,
                        );
                    }
                    // Acks about an outbound segmented *request* (the
                    // AwaitConfirmation send side) are driven by whichever
                    // caller owns that slot's retry loop; not modeled here
                    // since this crate's request path only sends
                    // unsegmented requests (spec §4.D).
                }
            }
            pdu_type::ABORT => {
                if let Ok((invoke_id, _, _, _)) = crate::apdu::decode_abort(pdu) {
                    internals.tsm.free_invoke_id_failed(invoke_id);
                    internals.reassembly.abandon(&peer, invoke_id);
                }
            }
            pdu_type::REJECT => {
                if let Ok((invoke_id, _, _)) = crate::apdu::decode_reject(pdu) {
                    internals.tsm.free_invoke_id_failed(invoke_id);
                }
            }
            pdu_type::ERROR => {
                if let Ok((invoke_id, _, _, _, _)) = crate::apdu::decode_error(pdu) {
                    internals.tsm.free_invoke_id_failed(invoke_id);
                }
            }
            _ => {}
        }
    }

    /// Host-driven timer tick (`tsm_timer_milliseconds`). The host owns the
    /// clock; this crate never reads one itself. `timeout_handler` is
    /// notified once per `AwaitConfirmation` slot that exhausts its
    /// retries; no PDU is ever sent on that path or on a silently-dropped
    /// segmented-server slot (spec §4.B).
    pub fn timer_milliseconds(
        &self,
        elapsed_ms: u32,
        sender: &mut dyn PduSender,
        timeout_handler: &mut dyn TimeoutHandler,
    ) {
        let mut internals = self.internals.write();
        let actions = internals.tsm.timer_milliseconds(
            elapsed_ms,
            self.runtime.apdu_retries(),
            self.runtime.apdu_timeout_ms(),
        );
        for action in actions {
            match action {
                TimerAction::Resend { peer, pdu } => {
                    sender.send_pdu(&peer, &pdu);
                }
                TimerAction::Timeout { invoke_id } => {
                    timeout_handler.timeout(invoke_id);
                }
                TimerAction::SilentlyDropped {
                    peer,
                    peer_invoke_id,
                    invoke_id,
                } => {
                    internals.reassembly.abandon(&peer, peer_invoke_id);
                    internals.peer_map.clear(invoke_id);
                }
            }
        }
    }

    pub fn transaction_available(&self) -> bool {
        self.internals.read().tsm.transaction_available()
    }

    /// Drop everything remembered about a peer: any in-flight inbound
    /// segmented-request bindings (and their transaction-table slots) plus
    /// whatever reassembly buffers they own. Useful after a peer reboots
    /// and its segmentation capability may have changed.
    pub fn forget_peer(&self, peer: &PeerAddress) {
        let mut internals = self.internals.write();
        for (local_invoke_id, peer_invoke_id) in internals.peer_map.entries_for(peer) {
            internals.tsm.free_invoke_id(local_invoke_id);
            internals.peer_map.clear(local_invoke_id);
            internals.reassembly.abandon(peer, peer_invoke_id);
        }
    }
}
