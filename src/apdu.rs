//! Bit-exact fixed-header shapes for the seven PDU kinds named in spec §6.
//! Primitive application-tag encoding and NPDU framing are external
//! collaborators (spec §1); this module only frames the APDU fixed header
//! that wraps a service-data payload the caller already has encoded.

use crate::error::{AbortReason, ErrorClass, ErrorCode, RejectReason};

pub mod pdu_type {
    pub const CONFIRMED_REQUEST: u8 = 0x0;
    pub const SIMPLE_ACK: u8 = 0x2;
    pub const COMPLEX_ACK: u8 = 0x3;
    pub const SEGMENT_ACK: u8 = 0x4;
    pub const ERROR: u8 = 0x5;
    pub const REJECT: u8 = 0x6;
    pub const ABORT: u8 = 0x7;
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DecodeError {
    TooShort,
    WrongPduType { expected: u8, found: u8 },
}

/// `get_apdu_header_typical_size` (tsm.c): the fixed-header byte count,
/// *including* the trailing service-choice octet, before service data
/// begins. Anything other than confirmed-request/complex-ack falls back to
/// the unsegmented-ack size, matching the original's default branch.
pub fn header_size(pdu_type: u8, segmented: bool) -> usize {
    match pdu_type {
        pdu_type::COMPLEX_ACK => {
            if segmented {
                5
            } else {
                3
            }
        }
        pdu_type::CONFIRMED_REQUEST => {
            if segmented {
                6
            } else {
                4
            }
        }
        _ => 3,
    }
}

/// The standard max-APDU-length-accepted table (low nibble of the
/// max-segs/max-resp octet, Clause 20.1.2.5): the largest single APDU the
/// requester says it can receive. Values 6-15 are reserved and fall back to
/// the largest defined size.
pub fn decode_max_resp(max_segs_max_resp: u8) -> usize {
    match max_segs_max_resp & 0x0F {
        0 => 50,
        1 => 128,
        2 => 206,
        3 => 480,
        4 => 1024,
        _ => 1476,
    }
}

/// Fixed header for a confirmed-service request (spec §6). `sequence_number`
/// and `proposed_window_size` are present iff `segmented_message`.
#[derive(Copy, Clone, Debug)]
pub struct ConfirmedRequestHeader {
    pub segmented_message: bool,
    pub more_follows: bool,
    pub segmented_response_accepted: bool,
    /// Max-segments-accepted (high nibble) / max-APDU-length-accepted (low
    /// nibble) octet. Decode the low nibble with [`decode_max_resp`] to get
    /// the requester's actual max-response-size ceiling.
    pub max_segs_max_resp: u8,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub proposed_window_size: u8,
    pub service_choice: u8,
}

impl ConfirmedRequestHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let flags = (pdu_type::CONFIRMED_REQUEST << 4)
            | ((self.segmented_message as u8) << 3)
            | ((self.more_follows as u8) << 2)
            | ((self.segmented_response_accepted as u8) << 1);
        out.push(flags);
        out.push(self.max_segs_max_resp);
        out.push(self.invoke_id);
        if self.segmented_message {
            out.push(self.sequence_number);
            out.push(self.proposed_window_size);
        }
        out.push(self.service_choice);
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        if buf.len() < 4 {
            return Err(DecodeError::TooShort);
        }
        let found_type = buf[0] >> 4;
        if found_type != pdu_type::CONFIRMED_REQUEST {
            return Err(DecodeError::WrongPduType {
                expected: pdu_type::CONFIRMED_REQUEST,
                found: found_type,
            });
        }
        let segmented_message = (buf[0] & 0b1000) != 0;
        let more_follows = (buf[0] & 0b0100) != 0;
        let segmented_response_accepted = (buf[0] & 0b0010) != 0;
        let max_segs_max_resp = buf[1];
        let invoke_id = buf[2];
        if segmented_message {
            if buf.len() < 6 {
                return Err(DecodeError::TooShort);
            }
            Ok((
                ConfirmedRequestHeader {
                    segmented_message,
                    more_follows,
                    segmented_response_accepted,
                    max_segs_max_resp,
                    invoke_id,
                    sequence_number: buf[3],
                    proposed_window_size: buf[4],
                    service_choice: buf[5],
                },
                6,
            ))
        } else {
            Ok((
                ConfirmedRequestHeader {
                    segmented_message,
                    more_follows,
                    segmented_response_accepted,
                    max_segs_max_resp,
                    invoke_id,
                    sequence_number: 0,
                    proposed_window_size: 0,
                    service_choice: buf[3],
                },
                4,
            ))
        }
    }
}

/// Fixed header for a complex-ack (spec §6).
#[derive(Copy, Clone, Debug)]
pub struct ComplexAckHeader {
    pub segmented_message: bool,
    pub more_follows: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub proposed_window_size: u8,
    pub service_choice: u8,
}

impl ComplexAckHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let flags = (pdu_type::COMPLEX_ACK << 4)
            | ((self.segmented_message as u8) << 3)
            | ((self.more_follows as u8) << 2);
        out.push(flags);
        out.push(self.invoke_id);
        if self.segmented_message {
            out.push(self.sequence_number);
            out.push(self.proposed_window_size);
        }
        out.push(self.service_choice);
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        if buf.len() < 3 {
            return Err(DecodeError::TooShort);
        }
        let found_type = buf[0] >> 4;
        if found_type != pdu_type::COMPLEX_ACK {
            return Err(DecodeError::WrongPduType {
                expected: pdu_type::COMPLEX_ACK,
                found: found_type,
            });
        }
        let segmented_message = (buf[0] & 0b1000) != 0;
        let more_follows = (buf[0] & 0b0100) != 0;
        let invoke_id = buf[1];
        if segmented_message {
            if buf.len() < 5 {
                return Err(DecodeError::TooShort);
            }
            Ok((
                ComplexAckHeader {
                    segmented_message,
                    more_follows,
                    invoke_id,
                    sequence_number: buf[2],
                    proposed_window_size: buf[3],
                    service_choice: buf[4],
                },
                5,
            ))
        } else {
            Ok((
                ComplexAckHeader {
                    segmented_message,
                    more_follows,
                    invoke_id,
                    sequence_number: 0,
                    proposed_window_size: 0,
                    service_choice: buf[2],
                },
                3,
            ))
        }
    }
}

pub fn encode_simple_ack(invoke_id: u8, service_choice: u8, out: &mut Vec<u8>) {
    out.push(pdu_type::SIMPLE_ACK << 4);
    out.push(invoke_id);
    out.push(service_choice);
}

pub fn decode_simple_ack(buf: &[u8]) -> Result<(u8, u8, usize), DecodeError> {
    if buf.len() < 3 {
        return Err(DecodeError::TooShort);
    }
    let found_type = buf[0] >> 4;
    if found_type != pdu_type::SIMPLE_ACK {
        return Err(DecodeError::WrongPduType {
            expected: pdu_type::SIMPLE_ACK,
            found: found_type,
        });
    }
    Ok((buf[1], buf[2], 3))
}

/// `segmentack_encode_apdu` (tsm.c).
pub fn encode_segment_ack(
    negative_ack: bool,
    server: bool,
    invoke_id: u8,
    sequence_number: u8,
    actual_window_size: u8,
    out: &mut Vec<u8>,
) {
    let flags =
        (pdu_type::SEGMENT_ACK << 4) | ((negative_ack as u8) << 1) | (server as u8);
    out.push(flags);
    out.push(invoke_id);
    out.push(sequence_number);
    out.push(actual_window_size);
}

#[derive(Copy, Clone, Debug)]
pub struct SegmentAck {
    pub negative_ack: bool,
    pub server: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub actual_window_size: u8,
}

pub fn decode_segment_ack(buf: &[u8]) -> Result<(SegmentAck, usize), DecodeError> {
    if buf.len() < 4 {
        return Err(DecodeError::TooShort);
    }
    let found_type = buf[0] >> 4;
    if found_type != pdu_type::SEGMENT_ACK {
        return Err(DecodeError::WrongPduType {
            expected: pdu_type::SEGMENT_ACK,
            found: found_type,
        });
    }
    Ok((
        SegmentAck {
            negative_ack: (buf[0] & 0b0010) != 0,
            server: (buf[0] & 0b0001) != 0,
            invoke_id: buf[1],
            sequence_number: buf[2],
            actual_window_size: buf[3],
        },
        4,
    ))
}

fn abort_reason_code(reason: AbortReason) -> u8 {
    match reason {
        AbortReason::Other => 0,
        AbortReason::BufferOverflow => 1,
        AbortReason::InvalidApduInThisState => 2,
        AbortReason::PreemptedByHigherPriorityTask => 3,
        AbortReason::SegmentationNotSupported => 4,
        AbortReason::WindowSizeOutOfRange => 9,
        AbortReason::ApplicationExceededReplyTime => 10,
    }
}

fn abort_reason_from_code(code: u8) -> AbortReason {
    match code {
        1 => AbortReason::BufferOverflow,
        2 => AbortReason::InvalidApduInThisState,
        3 => AbortReason::PreemptedByHigherPriorityTask,
        4 => AbortReason::SegmentationNotSupported,
        9 => AbortReason::WindowSizeOutOfRange,
        10 => AbortReason::ApplicationExceededReplyTime,
        _ => AbortReason::Other,
    }
}

/// `abort_encode_apdu` (tsm.c).
pub fn encode_abort(invoke_id: u8, reason: AbortReason, server: bool, out: &mut Vec<u8>) {
    out.push((pdu_type::ABORT << 4) | (server as u8));
    out.push(invoke_id);
    out.push(abort_reason_code(reason));
}

pub fn decode_abort(buf: &[u8]) -> Result<(u8, AbortReason, bool, usize), DecodeError> {
    if buf.len() < 3 {
        return Err(DecodeError::TooShort);
    }
    let found_type = buf[0] >> 4;
    if found_type != pdu_type::ABORT {
        return Err(DecodeError::WrongPduType {
            expected: pdu_type::ABORT,
            found: found_type,
        });
    }
    Ok((
        buf[1],
        abort_reason_from_code(buf[2]),
        (buf[0] & 1) != 0,
        3,
    ))
}

fn reject_reason_code(reason: RejectReason) -> u8 {
    match reason {
        RejectReason::Other => 0,
        RejectReason::MissingRequiredParameter => 1,
        RejectReason::InvalidTag => 2,
        RejectReason::UnrecognizedService => 3,
        RejectReason::ParameterOutOfRange => 4,
    }
}

fn reject_reason_from_code(code: u8) -> RejectReason {
    match code {
        1 => RejectReason::MissingRequiredParameter,
        2 => RejectReason::InvalidTag,
        3 => RejectReason::UnrecognizedService,
        4 => RejectReason::ParameterOutOfRange,
        _ => RejectReason::Other,
    }
}

pub fn encode_reject(invoke_id: u8, reason: RejectReason, out: &mut Vec<u8>) {
    out.push(pdu_type::REJECT << 4);
    out.push(invoke_id);
    out.push(reject_reason_code(reason));
}

pub fn decode_reject(buf: &[u8]) -> Result<(u8, RejectReason, usize), DecodeError> {
    if buf.len() < 3 {
        return Err(DecodeError::TooShort);
    }
    let found_type = buf[0] >> 4;
    if found_type != pdu_type::REJECT {
        return Err(DecodeError::WrongPduType {
            expected: pdu_type::REJECT,
            found: found_type,
        });
    }
    Ok((buf[1], reject_reason_from_code(buf[2]), 3))
}

fn error_class_code(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Device => 0,
        ErrorClass::Object => 1,
        ErrorClass::Property => 2,
        ErrorClass::Resources => 3,
        ErrorClass::Security => 4,
        ErrorClass::Services => 5,
        ErrorClass::Vt => 6,
        ErrorClass::Communication => 7,
        ErrorClass::Other => 63,
    }
}

fn error_class_from_code(code: u8) -> ErrorClass {
    match code {
        0 => ErrorClass::Device,
        1 => ErrorClass::Object,
        2 => ErrorClass::Property,
        3 => ErrorClass::Resources,
        4 => ErrorClass::Security,
        5 => ErrorClass::Services,
        6 => ErrorClass::Vt,
        7 => ErrorClass::Communication,
        _ => ErrorClass::Other,
    }
}

fn error_code_value(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::UnknownObject => 31,
        ErrorCode::UnknownProperty => 32,
        ErrorCode::PropertyIsNotAnArray => 50,
        ErrorCode::WriteAccessDenied => 40,
        ErrorCode::InvalidDataType => 9,
        ErrorCode::ValueOutOfRange => 37,
        ErrorCode::Other(v) => v,
    }
}

fn error_code_from_value(v: u16) -> ErrorCode {
    match v {
        31 => ErrorCode::UnknownObject,
        32 => ErrorCode::UnknownProperty,
        50 => ErrorCode::PropertyIsNotAnArray,
        40 => ErrorCode::WriteAccessDenied,
        9 => ErrorCode::InvalidDataType,
        37 => ErrorCode::ValueOutOfRange,
        other => ErrorCode::Other(other),
    }
}

pub fn encode_error(
    invoke_id: u8,
    service_choice: u8,
    class: ErrorClass,
    code: ErrorCode,
    out: &mut Vec<u8>,
) {
    out.push(pdu_type::ERROR << 4);
    out.push(invoke_id);
    out.push(service_choice);
    out.push(error_class_code(class));
    let v = error_code_value(code);
    out.push((v >> 8) as u8);
    out.push((v & 0xff) as u8);
}

pub fn decode_error(
    buf: &[u8],
) -> Result<(u8, u8, ErrorClass, ErrorCode, usize), DecodeError> {
    if buf.len() < 6 {
        return Err(DecodeError::TooShort);
    }
    let found_type = buf[0] >> 4;
    if found_type != pdu_type::ERROR {
        return Err(DecodeError::WrongPduType {
            expected: pdu_type::ERROR,
            found: found_type,
        });
    }
    let code_value = ((buf[4] as u16) << 8) | buf[5] as u16;
    Ok((
        buf[1],
        buf[2],
        error_class_from_code(buf[3]),
        error_code_from_value(code_value),
        6,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_max_resp_follows_standard_table() {
        assert_eq!(decode_max_resp(0x00), 50);
        assert_eq!(decode_max_resp(0x95), 1024); // high nibble ignored
        assert_eq!(decode_max_resp(0x05), 1476);
        assert_eq!(decode_max_resp(0x0F), 1476); // reserved falls back to max
    }

    #[test]
    fn confirmed_request_round_trips_unsegmented() {
        let header = ConfirmedRequestHeader {
            segmented_message: false,
            more_follows: false,
            segmented_response_accepted: true,
            max_segs_max_resp: 0x55,
            invoke_id: 42,
            sequence_number: 0,
            proposed_window_size: 0,
            service_choice: 14,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header_size(pdu_type::CONFIRMED_REQUEST, false));
        let (decoded, len) = ConfirmedRequestHeader::decode(&buf).unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(decoded.invoke_id, 42);
        assert!(!decoded.segmented_message);
        assert!(decoded.segmented_response_accepted);
        assert_eq!(decoded.service_choice, 14);
    }

    #[test]
    fn confirmed_request_round_trips_segmented() {
        let header = ConfirmedRequestHeader {
            segmented_message: true,
            more_follows: true,
            segmented_response_accepted: true,
            max_segs_max_resp: 0x12,
            invoke_id: 7,
            sequence_number: 3,
            proposed_window_size: 16,
            service_choice: 14,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header_size(pdu_type::CONFIRMED_REQUEST, true));
        let (decoded, len) = ConfirmedRequestHeader::decode(&buf).unwrap();
        assert_eq!(len, 6);
        assert_eq!(decoded.sequence_number, 3);
        assert_eq!(decoded.proposed_window_size, 16);
    }

    #[test]
    fn complex_ack_round_trips() {
        let header = ComplexAckHeader {
            segmented_message: true,
            more_follows: false,
            invoke_id: 9,
            sequence_number: 5,
            proposed_window_size: 8,
            service_choice: 14,
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header_size(pdu_type::COMPLEX_ACK, true));
        let (decoded, len) = ComplexAckHeader::decode(&buf).unwrap();
        assert_eq!(len, 5);
        assert_eq!(decoded.sequence_number, 5);
    }

    #[test]
    fn segment_ack_round_trips() {
        let mut buf = Vec::new();
        encode_segment_ack(true, true, 3, 9, 16, &mut buf);
        let (ack, len) = decode_segment_ack(&buf).unwrap();
        assert_eq!(len, 4);
        assert!(ack.negative_ack);
        assert!(ack.server);
        assert_eq!(ack.sequence_number, 9);
        assert_eq!(ack.actual_window_size, 16);
    }

    #[test]
    fn abort_round_trips() {
        let mut buf = Vec::new();
        encode_abort(5, AbortReason::BufferOverflow, true, &mut buf);
        let (invoke_id, reason, server, len) = decode_abort(&buf).unwrap();
        assert_eq!(invoke_id, 5);
        assert_eq!(reason, AbortReason::BufferOverflow);
        assert!(server);
        assert_eq!(len, 3);
    }

    #[test]
    fn error_round_trips() {
        let mut buf = Vec::new();
        encode_error(
            2,
            14,
            ErrorClass::Property,
            ErrorCode::PropertyIsNotAnArray,
            &mut buf,
        );
        let (invoke_id, service_choice, class, code, len) = decode_error(&buf).unwrap();
        assert_eq!(invoke_id, 2);
        assert_eq!(service_choice, 14);
        assert_eq!(class, ErrorClass::Property);
        assert_eq!(code, ErrorCode::PropertyIsNotAnArray);
        assert_eq!(len, 6);
    }
}
