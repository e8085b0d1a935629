//! Abort/Reject/Error taxonomy (see spec §7) and the service-level outcome
//! type the RPM assembler and dispatch glue propagate.
use core::fmt;

/// Reasons a confirmed transaction can be aborted. Terminates the
/// transaction and releases its slot.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AbortReason {
    Other,
    BufferOverflow,
    InvalidApduInThisState,
    PreemptedByHigherPriorityTask,
    SegmentationNotSupported,
    WindowSizeOutOfRange,
    ApplicationExceededReplyTime,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::Other => "other",
            AbortReason::BufferOverflow => "buffer overflow",
            AbortReason::InvalidApduInThisState => "invalid apdu in this state",
            AbortReason::PreemptedByHigherPriorityTask => "preempted by higher priority task",
            AbortReason::SegmentationNotSupported => "segmentation not supported",
            AbortReason::WindowSizeOutOfRange => "window size out of range",
            AbortReason::ApplicationExceededReplyTime => "application exceeded reply time",
        };
        f.write_str(s)
    }
}

/// Reasons a malformed request is refused before any processing begins.
/// Does not consume a transaction slot.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RejectReason {
    Other,
    MissingRequiredParameter,
    InvalidTag,
    UnrecognizedService,
    ParameterOutOfRange,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Other => "other",
            RejectReason::MissingRequiredParameter => "missing required parameter",
            RejectReason::InvalidTag => "invalid tag",
            RejectReason::UnrecognizedService => "unrecognized service",
            RejectReason::ParameterOutOfRange => "parameter out of range",
        };
        f.write_str(s)
    }
}

/// BACnet error-class, carried alongside an `ErrorCode` inside a
/// property-level `Error` result.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorClass {
    Device,
    Object,
    Property,
    Resources,
    Security,
    Services,
    Vt,
    Communication,
    Other,
}

/// BACnet error-code. `Other` carries the raw numeric code for values this
/// crate doesn't otherwise name.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorCode {
    UnknownObject,
    UnknownProperty,
    PropertyIsNotAnArray,
    WriteAccessDenied,
    InvalidDataType,
    ValueOutOfRange,
    Other(u16),
}

/// The three ways a per-property read can fail inside an otherwise
/// successful RPM response (spec §4.D.3): an `Abort`/`Reject` propagates
/// outward and aborts the whole response; any other `Error` is encoded
/// inline and the rest of the response proceeds.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PropertyFailure {
    Abort(AbortReason),
    Reject(RejectReason),
    Error(ErrorClass, ErrorCode),
}

impl fmt::Display for PropertyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyFailure::Abort(r) => write!(f, "abort: {}", r),
            PropertyFailure::Reject(r) => write!(f, "reject: {}", r),
            PropertyFailure::Error(class, code) => write!(f, "error: {:?}/{:?}", class, code),
        }
    }
}

/// Whole-response outcome: either the response was framed successfully, or
/// assembly failed outright and must be replaced with one of Reject/Abort/
/// Error (spec §4.D "Request framing errors").
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ServiceStatus {
    Reject(RejectReason),
    Abort(AbortReason),
    Error(ErrorClass, ErrorCode),
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Reject(r) => write!(f, "reject: {}", r),
            ServiceStatus::Abort(r) => write!(f, "abort: {}", r),
            ServiceStatus::Error(class, code) => write!(f, "error: {:?}/{:?}", class, code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ServiceStatus {}

impl From<PropertyFailure> for ServiceStatus {
    fn from(f: PropertyFailure) -> Self {
        match f {
            PropertyFailure::Abort(r) => ServiceStatus::Abort(r),
            PropertyFailure::Reject(r) => ServiceStatus::Reject(r),
            PropertyFailure::Error(class, code) => ServiceStatus::Error(class, code),
        }
    }
}
