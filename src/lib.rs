//! Core transaction-layer engine for a BACnet device: the confirmed-request
//! transaction state machine (invoke-id allocation, segmentation and
//! reassembly, windowed acknowledgement flow control, retries, timeouts)
//! and the ReadPropertyMultiple response assembler.
//!
//! Datalink framing, NPDU encoding, primitive application-tag codecs, and
//! the device object database are external collaborators, modeled here as
//! traits ([`dispatch::PduSender`], [`registry::DeviceReadProperty`],
//! [`registry::ObjectPropertyList`]) rather than implemented.

pub mod address;
pub mod apdu;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod peer_map;
pub mod registry;
pub mod rpm;
pub mod seq;
pub mod segmentation;
pub mod stack;
pub mod transaction;
pub mod tsm;

pub use address::{MacAddress, PeerAddress};
pub use config::{DefaultRuntimeParams, RuntimeParams, StackConfig};
pub use error::{AbortReason, ErrorClass, ErrorCode, PropertyFailure, RejectReason, ServiceStatus};
pub use stack::Stack;
