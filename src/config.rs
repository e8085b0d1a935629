//! Compile-time knobs (spec §6) collapsed into one runtime value, and the
//! host-supplied timer parameters as a trait the way the teacher injects
//! `device_state::DeviceState` into `StackInternals`.

/// Table sizes, buffer ceilings, and feature toggles that the original C
/// stack expressed as `#define`s.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct StackConfig {
    pub max_tsm_transactions: usize,
    pub max_tsm_peers: usize,
    pub max_apdu: usize,
    pub max_pdu: usize,
    pub max_npdu: usize,
    pub max_segments_accepted: u8,
    /// `BACNET_SEGMENTATION_ENABLED`. When `false`, any segmented inbound
    /// PDU and any response that would need segmenting is answered with
    /// Abort `SegmentationNotSupported`.
    pub segmentation_enabled: bool,
    /// `BACNET_PROTOCOL_REVISION`. `>= 17` enables NETWORK_PORT indefinite
    /// instance substitution (spec §4.D).
    pub protocol_revision: u8,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            max_tsm_transactions: 8,
            max_tsm_peers: 8,
            max_apdu: 1476,
            max_pdu: 1497,
            max_npdu: 1440,
            max_segments_accepted: 64,
            segmentation_enabled: true,
            protocol_revision: 22,
        }
    }
}

impl StackConfig {
    /// `DEFAULT_WINDOW_SIZE` from `tsm.c`: the proposed window size used
    /// when this device initiates a segmented response.
    pub const DEFAULT_WINDOW_SIZE: u8 = 32;
}

/// Host-supplied timer parameters (`apdu_timeout()`, `apdu_segment_timeout()`,
/// `apdu_retries()` in the original). Modeled as a trait (spec §9 design
/// note: "function-pointer callback -> trait/interface") so a host can vary
/// them, e.g. per link speed, without the core depending on a clock source.
pub trait RuntimeParams {
    fn apdu_timeout_ms(&self) -> u32;
    fn apdu_segment_timeout_ms(&self) -> u32;
    fn apdu_retries(&self) -> u8;
}

/// Reference defaults matching the bacnet-stack reference implementation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DefaultRuntimeParams;

impl RuntimeParams for DefaultRuntimeParams {
    fn apdu_timeout_ms(&self) -> u32 {
        3000
    }
    fn apdu_segment_timeout_ms(&self) -> u32 {
        3000
    }
    fn apdu_retries(&self) -> u8 {
        3
    }
}
