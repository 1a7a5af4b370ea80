//! Driver configuration

use serde::{Deserialize, Serialize};

/// OBD-II functional request identifier, 11-bit addressing
pub const OBD_REQUEST_ID_11BIT: u32 = 0x7DF;
/// OBD-II functional request identifier, 29-bit addressing
pub const OBD_REQUEST_ID_29BIT: u32 = 0x18DB_33F1;

const OBD_RESPONSE_MASK_11BIT: u32 = 0x7F8;
const OBD_RESPONSE_BASE_11BIT: u32 = 0x7E8;
const OBD_RESPONSE_MASK_29BIT: u32 = 0x1FFF_FF00;
const OBD_RESPONSE_BASE_29BIT: u32 = 0x18DA_F100;

/// OBD-II request addressing, fixed for the lifetime of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObdAddressing {
    /// 11-bit identifiers (request 0x7DF, responses 0x7E8-0x7EF)
    #[serde(rename = "11bit")]
    Standard11Bit,
    /// 29-bit identifiers (request 0x18DB33F1, responses 0x18DAF1xx)
    #[serde(rename = "29bit")]
    Extended29Bit,
}

impl ObdAddressing {
    /// Functional request identifier
    pub fn request_id(&self) -> u32 {
        match self {
            ObdAddressing::Standard11Bit => OBD_REQUEST_ID_11BIT,
            ObdAddressing::Extended29Bit => OBD_REQUEST_ID_29BIT,
        }
    }

    /// Whether frames use the extended identifier flag
    pub fn is_extended(&self) -> bool {
        matches!(self, ObdAddressing::Extended29Bit)
    }

    /// Acceptance `(mask, filter)` pair matching every ECU response id
    pub fn response_filter(&self) -> (u32, u32) {
        match self {
            ObdAddressing::Standard11Bit => (OBD_RESPONSE_MASK_11BIT, OBD_RESPONSE_BASE_11BIT),
            ObdAddressing::Extended29Bit => (OBD_RESPONSE_MASK_29BIT, OBD_RESPONSE_BASE_29BIT),
        }
    }

    /// Whether `id` is an ECU response identifier for this addressing mode
    pub fn is_response_id(&self, id: u32) -> bool {
        let (mask, filter) = self.response_filter();
        id & mask == filter
    }
}

impl Default for ObdAddressing {
    fn default() -> Self {
        ObdAddressing::Standard11Bit
    }
}

/// Timing and addressing options for [`crate::GroveCan`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// OBD-II request addressing
    pub addressing: ObdAddressing,

    /// Idle wait for the `OK\r\n` terminator after a command (milliseconds)
    pub command_timeout_ms: u64,

    /// Quiet period that ends a buffer drain (milliseconds)
    pub drain_quiet_ms: u64,

    /// Upper bound on a single drain (milliseconds)
    pub drain_limit_ms: u64,

    /// Upper bound on bytes discarded by a single drain
    pub drain_byte_limit: usize,

    /// Idle wait between bytes of an incoming frame (milliseconds)
    pub frame_idle_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            addressing: ObdAddressing::Standard11Bit,
            command_timeout_ms: 500,
            drain_quiet_ms: 50,
            drain_limit_ms: 1000,
            drain_byte_limit: 1024,
            frame_idle_timeout_ms: 10,
        }
    }
}

impl DriverConfig {
    /// Default timings with 29-bit OBD addressing
    pub fn extended() -> Self {
        Self {
            addressing: ObdAddressing::Extended29Bit,
            ..Default::default()
        }
    }
}
