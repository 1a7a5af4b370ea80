//! OBD-II Response Decoder
//!
//! Validates mode 01 (current data) response payloads and decodes the
//! supported PIDs into physical values. Also provides a response simulator
//! that encodes signal values back into response frames.

mod pid;
mod response;
mod sample;
pub mod simulator;

pub use pid::{Pid, UnsupportedPid};
pub use response::{decode, decode_raw, extract_response_bytes, ResponseBytes};
pub use sample::{ObdSample, Unit};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Positive response to current data
    pub const CURRENT_DATA_RESPONSE: u8 = 0x41;
}
