//! Mode 01 response validation and decoding

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mode::CURRENT_DATA_RESPONSE;
use crate::pid::Pid;
use crate::sample::ObdSample;

/// Shortest payload that can carry a mode 01 response:
/// `[length, 0x41, pid, A]`
const MIN_RESPONSE_LEN: usize = 4;

/// Data bytes A, B and C of a validated response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBytes {
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

/// Validate a response payload for `pid` and extract its data bytes.
///
/// Payload layout is `[length, 0x41, pid, A, B, C, ..]`. Requires at least
/// four bytes, the positive-response marker and a matching PID echo. Data
/// bytes beyond the payload read as 0. Returns `None` on any mismatch.
pub fn extract_response_bytes(payload: &[u8], pid: u8) -> Option<ResponseBytes> {
    if payload.len() < MIN_RESPONSE_LEN {
        return None;
    }
    if payload[1] != CURRENT_DATA_RESPONSE || payload[2] != pid {
        return None;
    }

    let byte = |i: usize| payload.get(i).copied().unwrap_or(0);
    Some(ResponseBytes {
        a: byte(3),
        b: byte(4),
        c: byte(5),
    })
}

/// Decode a response payload for `pid`; invalid responses yield an invalid
/// sample carrying the PID's unit
pub fn decode(pid: Pid, payload: &[u8]) -> ObdSample {
    match extract_response_bytes(payload, pid.as_hex()) {
        Some(bytes) => ObdSample::new(pid.evaluate(bytes), pid.unit()),
        None => {
            debug!("Rejected response for PID {:02X}: {:02X?}", pid.as_hex(), payload);
            ObdSample::invalid(pid.unit())
        }
    }
}

/// Decode by raw PID byte; `None` when the PID is not supported
pub fn decode_raw(pid: u8, payload: &[u8]) -> Option<ObdSample> {
    Pid::try_from(pid).ok().map(|pid| decode(pid, payload))
}
