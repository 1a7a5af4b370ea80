//! Binary CAN frame layout
//!
//! Frames cross the serial link as fixed 14-byte records with no delimiter
//! or checksum:
//!
//! ```text
//! [0..4]  identifier, big-endian
//! [4]     extended-id flag (0/1)
//! [5]     RTR flag (0/1)
//! [6..14] payload, zero padded to 8 bytes
//! ```
//!
//! The same layout is used in both directions so the flags survive a
//! receive.

use crate::config::ObdAddressing;
use crate::error::DriverError;
use crate::poll::PollStatus;
use crate::transport::{Clock, Transport};

/// Size of one frame record on the wire
pub const FRAME_LEN: usize = 14;
/// Maximum classic CAN payload
pub const MAX_PAYLOAD: usize = 8;

/// OBD-II service 01 (current data) request
const OBD_MODE_CURRENT_DATA: u8 = 0x01;

/// A classic CAN data or remote frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u32,
    extended: bool,
    rtr: bool,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl CanFrame {
    /// Build a frame, rejecting payloads longer than 8 bytes
    pub fn new(id: u32, extended: bool, rtr: bool, payload: &[u8]) -> Result<Self, DriverError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(DriverError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            extended,
            rtr,
            len: payload.len() as u8,
            data,
        })
    }

    /// Mode-1 query for `pid`, addressed to the functional request id
    pub fn obd_query(addressing: ObdAddressing, pid: u8) -> Self {
        Self {
            id: addressing.request_id(),
            extended: addressing.is_extended(),
            rtr: false,
            len: MAX_PAYLOAD as u8,
            data: [0x02, OBD_MODE_CURRENT_DATA, pid, 0, 0, 0, 0, 0],
        }
    }

    /// Identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Extended (29-bit) identifier flag
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Remote transmission request flag
    pub fn is_rtr(&self) -> bool {
        self.rtr
    }

    /// Payload length (0-8)
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Serialize into a wire record
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut record = [0u8; FRAME_LEN];
        record[..4].copy_from_slice(&self.id.to_be_bytes());
        record[4] = u8::from(self.extended);
        record[5] = u8::from(self.rtr);
        record[6..].copy_from_slice(&self.data);
        record
    }

    /// Parse a wire record. The length is not carried on the wire, so
    /// received frames always report 8 payload bytes.
    pub fn decode(record: &[u8; FRAME_LEN]) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        data.copy_from_slice(&record[6..]);
        Self {
            id: u32::from_be_bytes([record[0], record[1], record[2], record[3]]),
            extended: record[4] != 0,
            rtr: record[5] != 0,
            len: MAX_PAYLOAD as u8,
            data,
        }
    }
}

/// Incoming frame accumulator with an idle timeout
#[derive(Debug)]
pub(crate) struct FrameWindow {
    record: [u8; FRAME_LEN],
    filled: usize,
    last_byte_ms: u64,
}

impl FrameWindow {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self {
            record: [0u8; FRAME_LEN],
            filled: 0,
            last_byte_ms: now_ms,
        }
    }

    /// Bytes collected so far
    pub(crate) fn filled(&self) -> usize {
        self.filled
    }

    /// Instant at which the window is abandoned if no byte arrives
    pub(crate) fn deadline_ms(&self, idle_timeout_ms: u64) -> u64 {
        self.last_byte_ms.saturating_add(idle_timeout_ms)
    }

    pub(crate) fn poll<T: Transport, C: Clock>(
        &mut self,
        transport: &mut T,
        clock: &C,
        idle_timeout_ms: u64,
    ) -> Result<PollStatus<CanFrame>, DriverError> {
        while self.filled < FRAME_LEN {
            match transport.read_byte()? {
                Some(byte) => {
                    self.record[self.filled] = byte;
                    self.filled += 1;
                    self.last_byte_ms = clock.now_ms();
                }
                None => break,
            }
        }

        if self.filled == FRAME_LEN {
            return Ok(PollStatus::Ready(CanFrame::decode(&self.record)));
        }
        if clock.elapsed_ms(self.last_byte_ms) > idle_timeout_ms {
            return Ok(PollStatus::TimedOut);
        }
        Ok(PollStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClock, MockTransport};
    use proptest::prelude::*;

    #[test]
    fn test_encode_big_endian_id() {
        let frame = CanFrame::new(0x0000_01AB, false, false, &[0xDE, 0xAD]).unwrap();
        let record = frame.encode();
        assert_eq!(&record[..4], &[0x00, 0x00, 0x01, 0xAB]);
        assert_eq!(record[4], 0);
        assert_eq!(record[5], 0);
        assert_eq!(&record[6..8], &[0xDE, 0xAD]);
        assert!(record[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_flags_survive_decode() {
        let frame = CanFrame::new(0x18DB33F1, true, true, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let decoded = CanFrame::decode(&frame.encode());
        assert_eq!(decoded, frame);
        assert!(decoded.is_extended());
        assert!(decoded.is_rtr());
    }

    #[test]
    fn test_payload_too_long() {
        assert!(matches!(
            CanFrame::new(0x123, false, false, &[0u8; 9]),
            Err(DriverError::PayloadTooLong(9))
        ));
    }

    #[test]
    fn test_obd_query_layout() {
        let frame = CanFrame::obd_query(ObdAddressing::Standard11Bit, 0x0C);
        assert_eq!(frame.id(), 0x7DF);
        assert!(!frame.is_extended());
        assert!(!frame.is_rtr());
        assert_eq!(frame.data(), &[0x02, 0x01, 0x0C, 0, 0, 0, 0, 0]);

        let frame = CanFrame::obd_query(ObdAddressing::Extended29Bit, 0x0D);
        assert_eq!(frame.id(), 0x18DB33F1);
        assert!(frame.is_extended());
    }

    #[test]
    fn test_window_times_out_on_partial_record() {
        let (mut transport, handle) = MockTransport::new();
        let clock = MockClock::new();
        handle.push_incoming(&[0x00, 0x00, 0x07]);

        let mut window = FrameWindow::new(clock.now_ms());
        assert_eq!(window.poll(&mut transport, &clock, 10).unwrap(), PollStatus::Pending);
        assert_eq!(window.filled(), 3);

        clock.advance(10);
        assert_eq!(window.poll(&mut transport, &clock, 10).unwrap(), PollStatus::Pending);
        clock.advance(1);
        assert_eq!(window.poll(&mut transport, &clock, 10).unwrap(), PollStatus::TimedOut);
    }

    #[test]
    fn test_window_stops_at_record_boundary() {
        let (mut transport, handle) = MockTransport::new();
        let clock = MockClock::new();
        let first = CanFrame::new(0x7E8, false, false, &[0x04, 0x41, 0x0D, 50]).unwrap();
        let second = CanFrame::new(0x7E9, false, false, &[]).unwrap();
        handle.push_incoming(&first.encode());
        handle.push_incoming(&second.encode());

        let mut window = FrameWindow::new(clock.now_ms());
        let frame = window.poll(&mut transport, &clock, 10).unwrap().ready().unwrap();
        assert_eq!(frame.id(), 0x7E8);
        assert_eq!(&frame.data()[..4], &[0x04, 0x41, 0x0D, 50]);
        assert_eq!(handle.pending_incoming(), FRAME_LEN);
    }

    proptest! {
        #[test]
        fn prop_payload_length_enforced(
            id in any::<u32>(),
            payload in proptest::collection::vec(any::<u8>(), 0..16),
        ) {
            match CanFrame::new(id, false, false, &payload) {
                Ok(frame) => {
                    prop_assert!(payload.len() <= MAX_PAYLOAD);
                    let record = frame.encode();
                    prop_assert_eq!(&record[..4], &id.to_be_bytes()[..]);
                    prop_assert_eq!(&record[6..6 + payload.len()], &payload[..]);
                    prop_assert!(record[6 + payload.len()..].iter().all(|b| *b == 0));
                }
                Err(DriverError::PayloadTooLong(len)) => prop_assert!(len > MAX_PAYLOAD),
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
        }
    }
}
