//! Grove CAN bus module driver
//!
//! Owns the serial transport, the clock and the response scratch buffer.
//! Configuration operations run one at a time as the driver's in-flight
//! operation; frame traffic is refused while one is active because both
//! consume the same receive stream.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::ConfigCommand;
use crate::config::{DriverConfig, ObdAddressing};
use crate::error::DriverError;
use crate::frame::{CanFrame, FrameWindow};
use crate::poll::PollStatus;
use crate::rate::CanRate;
use crate::session::{ConfigOp, Link, Scratch};
use crate::transport::{Clock, Transport};

/// Pause between polls in [`GroveCan::finish`]
const ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Driver for the Grove serial CAN bus module
pub struct GroveCan<T, C> {
    transport: T,
    clock: C,
    config: DriverConfig,
    scratch: Scratch,
    /// In-flight configuration operation
    pending: Option<ConfigOp>,
    /// Partially received frame
    window: Option<FrameWindow>,
}

impl<T: Transport, C: Clock> GroveCan<T, C> {
    /// Create a driver over an opened transport
    pub fn new(transport: T, clock: C, config: DriverConfig) -> Self {
        info!(
            "Grove CAN driver ready ({:?} addressing, frame idle {}ms)",
            config.addressing, config.frame_idle_timeout_ms
        );
        Self {
            transport,
            clock,
            config,
            scratch: Scratch::new(),
            pending: None,
            window: None,
        }
    }

    /// Driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// OBD-II addressing chosen at construction
    pub fn addressing(&self) -> ObdAddressing {
        self.config.addressing
    }

    /// Injected clock
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether a configuration operation is in flight
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Bytes received in reply to the last configuration command
    pub fn last_response(&self) -> &[u8] {
        &self.scratch
    }

    /// Release the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ---- configuration session: non-blocking -------------------------------

    /// Start entering configuration mode
    pub fn begin_enter_config_mode(&mut self) -> Result<(), DriverError> {
        self.begin(ConfigOp::enter()?)
    }

    /// Start leaving configuration mode
    pub fn begin_exit_config_mode(&mut self) -> Result<(), DriverError> {
        self.begin(ConfigOp::exit()?)
    }

    /// Start a single command round trip
    pub fn begin_command(&mut self, command: ConfigCommand) -> Result<(), DriverError> {
        self.begin(ConfigOp::command(command)?)
    }

    /// Start discarding stale input
    pub fn begin_clear_buffer(&mut self) -> Result<(), DriverError> {
        self.begin(ConfigOp::clear()?)
    }

    /// Start setting the bus rate
    pub fn begin_set_can_rate(&mut self, rate: CanRate) -> Result<(), DriverError> {
        self.begin(ConfigOp::transaction(
            "set CAN rate",
            ConfigCommand::set_rate(rate)?,
        )?)
    }

    /// Start programming acceptance mask `index`
    pub fn begin_set_filter_mask(
        &mut self,
        index: u8,
        extended: bool,
        value: u32,
    ) -> Result<(), DriverError> {
        let command = ConfigCommand::set_mask(index, extended, value)?;
        self.begin(ConfigOp::transaction("set filter mask", command)?)
    }

    /// Start programming acceptance filter `index`
    pub fn begin_set_filter(
        &mut self,
        index: u8,
        extended: bool,
        value: u32,
    ) -> Result<(), DriverError> {
        let command = ConfigCommand::set_filter(index, extended, value)?;
        self.begin(ConfigOp::transaction("set filter", command)?)
    }

    /// Start restricting reception to OBD-II response identifiers
    pub fn begin_configure_obd_filters(&mut self) -> Result<(), DriverError> {
        let (mask, filter) = self.config.addressing.response_filter();
        let extended = self.config.addressing.is_extended();
        self.begin(ConfigOp::transaction_pair(
            "configure OBD filters",
            ConfigCommand::set_mask(0, extended, mask)?,
            ConfigCommand::set_filter(0, extended, filter)?,
        )?)
    }

    /// Advance the in-flight operation. `Ready` means every command was
    /// acknowledged, `TimedOut` that at least one was not. With nothing in
    /// flight this reports `Ready`.
    ///
    /// Transport and bound errors end the operation.
    pub fn poll(&mut self) -> Result<PollStatus<()>, DriverError> {
        let Some(op) = self.pending.as_mut() else {
            return Ok(PollStatus::Ready(()));
        };

        let mut link = Link {
            transport: &mut self.transport,
            clock: &self.clock,
            config: &self.config,
            scratch: &mut self.scratch,
        };
        let result = op.poll(&mut link);

        match &result {
            Ok(PollStatus::Pending) => {}
            Ok(status) => {
                debug!("{} finished: {:?}", op.name(), status);
                self.pending = None;
            }
            Err(e) => {
                warn!("{} failed: {}", op.name(), e);
                self.pending = None;
            }
        }
        result
    }

    /// Clock instant at which the current wait expires unless another byte
    /// arrives
    pub fn deadline_ms(&self) -> Option<u64> {
        if let Some(op) = &self.pending {
            return op.deadline_ms(&self.config);
        }
        self.window
            .as_ref()
            .map(|window| window.deadline_ms(self.config.frame_idle_timeout_ms))
    }

    /// Abandon the in-flight operation and any partial frame. Returns
    /// whether anything was cancelled.
    pub fn cancel(&mut self) -> bool {
        let cancelled_op = self.pending.take();
        let cancelled_window = self.window.take();
        if let Some(op) = &cancelled_op {
            info!("Cancelled {}", op.name());
        }
        cancelled_op.is_some() || cancelled_window.is_some()
    }

    /// Drive the in-flight operation from an async task, yielding between
    /// polls. Returns whether every command was acknowledged.
    pub async fn finish(&mut self) -> Result<bool, DriverError> {
        loop {
            match self.poll()? {
                PollStatus::Pending => tokio::time::sleep(ASYNC_POLL_INTERVAL).await,
                PollStatus::Ready(()) => return Ok(true),
                PollStatus::TimedOut => return Ok(false),
            }
        }
    }

    // ---- configuration session: blocking ------------------------------------

    /// Enter configuration mode. The module never acknowledges this, so it
    /// always reports `true`.
    pub fn enter_config_mode(&mut self) -> Result<bool, DriverError> {
        self.begin_enter_config_mode()?;
        self.block()
    }

    /// Leave configuration mode; `true` when `AT+Q` was acknowledged
    pub fn exit_config_mode(&mut self) -> Result<bool, DriverError> {
        self.begin_exit_config_mode()?;
        self.block()
    }

    /// Send one command line; `true` when `OK\r\n` arrived before the idle
    /// timeout
    pub fn send_command(&mut self, line: &str) -> Result<bool, DriverError> {
        self.begin_command(ConfigCommand::new(line)?)?;
        self.block()
    }

    /// Set the bus rate; `true` when both the rate command and the exit were
    /// acknowledged
    pub fn set_can_rate(&mut self, rate: CanRate) -> Result<bool, DriverError> {
        info!("Setting CAN rate to {} bit/s", rate.bits_per_second());
        self.begin_set_can_rate(rate)?;
        self.block()
    }

    /// Program acceptance mask `index` (0-1)
    pub fn set_filter_mask(
        &mut self,
        index: u8,
        extended: bool,
        value: u32,
    ) -> Result<bool, DriverError> {
        self.begin_set_filter_mask(index, extended, value)?;
        self.block()
    }

    /// Program acceptance filter `index` (0-5)
    pub fn set_filter(&mut self, index: u8, extended: bool, value: u32) -> Result<bool, DriverError> {
        self.begin_set_filter(index, extended, value)?;
        self.block()
    }

    /// Restrict reception to OBD-II response identifiers
    pub fn configure_obd_filters(&mut self) -> Result<bool, DriverError> {
        self.begin_configure_obd_filters()?;
        self.block()
    }

    /// Discard input until the line has been quiet for the drain window
    pub fn clear_buffer(&mut self) -> Result<(), DriverError> {
        self.begin_clear_buffer()?;
        self.block().map(|_| ())
    }

    // ---- frame codec ---------------------------------------------------------

    /// Send a frame built from parts; payloads over 8 bytes are rejected
    /// before anything is written
    pub fn send(
        &mut self,
        id: u32,
        extended: bool,
        rtr: bool,
        payload: &[u8],
    ) -> Result<(), DriverError> {
        let frame = CanFrame::new(id, extended, rtr, payload)?;
        self.send_frame(&frame)
    }

    /// Write one frame record
    pub fn send_frame(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        self.ensure_idle()?;
        debug!(
            "TX id={:08X} ext={} rtr={} data={:02X?}",
            frame.id(),
            frame.is_extended(),
            frame.is_rtr(),
            frame.data()
        );
        self.transport.write_bytes(&frame.encode())?;
        Ok(())
    }

    /// Send a mode-1 query for `pid` to the functional request id
    pub fn send_obd_query(&mut self, pid: u8) -> Result<(), DriverError> {
        let frame = CanFrame::obd_query(self.config.addressing, pid);
        self.send_frame(&frame)
    }

    /// Poll for an incoming frame without blocking.
    ///
    /// `Pending` when nothing has arrived yet or a record is still filling,
    /// `Ready` once a full record is in, `TimedOut` when a partial record
    /// went idle (its bytes are discarded).
    pub fn poll_frame(&mut self) -> Result<PollStatus<CanFrame>, DriverError> {
        self.ensure_idle()?;

        if self.window.is_none() {
            if !self.transport.bytes_available()? {
                return Ok(PollStatus::Pending);
            }
            self.window = Some(FrameWindow::new(self.clock.now_ms()));
        }

        let timeout_ms = self.config.frame_idle_timeout_ms;
        let Some(window) = self.window.as_mut() else {
            return Ok(PollStatus::Pending);
        };
        let status = window.poll(&mut self.transport, &self.clock, timeout_ms);

        match &status {
            Ok(PollStatus::Ready(frame)) => {
                debug!("RX id={:08X} data={:02X?}", frame.id(), frame.data());
                self.window = None;
            }
            Ok(PollStatus::TimedOut) => {
                warn!(
                    "Discarding partial frame ({} bytes) after {}ms idle",
                    window.filled(),
                    timeout_ms
                );
                self.window = None;
            }
            Ok(PollStatus::Pending) => {}
            Err(_) => self.window = None,
        }
        status
    }

    /// Receive one frame. Returns `None` immediately when no byte is
    /// available, and `None` when a started record goes idle.
    pub fn receive(&mut self) -> Result<Option<CanFrame>, DriverError> {
        self.ensure_idle()?;
        if self.window.is_none() && !self.transport.bytes_available()? {
            return Ok(None);
        }

        loop {
            match self.poll_frame()? {
                PollStatus::Pending => std::hint::spin_loop(),
                PollStatus::Ready(frame) => return Ok(Some(frame)),
                PollStatus::TimedOut => return Ok(None),
            }
        }
    }

    // ---- internals -----------------------------------------------------------

    fn begin(&mut self, op: ConfigOp) -> Result<(), DriverError> {
        if self.pending.is_some() || self.window.is_some() {
            return Err(DriverError::Busy);
        }
        debug!("Starting {}", op.name());
        self.pending = Some(op);
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), DriverError> {
        if self.pending.is_some() {
            return Err(DriverError::Busy);
        }
        Ok(())
    }

    fn block(&mut self) -> Result<bool, DriverError> {
        loop {
            match self.poll()? {
                PollStatus::Pending => std::hint::spin_loop(),
                PollStatus::Ready(()) => return Ok(true),
                PollStatus::TimedOut => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FRAME_LEN;
    use crate::mock::{MockClock, MockHandle, MockTransport};

    fn driver(config: DriverConfig) -> (GroveCan<MockTransport, MockClock>, MockHandle, MockClock) {
        let (transport, handle) = MockTransport::new();
        let clock = MockClock::auto_advance(1);
        (GroveCan::new(transport, clock.clone(), config), handle, clock)
    }

    #[test]
    fn test_send_command_times_out_without_reply() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        assert!(!can.send_command("AT+C=16").unwrap());
        assert_eq!(handle.written(), b"AT+C=16\r\n".to_vec());
        assert!(!can.is_busy());
    }

    #[test]
    fn test_send_command_acknowledged() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.ack_commands();
        assert!(can.send_command("AT+C=16").unwrap());
        assert_eq!(can.last_response(), b"OK\r\n");
    }

    #[test]
    fn test_enter_config_mode_always_succeeds() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.push_incoming(b"garbage");
        assert!(can.enter_config_mode().unwrap());
        assert_eq!(handle.written(), b"+++".to_vec());
        assert_eq!(handle.pending_incoming(), 0);
    }

    #[test]
    fn test_exit_config_mode_sends_quit() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.ack_commands();
        assert!(can.exit_config_mode().unwrap());
        assert_eq!(handle.lines(), vec!["AT+Q".to_string()]);
    }

    #[test]
    fn test_set_can_rate_round_trip() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.ack_commands();
        assert!(can.set_can_rate(CanRate::Kbps500).unwrap());
        assert_eq!(
            handle.written(),
            b"+++AT+C=16\r\nAT+Q\r\n".to_vec()
        );
    }

    #[test]
    fn test_set_can_rate_reports_exit_failure() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        // acknowledge the rate command but not the quit
        handle.set_responder(|written| {
            if written.starts_with(b"AT+C") {
                b"OK\r\n".to_vec()
            } else {
                Vec::new()
            }
        });
        assert!(!can.set_can_rate(CanRate::Kbps250).unwrap());
        // quit is still attempted after a failed command
        assert_eq!(handle.lines(), vec!["AT+C=15".to_string(), "AT+Q".to_string()]);
    }

    #[test]
    fn test_filter_commands() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.ack_commands();
        assert!(can.set_filter_mask(1, false, 0x7FF).unwrap());
        assert!(can.set_filter(3, true, 0x18DAF110).unwrap());
        assert_eq!(
            handle.lines(),
            vec![
                "AT+M=[1][0][000007FF]".to_string(),
                "AT+Q".to_string(),
                "AT+F=[3][1][18DAF110]".to_string(),
                "AT+Q".to_string(),
            ]
        );
        assert!(matches!(
            can.set_filter(6, false, 0),
            Err(DriverError::InvalidFilterIndex { .. })
        ));
    }

    #[test]
    fn test_configure_obd_filters_29bit() {
        let (mut can, handle, _clock) = driver(DriverConfig::extended());
        handle.ack_commands();
        assert!(can.configure_obd_filters().unwrap());
        assert_eq!(
            handle.lines(),
            vec![
                "AT+M=[0][1][1FFFFF00]".to_string(),
                "AT+F=[0][1][18DAF100]".to_string(),
                "AT+Q".to_string(),
            ]
        );
    }

    #[test]
    fn test_clear_buffer_repeated() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        for _ in 0..3 {
            handle.push_incoming(b"stale bytes");
            can.clear_buffer().unwrap();
            assert_eq!(handle.pending_incoming(), 0);
        }
        // nothing pending at all still terminates
        can.clear_buffer().unwrap();
    }

    #[test]
    fn test_clear_buffer_bounded_on_endless_input() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.set_endless(Some(0xAA));
        assert!(matches!(
            can.clear_buffer(),
            Err(DriverError::DrainExceeded { .. })
        ));
        assert!(!can.is_busy());
    }

    #[test]
    fn test_send_rejects_long_payload() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        assert!(matches!(
            can.send(0x123, false, false, &[0u8; 9]),
            Err(DriverError::PayloadTooLong(9))
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_send_writes_fixed_record() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        can.send(0x0000_01AB, false, false, &[1, 2, 3]).unwrap();
        let written = handle.written();
        assert_eq!(written.len(), FRAME_LEN);
        assert_eq!(&written[..4], &[0x00, 0x00, 0x01, 0xAB]);
        assert_eq!(&written[6..9], &[1, 2, 3]);
    }

    #[test]
    fn test_send_obd_query_uses_addressing() {
        let (mut can, handle, _clock) = driver(DriverConfig::extended());
        can.send_obd_query(0x0D).unwrap();
        let written = handle.written();
        assert_eq!(&written[..4], &0x18DB33F1u32.to_be_bytes());
        assert_eq!(written[4], 1);
        assert_eq!(written[5], 0);
        assert_eq!(&written[6..], &[0x02, 0x01, 0x0D, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_receive_without_data_returns_immediately() {
        let (mut can, _handle, clock) = driver(DriverConfig::default());
        let before = clock.peek();
        assert_eq!(can.receive().unwrap(), None);
        assert_eq!(clock.peek(), before);
    }

    #[test]
    fn test_receive_full_frame() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        let frame = CanFrame::new(0x7E8, false, false, &[0x03, 0x41, 0x0D, 0x32]).unwrap();
        handle.push_incoming(&frame.encode());
        let received = can.receive().unwrap().unwrap();
        assert_eq!(received.id(), 0x7E8);
        assert_eq!(&received.data()[..4], &[0x03, 0x41, 0x0D, 0x32]);
    }

    #[test]
    fn test_receive_recovers_flags() {
        let (mut can, handle, _clock) = driver(DriverConfig::extended());
        let frame = CanFrame::new(0x18DAF110, true, true, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]).unwrap();
        handle.push_incoming(&frame.encode());

        let received = can.receive().unwrap().unwrap();
        assert_eq!(received.id(), 0x18DAF110);
        assert!(received.is_extended());
        assert!(received.is_rtr());
        assert_eq!(&received.data()[..5], &[0x04, 0x41, 0x0C, 0x1A, 0xF8]);
        assert_eq!(handle.pending_incoming(), 0);
    }

    #[test]
    fn test_receive_partial_frame_discarded() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.push_incoming(&[0x00, 0x00, 0x07, 0xE8, 0x00]);
        assert_eq!(can.receive().unwrap(), None);
        assert_eq!(can.deadline_ms(), None);
    }

    #[test]
    fn test_frame_traffic_refused_while_configuring() {
        let (mut can, _handle, _clock) = driver(DriverConfig::default());
        can.begin_set_can_rate(CanRate::Kbps500).unwrap();
        assert!(can.is_busy());
        assert!(matches!(can.send(0x123, false, false, &[]), Err(DriverError::Busy)));
        assert!(matches!(can.poll_frame(), Err(DriverError::Busy)));
        assert!(matches!(can.begin_clear_buffer(), Err(DriverError::Busy)));

        assert!(can.cancel());
        assert!(!can.is_busy());
        assert!(!can.cancel());
        can.send(0x123, false, false, &[]).unwrap();
    }

    #[test]
    fn test_poll_exposes_deadline() {
        let (transport, handle) = MockTransport::new();
        let clock = MockClock::new();
        let mut can = GroveCan::new(transport, clock.clone(), DriverConfig::default());

        can.begin_command(ConfigCommand::quit().unwrap()).unwrap();
        assert_eq!(can.poll().unwrap(), PollStatus::Pending);
        assert_eq!(can.deadline_ms(), Some(500));

        clock.advance(501);
        assert_eq!(can.poll().unwrap(), PollStatus::TimedOut);
        assert_eq!(can.deadline_ms(), None);
        assert_eq!(handle.lines(), vec!["AT+Q".to_string()]);
    }

    #[test]
    fn test_transport_error_ends_operation() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.fail_writes(true);
        assert!(matches!(
            can.send_command("AT+Q"),
            Err(DriverError::Transport(_))
        ));
        assert!(!can.is_busy());
    }

    #[tokio::test]
    async fn test_finish_drives_operation() {
        let (mut can, handle, _clock) = driver(DriverConfig::default());
        handle.ack_commands();
        can.begin_set_can_rate(CanRate::Kbps125).unwrap();
        assert!(can.finish().await.unwrap());
        assert_eq!(handle.lines(), vec!["AT+C=13".to_string(), "AT+Q".to_string()]);
    }
}
