//! Byte transport and clock capabilities
//!
//! The driver never touches hardware directly: it reads and writes through a
//! [`Transport`] and measures idle gaps against a [`Clock`]. Both are
//! injected at construction so tests can substitute in-memory versions.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::DriverError;

/// Line terminator appended by [`Transport::write_line`]
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Non-blocking byte source/sink attached to the CAN module
pub trait Transport {
    /// Whether at least one byte can be read without blocking
    fn bytes_available(&mut self) -> io::Result<bool>;

    /// Read one byte, or `None` when nothing is pending
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write raw bytes
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Write a text line followed by CR-LF
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.write_bytes(line.as_bytes())?;
        self.write_bytes(LINE_TERMINATOR)
    }
}

/// Monotonic millisecond time source
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;

    /// Milliseconds elapsed since `earlier`
    fn elapsed_ms(&self, earlier: u64) -> u64 {
        self.now_ms().saturating_sub(earlier)
    }
}

/// Clock backed by [`std::time::Instant`]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Read timeout used for the underlying port; reads are only issued when
/// bytes are already pending, so this only guards against a stalled driver
const PORT_READ_TIMEOUT_MS: u64 = 10;

/// Transport over a host serial port
pub struct SerialTransport {
    /// Device path, kept for diagnostics
    device: String,
    port: Box<dyn tokio_serial::SerialPort>,
}

impl SerialTransport {
    /// Open a serial device (e.g. "/dev/ttyUSB0" or "COM3")
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, DriverError> {
        info!("Opening serial transport {} at {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate)
            .timeout(Duration::from_millis(PORT_READ_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            device: device.to_string(),
            port,
        })
    }

    /// Device path this transport was opened on
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<bool> {
        Ok(self.port.bytes_to_read()? > 0)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if !self.bytes_available()? {
            return Ok(None);
        }

        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_std_clock_is_monotonic() {
        let clock = StdClock::new();
        let first = clock.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now_ms() >= first + 5);
        assert!(clock.elapsed_ms(first) >= 5);
    }

    #[test]
    fn test_elapsed_saturates() {
        let clock = StdClock::new();
        assert_eq!(clock.elapsed_ms(u64::MAX), 0);
    }
}
