//! Driver Error Types

use thiserror::Error;

/// Errors raised by the Grove CAN driver.
///
/// Timeouts are not errors: they surface as [`crate::PollStatus::TimedOut`]
/// (or `Ok(false)` / `Ok(None)` from the blocking wrappers) so the caller
/// decides whether to retry.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Read or write on the serial transport failed
    #[error("Serial transport error: {0}")]
    Transport(String),

    /// Serial port could not be opened
    #[error("Serial port error: {0}")]
    Serial(String),

    /// A configuration response did not fit the scratch buffer
    #[error("Response length exceeded scratch capacity of {capacity} bytes")]
    LengthExceeded { capacity: usize },

    /// The receive stream never went quiet while draining
    #[error("Buffer drain exceeded limits after {bytes} bytes in {elapsed_ms}ms")]
    DrainExceeded { bytes: usize, elapsed_ms: u64 },

    /// CAN payloads carry at most 8 bytes
    #[error("Payload length {0} exceeds 8 bytes")]
    PayloadTooLong(usize),

    /// Configuration line does not fit the command buffer
    #[error("Command of {0} bytes exceeds command capacity")]
    CommandTooLong(usize),

    /// Mask or filter slot does not exist on the module
    #[error("{kind} index {index} out of range (max {max})")]
    InvalidFilterIndex {
        kind: &'static str,
        index: u8,
        max: u8,
    },

    /// Configuration script does not fit the step queue
    #[error("Configuration script of {steps} steps exceeds {max}")]
    ScriptTooLong { steps: usize, max: usize },

    /// Another operation already owns the receive stream
    #[error("Driver busy: another operation is in flight")]
    Busy,
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for DriverError {
    fn from(err: tokio_serial::Error) -> Self {
        DriverError::Serial(err.to_string())
    }
}
