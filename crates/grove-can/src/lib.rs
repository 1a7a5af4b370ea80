//! Grove CAN Bus Module Driver
//!
//! This crate speaks the serial protocol of the Grove CAN bus module: a
//! textual AT-command configuration session (`+++`, `AT+C=..`, `AT+Q`) and a
//! fixed-layout binary frame transport. Every wait is a non-blocking poll
//! against an injected clock; blocking and async wrappers are layered on top.

mod command;
mod config;
mod driver;
mod error;
mod frame;
mod poll;
mod rate;
mod session;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use command::{ConfigCommand, COMMAND_TERMINATOR, ESCAPE_SEQUENCE};
pub use config::{DriverConfig, ObdAddressing, OBD_REQUEST_ID_11BIT, OBD_REQUEST_ID_29BIT};
pub use driver::GroveCan;
pub use error::DriverError;
pub use frame::{CanFrame, FRAME_LEN, MAX_PAYLOAD};
pub use poll::PollStatus;
pub use rate::CanRate;
pub use session::SCRATCH_CAPACITY;
pub use transport::{Clock, SerialTransport, StdClock, Transport};
