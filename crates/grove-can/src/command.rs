//! AT configuration command lines

use std::fmt::{self, Write};

use crate::error::DriverError;
use crate::rate::CanRate;

/// Capacity of a single command line, terminator excluded
pub const COMMAND_CAPACITY: usize = 32;

/// Sequence that switches the module into configuration mode
pub const ESCAPE_SEQUENCE: &[u8] = b"+++";

/// Reply that acknowledges a configuration command
pub const COMMAND_TERMINATOR: &[u8; 4] = b"OK\r\n";

/// Highest acceptance mask slot on the module
pub const MAX_MASK_INDEX: u8 = 1;
/// Highest acceptance filter slot on the module
pub const MAX_FILTER_INDEX: u8 = 5;

/// One configuration-mode text line (sent with a CR-LF terminator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCommand {
    line: heapless::String<COMMAND_CAPACITY>,
}

impl ConfigCommand {
    /// Wrap an arbitrary command line
    pub fn new(line: &str) -> Result<Self, DriverError> {
        let mut buf = heapless::String::new();
        buf.push_str(line)
            .map_err(|_| DriverError::CommandTooLong(line.len()))?;
        Ok(Self { line: buf })
    }

    /// `AT+Q`: leave configuration mode
    pub fn quit() -> Result<Self, DriverError> {
        Self::new("AT+Q")
    }

    /// `AT+C=NN`: set the bus rate, code zero padded to two digits
    pub fn set_rate(rate: CanRate) -> Result<Self, DriverError> {
        Self::format(format_args!("AT+C={:02}", rate.code()))
    }

    /// `AT+M=[n][e][XXXXXXXX]`: program an acceptance mask
    pub fn set_mask(index: u8, extended: bool, value: u32) -> Result<Self, DriverError> {
        check_index("mask", index, MAX_MASK_INDEX)?;
        Self::format(format_args!(
            "AT+M=[{}][{}][{:08X}]",
            index,
            u8::from(extended),
            value
        ))
    }

    /// `AT+F=[n][e][XXXXXXXX]`: program an acceptance filter
    pub fn set_filter(index: u8, extended: bool, value: u32) -> Result<Self, DriverError> {
        check_index("filter", index, MAX_FILTER_INDEX)?;
        Self::format(format_args!(
            "AT+F=[{}][{}][{:08X}]",
            index,
            u8::from(extended),
            value
        ))
    }

    /// The command text without terminator
    pub fn as_str(&self) -> &str {
        self.line.as_str()
    }

    fn format(args: fmt::Arguments<'_>) -> Result<Self, DriverError> {
        let mut line = heapless::String::new();
        line.write_fmt(args)
            .map_err(|_| DriverError::CommandTooLong(COMMAND_CAPACITY + 1))?;
        Ok(Self { line })
    }
}

impl fmt::Display for ConfigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_index(kind: &'static str, index: u8, max: u8) -> Result<(), DriverError> {
    if index > max {
        return Err(DriverError::InvalidFilterIndex { kind, index, max });
    }
    Ok(())
}
