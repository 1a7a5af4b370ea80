//! Configuration-mode session
//!
//! A configuration operation is a short script of steps (escape sequence,
//! buffer drain, command round trip) executed one poll at a time. Every wait
//! is an idle timeout measured from the most recent byte.

use tracing::{debug, warn};

use crate::command::{ConfigCommand, COMMAND_TERMINATOR, ESCAPE_SEQUENCE};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::poll::PollStatus;
use crate::transport::{Clock, Transport};

/// Capacity of the shared response scratch buffer
pub const SCRATCH_CAPACITY: usize = 100;

pub(crate) type Scratch = heapless::Vec<u8, SCRATCH_CAPACITY>;

/// Longest script built by the driver
const MAX_STEPS: usize = 8;

/// Borrowed driver resources an operation runs against
pub(crate) struct Link<'a, T, C> {
    pub transport: &'a mut T,
    pub clock: &'a C,
    pub config: &'a DriverConfig,
    pub scratch: &'a mut Scratch,
}

#[derive(Debug, Clone)]
enum Step {
    Escape,
    Drain,
    Command(ConfigCommand),
}

/// Discard incoming bytes until the line stays quiet
#[derive(Debug)]
struct Drain {
    started_ms: u64,
    last_byte_ms: u64,
    discarded: usize,
}

impl Drain {
    fn new(now_ms: u64) -> Self {
        Self {
            started_ms: now_ms,
            last_byte_ms: now_ms,
            discarded: 0,
        }
    }

    fn poll<T: Transport, C: Clock>(
        &mut self,
        link: &mut Link<'_, T, C>,
    ) -> Result<PollStatus<()>, DriverError> {
        while link.transport.bytes_available()? {
            if link.transport.read_byte()?.is_none() {
                break;
            }
            self.discarded += 1;
            self.last_byte_ms = link.clock.now_ms();

            let elapsed_ms = self.last_byte_ms.saturating_sub(self.started_ms);
            if self.discarded > link.config.drain_byte_limit
                || elapsed_ms > link.config.drain_limit_ms
            {
                warn!(
                    "Drain gave up after {} bytes in {}ms",
                    self.discarded, elapsed_ms
                );
                return Err(DriverError::DrainExceeded {
                    bytes: self.discarded,
                    elapsed_ms,
                });
            }
        }

        if link.clock.elapsed_ms(self.last_byte_ms) > link.config.drain_quiet_ms {
            if self.discarded > 0 {
                debug!("Drained {} stale bytes", self.discarded);
            }
            return Ok(PollStatus::Ready(()));
        }
        Ok(PollStatus::Pending)
    }

    fn deadline_ms(&self, config: &DriverConfig) -> u64 {
        self.last_byte_ms.saturating_add(config.drain_quiet_ms)
    }
}

/// Collect the reply to a command until `OK\r\n` ends the scratch buffer
#[derive(Debug)]
struct AwaitAck {
    last_byte_ms: u64,
}

impl AwaitAck {
    fn poll<T: Transport, C: Clock>(
        &mut self,
        link: &mut Link<'_, T, C>,
    ) -> Result<PollStatus<()>, DriverError> {
        while let Some(byte) = link.transport.read_byte()? {
            link.scratch
                .push(byte)
                .map_err(|_| DriverError::LengthExceeded {
                    capacity: SCRATCH_CAPACITY,
                })?;
            self.last_byte_ms = link.clock.now_ms();

            if link.scratch.ends_with(COMMAND_TERMINATOR) {
                return Ok(PollStatus::Ready(()));
            }
        }

        if link.clock.elapsed_ms(self.last_byte_ms) > link.config.command_timeout_ms {
            return Ok(PollStatus::TimedOut);
        }
        Ok(PollStatus::Pending)
    }
}

#[derive(Debug)]
enum Active {
    Idle,
    Drain(Drain),
    Await(AwaitAck),
    /// Drain that follows an acknowledged command
    Settle(Drain),
}

/// An in-flight configuration operation
#[derive(Debug)]
pub(crate) struct ConfigOp {
    name: &'static str,
    steps: heapless::Deque<Step, MAX_STEPS>,
    active: Active,
    acked: bool,
}

impl ConfigOp {
    fn from_steps<const N: usize>(
        name: &'static str,
        steps: [Step; N],
    ) -> Result<Self, DriverError> {
        let mut queue = heapless::Deque::new();
        for step in steps {
            queue
                .push_back(step)
                .map_err(|_| DriverError::ScriptTooLong {
                    steps: N,
                    max: MAX_STEPS,
                })?;
        }
        Ok(Self {
            name,
            steps: queue,
            active: Active::Idle,
            acked: true,
        })
    }

    /// Write the escape sequence, then drain
    pub(crate) fn enter() -> Result<Self, DriverError> {
        Self::from_steps("enter config mode", [Step::Escape, Step::Drain])
    }

    /// Drain, send `AT+Q`, drain
    pub(crate) fn exit() -> Result<Self, DriverError> {
        Self::from_steps(
            "exit config mode",
            [Step::Drain, Step::Command(ConfigCommand::quit()?), Step::Drain],
        )
    }

    /// Single command round trip
    pub(crate) fn command(command: ConfigCommand) -> Result<Self, DriverError> {
        Self::from_steps("send command", [Step::Command(command)])
    }

    /// Drain only
    pub(crate) fn clear() -> Result<Self, DriverError> {
        Self::from_steps("clear buffer", [Step::Drain])
    }

    /// Enter config mode, send one command, exit
    pub(crate) fn transaction(
        name: &'static str,
        command: ConfigCommand,
    ) -> Result<Self, DriverError> {
        Self::from_steps(
            name,
            [
                Step::Escape,
                Step::Drain,
                Step::Command(command),
                Step::Drain,
                Step::Command(ConfigCommand::quit()?),
                Step::Drain,
            ],
        )
    }

    /// Enter config mode, send two commands, exit
    pub(crate) fn transaction_pair(
        name: &'static str,
        first: ConfigCommand,
        second: ConfigCommand,
    ) -> Result<Self, DriverError> {
        Self::from_steps(
            name,
            [
                Step::Escape,
                Step::Drain,
                Step::Command(first),
                Step::Command(second),
                Step::Drain,
                Step::Command(ConfigCommand::quit()?),
                Step::Drain,
            ],
        )
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Instant at which the current wait expires if no byte arrives
    pub(crate) fn deadline_ms(&self, config: &DriverConfig) -> Option<u64> {
        match &self.active {
            Active::Idle => None,
            Active::Drain(drain) | Active::Settle(drain) => Some(drain.deadline_ms(config)),
            Active::Await(wait) => Some(wait.last_byte_ms.saturating_add(config.command_timeout_ms)),
        }
    }

    /// Advance the script. Finishes with `Ready` when every command was
    /// acknowledged and `TimedOut` when any was not.
    pub(crate) fn poll<T: Transport, C: Clock>(
        &mut self,
        link: &mut Link<'_, T, C>,
    ) -> Result<PollStatus<()>, DriverError> {
        loop {
            match &mut self.active {
                Active::Idle => {
                    let Some(step) = self.steps.pop_front() else {
                        return Ok(if self.acked {
                            PollStatus::Ready(())
                        } else {
                            PollStatus::TimedOut
                        });
                    };
                    self.start(step, link)?;
                }
                Active::Drain(drain) | Active::Settle(drain) => match drain.poll(link)? {
                    PollStatus::Pending => return Ok(PollStatus::Pending),
                    _ => self.active = Active::Idle,
                },
                Active::Await(wait) => match wait.poll(link)? {
                    PollStatus::Pending => return Ok(PollStatus::Pending),
                    PollStatus::Ready(()) => {
                        debug!("{}: command acknowledged", self.name);
                        self.active = Active::Settle(Drain::new(link.clock.now_ms()));
                    }
                    PollStatus::TimedOut => {
                        warn!(
                            "{}: no acknowledgement within {}ms ({} bytes received)",
                            self.name,
                            link.config.command_timeout_ms,
                            link.scratch.len()
                        );
                        self.acked = false;
                        self.active = Active::Idle;
                    }
                },
            }
        }
    }

    fn start<T: Transport, C: Clock>(
        &mut self,
        step: Step,
        link: &mut Link<'_, T, C>,
    ) -> Result<(), DriverError> {
        match step {
            Step::Escape => {
                debug!("{}: writing escape sequence", self.name);
                link.transport.write_bytes(ESCAPE_SEQUENCE)?;
            }
            Step::Drain => {
                self.active = Active::Drain(Drain::new(link.clock.now_ms()));
            }
            Step::Command(command) => {
                debug!("{}: sending {}", self.name, command);
                link.scratch.clear();
                link.transport.write_line(command.as_str())?;
                self.active = Active::Await(AwaitAck {
                    last_byte_ms: link.clock.now_ms(),
                });
            }
        }
        Ok(())
    }
}
