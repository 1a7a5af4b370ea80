//! OBD-II Scheduler for PID Polling
//!
//! Polls a set of OBD-II PIDs through the Grove CAN driver, most important
//! and most overdue first, and publishes decoded readings on a channel.

mod scheduler;

pub use scheduler::{ObdReading, PidScheduler, ScheduledPid, SchedulerConfig, SchedulerError};
