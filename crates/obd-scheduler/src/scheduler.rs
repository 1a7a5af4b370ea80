//! PID Scheduler Implementation

use grove_can::{Clock, DriverError, GroveCan, PollStatus, Transport};
use obd_decoder::{decode, extract_response_bytes, ObdSample, Pid};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors from a single PID query
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Driver or transport failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// No matching response before the deadline
    #[error("No response for PID {pid:02X} within {timeout_ms}ms")]
    NoResponse { pid: u8, timeout_ms: u64 },
}

/// Configuration for the PID scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sampling rate for high-priority PIDs in Hz (default: 5.0)
    pub base_rate_hz: f64,
    /// Sampling rate for medium-priority PIDs in Hz
    pub medium_rate_hz: f64,
    /// Sampling rate for slow-changing PIDs in Hz
    pub slow_rate_hz: f64,
    /// Consecutive failures before a PID is backed off
    pub max_retries: u8,
    /// Extra delay per failure once backed off (milliseconds)
    pub retry_backoff_ms: u64,
    /// How long to wait for an ECU response (milliseconds)
    pub response_timeout_ms: u64,
    /// Pause between receive polls while waiting (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_rate_hz: 5.0,
            medium_rate_hz: 1.0,
            slow_rate_hz: 0.5,
            max_retries: 3,
            retry_backoff_ms: 100,
            response_timeout_ms: 250,
            poll_interval_ms: 2,
        }
    }
}

/// A decoded reading published by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObdReading {
    /// The PID that was queried
    pub pid: Pid,
    /// Decoded value and unit
    pub sample: ObdSample,
    /// Driver clock time of the response (ms)
    pub timestamp_ms: u64,
}

/// One PID's slot in the polling queue
#[derive(Debug, Clone)]
pub struct ScheduledPid {
    pub pid: Pid,
    /// Polling rate in Hz
    pub rate_hz: f64,
    /// Wall-clock instant the PID becomes due
    pub next_query: Instant,
    /// Copied from [`Pid::sampling_priority`]; breaks ties between PIDs due
    /// at the same instant
    pub priority: u8,
    /// Missing responses since the last good one
    pub failures: u8,
}

impl ScheduledPid {
    /// Slot for `pid`, due now
    pub fn new(pid: Pid, rate_hz: f64) -> Self {
        Self {
            pid,
            rate_hz,
            next_query: Instant::now(),
            priority: pid.sampling_priority(),
            failures: 0,
        }
    }

    /// Time between two polls at the current rate
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_hz)
    }

    /// Push the due time one interval (plus `extra`) past now
    pub fn schedule_next(&mut self, extra: Duration) {
        self.next_query = Instant::now() + self.interval() + extra;
    }

    /// Heap key: the greatest key is popped first
    fn urgency(&self) -> (Reverse<Instant>, u8, Reverse<u8>) {
        (
            Reverse(self.next_query),
            self.priority,
            Reverse(self.failures),
        )
    }
}

impl Eq for ScheduledPid {}

impl PartialEq for ScheduledPid {
    fn eq(&self, other: &Self) -> bool {
        self.urgency() == other.urgency()
    }
}

impl Ord for ScheduledPid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.urgency().cmp(&other.urgency())
    }
}

impl PartialOrd for ScheduledPid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// PID Scheduler for managing OBD-II queries
pub struct PidScheduler {
    /// Scheduled PIDs in priority queue
    queue: BinaryHeap<ScheduledPid>,
    /// Configuration
    config: SchedulerConfig,
    /// Whether scheduler is running
    running: bool,
}

impl PidScheduler {
    /// Create a scheduler polling every supported PID
    pub fn new(config: SchedulerConfig) -> Self {
        let mut scheduler = Self::empty(config);
        for pid in Pid::ALL {
            let rate = match pid.sampling_priority() {
                p if p >= 10 => scheduler.config.base_rate_hz,
                p if p >= 5 => scheduler.config.medium_rate_hz,
                _ => scheduler.config.slow_rate_hz,
            };
            scheduler.add(pid, rate);
        }

        info!("PID scheduler created with {} PIDs", scheduler.queue.len());
        scheduler
    }

    /// Create a scheduler with no PIDs
    pub fn empty(config: SchedulerConfig) -> Self {
        Self {
            queue: BinaryHeap::new(),
            config,
            running: false,
        }
    }

    /// Add a PID at the given rate
    pub fn add(&mut self, pid: Pid, rate_hz: f64) {
        self.queue.push(ScheduledPid::new(pid, rate_hz));
    }

    /// Change the polling rate of `pid`; returns false when it is not
    /// scheduled. The new rate applies from its next reschedule.
    pub fn set_rate(&mut self, pid: Pid, rate_hz: f64) -> bool {
        let mut slots = std::mem::take(&mut self.queue).into_vec();
        let found = match slots.iter_mut().find(|slot| slot.pid == pid) {
            Some(slot) => {
                debug!("PID {:02X} rate {} -> {} Hz", pid.as_hex(), slot.rate_hz, rate_hz);
                slot.rate_hz = rate_hz;
                true
            }
            None => false,
        };
        self.queue = BinaryHeap::from(slots);
        found
    }

    /// Query one PID and wait for its response.
    ///
    /// Frames from other identifiers, or responses for other PIDs, are
    /// skipped. The wait is measured on the driver's clock.
    pub async fn query<T: Transport, C: Clock>(
        &self,
        driver: &mut GroveCan<T, C>,
        pid: Pid,
    ) -> Result<ObdSample, SchedulerError> {
        let addressing = driver.addressing();
        let timeout_ms = self.config.response_timeout_ms;
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        driver.send_obd_query(pid.as_hex())?;
        let started_ms = driver.clock().now_ms();

        loop {
            let idle = match driver.poll_frame()? {
                PollStatus::Ready(frame) => {
                    if addressing.is_response_id(frame.id())
                        && extract_response_bytes(frame.data(), pid.as_hex()).is_some()
                    {
                        return Ok(decode(pid, frame.data()));
                    }
                    debug!(
                        "Skipping frame {:08X} while waiting for PID {:02X}",
                        frame.id(),
                        pid.as_hex()
                    );
                    false
                }
                PollStatus::TimedOut => false,
                PollStatus::Pending => true,
            };

            if driver.clock().elapsed_ms(started_ms) > timeout_ms {
                return Err(SchedulerError::NoResponse {
                    pid: pid.as_hex(),
                    timeout_ms,
                });
            }

            // A busy bus still yields to other tasks between frames
            if idle {
                tokio::time::sleep(poll_interval).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Run the scheduler loop until [`PidScheduler::stop`] or until the
    /// receiving side of `reading_tx` is dropped.
    ///
    /// Missing responses are counted per PID and backed off; driver errors
    /// end the loop.
    pub async fn run<T: Transport, C: Clock>(
        &mut self,
        driver: &mut GroveCan<T, C>,
        reading_tx: mpsc::Sender<ObdReading>,
    ) -> Result<(), SchedulerError> {
        info!("Starting PID scheduler");
        self.running = true;

        while self.running {
            if reading_tx.is_closed() {
                info!("Reading channel closed");
                break;
            }

            // Get next PID to query
            let Some(mut scheduled) = self.queue.pop() else {
                warn!("No PIDs scheduled");
                break;
            };

            // Wait until it's time
            let now = Instant::now();
            if scheduled.next_query > now {
                tokio::time::sleep(scheduled.next_query - now).await;
            }

            let mut extra_delay = Duration::ZERO;
            match self.query(driver, scheduled.pid).await {
                Ok(sample) => {
                    scheduled.failures = 0;
                    let reading = ObdReading {
                        pid: scheduled.pid,
                        sample,
                        timestamp_ms: driver.clock().now_ms(),
                    };
                    debug!("PID {:02X} = {}", scheduled.pid.as_hex(), sample);

                    // Send reading (non-blocking)
                    if let Err(mpsc::error::TrySendError::Closed(_)) = reading_tx.try_send(reading) {
                        self.running = false;
                    }
                }
                Err(SchedulerError::NoResponse { pid, timeout_ms }) => {
                    scheduled.failures = scheduled.failures.saturating_add(1);
                    warn!(
                        "PID {:02X} got no response in {}ms (attempt {})",
                        pid, timeout_ms, scheduled.failures
                    );

                    if scheduled.failures >= self.config.max_retries {
                        extra_delay = Duration::from_millis(
                            self.config.retry_backoff_ms * u64::from(scheduled.failures),
                        );
                        warn!("Backing off PID {:02X} by {:?}", pid, extra_delay);
                    }
                }
                Err(e) => {
                    self.queue.push(scheduled);
                    self.running = false;
                    return Err(e);
                }
            }

            // Reschedule
            scheduled.schedule_next(extra_delay);
            self.queue.push(scheduled);
        }

        self.running = false;
        info!("PID scheduler stopped");
        Ok(())
    }

    /// Stop the scheduler
    pub fn stop(&mut self) {
        info!("Stopping PID scheduler");
        self.running = false;
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the number of scheduled PIDs
    pub fn pid_count(&self) -> usize {
        self.queue.len()
    }

    /// Consecutive failures recorded for a PID
    pub fn failures(&self, pid: Pid) -> Option<u8> {
        self.queue.iter().find(|s| s.pid == pid).map(|s| s.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_can::mock::{MockClock, MockHandle, MockTransport};
    use grove_can::{CanFrame, DriverConfig, FRAME_LEN};
    use obd_decoder::simulator::{encode_pid, Signals};

    fn simulated_ecu() -> (GroveCan<MockTransport, MockClock>, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let signals = Signals::default();
        handle.set_responder(move |written| {
            if written.len() != FRAME_LEN || written[..4] != 0x7DFu32.to_be_bytes() {
                return Vec::new();
            }
            let pid = written[8];
            match Pid::try_from(pid) {
                Ok(pid) => {
                    let payload = encode_pid(pid, &signals);
                    let noise = CanFrame::new(0x123, false, false, &[0xAA; 8]).unwrap();
                    let reply = CanFrame::new(0x7E8, false, false, &payload).unwrap();
                    let mut bytes = noise.encode().to_vec();
                    bytes.extend_from_slice(&reply.encode());
                    bytes
                }
                Err(_) => Vec::new(),
            }
        });
        let driver = GroveCan::new(transport, MockClock::auto_advance(1), DriverConfig::default());
        (driver, handle)
    }

    #[test]
    fn test_scheduler_creation() {
        let scheduler = PidScheduler::new(SchedulerConfig::default());
        assert_eq!(scheduler.pid_count(), Pid::ALL.len());
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_heap_pops_earliest_then_highest_priority() {
        let now = Instant::now();
        let mut rpm = ScheduledPid::new(Pid::EngineRpm, 5.0);
        let mut distance = ScheduledPid::new(Pid::DistanceTraveled, 0.5);
        let mut throttle = ScheduledPid::new(Pid::ThrottlePosition, 1.0);
        rpm.next_query = now;
        distance.next_query = now;
        throttle.next_query = now - Duration::from_millis(10);

        let mut heap = BinaryHeap::from(vec![rpm, distance, throttle]);
        let order: Vec<_> = std::iter::from_fn(|| heap.pop().map(|s| s.pid)).collect();
        assert_eq!(
            order,
            vec![Pid::ThrottlePosition, Pid::EngineRpm, Pid::DistanceTraveled]
        );
    }

    #[test]
    fn test_set_rate() {
        let mut scheduler = PidScheduler::empty(SchedulerConfig::default());
        scheduler.add(Pid::EngineRpm, 5.0);
        scheduler.add(Pid::VehicleSpeed, 5.0);

        assert!(scheduler.set_rate(Pid::VehicleSpeed, 20.0));
        assert!(!scheduler.set_rate(Pid::AmbientAirTemp, 1.0));
        assert_eq!(scheduler.pid_count(), 2);

        let speed = scheduler.queue.iter().find(|s| s.pid == Pid::VehicleSpeed).unwrap();
        assert_eq!(speed.interval(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_query_skips_unrelated_frames() {
        let (mut driver, _handle) = simulated_ecu();
        let scheduler = PidScheduler::empty(SchedulerConfig::default());

        let sample = scheduler.query(&mut driver, Pid::VehicleSpeed).await.unwrap();
        assert!(sample.valid);
        assert!((sample.value - 72.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_query_times_out() {
        let (transport, _handle) = MockTransport::new();
        let mut driver = GroveCan::new(transport, MockClock::auto_advance(5), DriverConfig::default());
        let scheduler = PidScheduler::empty(SchedulerConfig::default());

        let result = scheduler.query(&mut driver, Pid::EngineRpm).await;
        assert!(matches!(
            result,
            Err(SchedulerError::NoResponse { pid: 0x0C, timeout_ms: 250 })
        ));
    }

    #[tokio::test]
    async fn test_query_times_out_on_busy_bus() {
        let (transport, handle) = MockTransport::new();
        // a stream of zero-id frames that never answers the query
        handle.set_endless(Some(0));
        let mut driver = GroveCan::new(transport, MockClock::auto_advance(1), DriverConfig::default());
        let scheduler = PidScheduler::empty(SchedulerConfig::default());

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            scheduler.query(&mut driver, Pid::VehicleSpeed),
        )
        .await
        .expect("query should give up on a busy bus");
        assert!(matches!(
            result,
            Err(SchedulerError::NoResponse { pid: 0x0D, timeout_ms: 250 })
        ));
    }

    #[tokio::test]
    async fn test_run_publishes_readings() {
        let (mut driver, _handle) = simulated_ecu();
        let mut scheduler = PidScheduler::empty(SchedulerConfig::default());
        scheduler.add(Pid::EngineRpm, 50.0);
        scheduler.add(Pid::CoolantTemp, 50.0);

        let (tx, mut rx) = mpsc::channel(16);
        let consumer = async move {
            let mut readings = Vec::new();
            while readings.len() < 4 {
                match rx.recv().await {
                    Some(reading) => readings.push(reading),
                    None => break,
                }
            }
            readings
        };

        let (result, readings) = tokio::join!(scheduler.run(&mut driver, tx), consumer);
        result.unwrap();
        assert_eq!(readings.len(), 4);
        for reading in &readings {
            assert!(reading.sample.valid);
            match reading.pid {
                Pid::EngineRpm => assert!((reading.sample.value - 2350.0).abs() < 0.01),
                Pid::CoolantTemp => assert!((reading.sample.value - 88.0).abs() < 0.01),
                other => panic!("unexpected PID {:?}", other),
            }
        }
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_run_counts_failures() {
        let (transport, _handle) = MockTransport::new();
        let mut driver = GroveCan::new(transport, MockClock::auto_advance(50), DriverConfig::default());
        let mut scheduler = PidScheduler::empty(SchedulerConfig::default());
        scheduler.add(Pid::VehicleSpeed, 100.0);

        let (tx, rx) = mpsc::channel(1);
        // close the channel after a few failed attempts
        let closer = async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            drop(rx);
        };
        let (result, _) = tokio::join!(scheduler.run(&mut driver, tx), closer);
        result.unwrap();
        assert!(scheduler.failures(Pid::VehicleSpeed).unwrap() >= 1);
    }
}
