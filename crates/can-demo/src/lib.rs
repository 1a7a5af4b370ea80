//! Grove CAN Demo
//!
//! Startup sequencing for the Grove CAN bus module (port open, startup
//! delay, bus rate) followed by either a periodic heartbeat frame or OBD-II
//! PID polling. Also hosts the snapshot format of the `obd-sim` tool.

pub mod config;

use std::time::Duration;

use grove_can::{Clock, GroveCan, Transport};
use obd_decoder::simulator::{generate_frames, SimulatedFrame, Signals};
use obd_scheduler::{ObdReading, PidScheduler, SchedulerError};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::DemoConfig;

/// Heartbeat payload
const HEARTBEAT_PAYLOAD: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Wait out the startup delay and configure the bus. Set `obd_filters` to
/// also restrict reception to OBD-II response identifiers.
pub async fn bring_up<T: Transport, C: Clock>(
    driver: &mut GroveCan<T, C>,
    config: &DemoConfig,
    obd_filters: bool,
) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(config.startup_delay_ms)).await;

    driver.begin_set_can_rate(config.can_rate)?;
    if driver.finish().await? {
        info!("CAN rate set to {} bit/s", config.can_rate.bits_per_second());
    } else {
        warn!("Module did not acknowledge CAN rate change");
    }

    if obd_filters {
        driver.begin_configure_obd_filters()?;
        if !driver.finish().await? {
            warn!("Module did not acknowledge OBD filters");
        }
    }
    Ok(())
}

/// Send the heartbeat frame every interval, logging received frames in
/// between. Runs forever unless `count` is given.
pub async fn run_heartbeat<T: Transport, C: Clock>(
    driver: &mut GroveCan<T, C>,
    config: &DemoConfig,
    count: Option<u64>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));
    let mut sent = 0u64;

    loop {
        ticker.tick().await;
        driver.send(config.heartbeat_id, false, false, &HEARTBEAT_PAYLOAD)?;
        sent += 1;
        info!("Sent CAN frame 0x{:03X}", config.heartbeat_id);

        while let Some(frame) = driver.receive()? {
            info!("Received CAN frame 0x{:X}: {:02X?}", frame.id(), frame.data());
        }

        if count.is_some_and(|limit| sent >= limit) {
            return Ok(());
        }
    }
}

/// Poll every supported PID and log decoded readings
pub async fn run_obd<T: Transport, C: Clock>(
    driver: &mut GroveCan<T, C>,
    config: &DemoConfig,
) -> Result<(), SchedulerError> {
    let mut scheduler = PidScheduler::new(config.scheduler.clone());
    let (tx, mut rx) = mpsc::channel::<ObdReading>(64);

    let logger = tokio::spawn(async move {
        while let Some(reading) = rx.recv().await {
            info!("{} = {}", reading.pid.name(), reading.sample);
        }
    });

    let result = scheduler.run(driver, tx).await;
    if let Err(e) = logger.await {
        warn!("Reading logger task failed: {}", e);
    }
    result
}

/// One line of `obd-sim` output
#[derive(Debug, Serialize)]
pub struct SimSnapshot<'a> {
    /// Unix time in seconds
    pub timestamp: f64,
    pub frames: Vec<SimulatedFrame>,
    pub signals: &'a Signals,
}

impl<'a> SimSnapshot<'a> {
    /// Snapshot of every PID frame for `signals` at the current time
    pub fn now(signals: &'a Signals) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            frames: generate_frames(signals),
            signals,
        }
    }
}
