//! Grove CAN Demo - Main Entry Point

use anyhow::Context;
use can_demo::config::{DemoConfig, DemoMode};
use can_demo::{bring_up, init_logging, run_heartbeat, run_obd};
use grove_can::{GroveCan, SerialTransport, StdClock};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Grove CAN demo v{} ===", env!("CARGO_PKG_VERSION"));

    let config = DemoConfig::load().context("loading configuration")?;
    let transport = SerialTransport::open(&config.port, config.baud_rate)
        .with_context(|| format!("opening {}", config.port))?;
    info!("CAN bus module attached on {}", transport.device());

    let mut driver = GroveCan::new(transport, StdClock::new(), config.driver.clone());
    bring_up(&mut driver, &config, config.mode == DemoMode::Obd).await?;

    run_mode(&mut driver, &config).await
}

async fn run_mode(
    driver: &mut GroveCan<SerialTransport, StdClock>,
    config: &DemoConfig,
) -> anyhow::Result<()> {
    match config.mode {
        DemoMode::Heartbeat => run_heartbeat(driver, config, None).await,
        DemoMode::Obd => Ok(run_obd(driver, config).await?),
    }
}
