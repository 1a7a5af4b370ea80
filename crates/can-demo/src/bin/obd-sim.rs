//! OBD-II Response Simulator
//!
//! Prints one JSON snapshot of simulated mode 01 response frames per second.

use std::time::Duration;

use can_demo::SimSnapshot;
use obd_decoder::simulator::Signals;
use tracing::{debug, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let signals = Signals::default();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;
        let snapshot = SimSnapshot::now(&signals);
        debug!("Emitting {} frames", snapshot.frames.len());
        println!("{}", serde_json::to_string(&snapshot)?);
    }
}
