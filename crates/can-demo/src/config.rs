//! Demo configuration
//!
//! Loaded from an optional `can-demo.toml` and `CAN_DEMO_*` environment
//! variables (nested keys use `__`, e.g. `CAN_DEMO_DRIVER__ADDRESSING=29bit`).

use config::{Config, ConfigError, Environment, File};
use grove_can::{CanRate, DriverConfig};
use obd_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// What the demo does once the bus is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoMode {
    /// Send a fixed frame periodically and log whatever arrives
    Heartbeat,
    /// Poll OBD-II PIDs and log decoded values
    Obd,
}

/// Demo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Serial device the module is attached to
    pub port: String,

    /// Serial baud rate (module default 9600; 38400 and 115200 also work)
    pub baud_rate: u32,

    /// CAN bus rate in bit/s
    pub can_rate: CanRate,

    /// Delay before talking to the module after opening the port
    pub startup_delay_ms: u64,

    pub mode: DemoMode,

    /// Identifier of the heartbeat frame
    pub heartbeat_id: u32,

    /// Heartbeat period
    pub heartbeat_interval_ms: u64,

    pub driver: DriverConfig,

    pub scheduler: SchedulerConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            can_rate: CanRate::Kbps500,
            startup_delay_ms: 1000,
            mode: DemoMode::Heartbeat,
            heartbeat_id: 0x123,
            heartbeat_interval_ms: 1000,
            driver: DriverConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl DemoConfig {
    /// Load from `can-demo.toml` (optional) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("can-demo")
    }

    /// Load from the named config file (optional) and the environment
    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(
                Environment::with_prefix("CAN_DEMO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use grove_can::ObdAddressing;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = DemoConfig::load_from("does-not-exist").unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.can_rate, CanRate::Kbps500);
        assert_eq!(config.heartbeat_id, 0x123);
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            port = "/dev/ttyACM0"
            can_rate = 250000
            mode = "obd"

            [driver]
            addressing = "29bit"
            frame_idle_timeout_ms = 100
        "#;
        let config: DemoConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.can_rate, CanRate::Kbps250);
        assert_eq!(config.mode, DemoMode::Obd);
        assert_eq!(config.driver.addressing, ObdAddressing::Extended29Bit);
        assert_eq!(config.driver.frame_idle_timeout_ms, 100);
        assert_eq!(config.driver.command_timeout_ms, 500);
    }
}
