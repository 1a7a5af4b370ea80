//! Supported OBD-II PIDs and their decoding formulas

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::response::ResponseBytes;
use crate::sample::Unit;

/// Mode 01 PIDs this decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    EngineRpm = 0x0C,
    /// Vehicle speed (0x0D)
    VehicleSpeed = 0x0D,
    /// Intake air temperature (0x0F)
    IntakeAirTemp = 0x0F,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Distance traveled since codes cleared (0x31)
    DistanceTraveled = 0x31,
    /// Control module voltage (0x42)
    ControlModuleVoltage = 0x42,
    /// Ambient air temperature (0x46)
    AmbientAirTemp = 0x46,
}

/// Byte does not name a supported PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("PID {0:02X} is not supported")]
pub struct UnsupportedPid(pub u8);

struct PidEntry {
    name: &'static str,
    unit: Unit,
    formula: fn(ResponseBytes) -> f64,
}

fn word(bytes: ResponseBytes) -> f64 {
    (u16::from(bytes.a) << 8 | u16::from(bytes.b)) as f64
}

fn offset_temp(bytes: ResponseBytes) -> f64 {
    bytes.a as f64 - 40.0
}

fn percent(bytes: ResponseBytes) -> f64 {
    bytes.a as f64 * 100.0 / 255.0
}

fn quarter_word(bytes: ResponseBytes) -> f64 {
    word(bytes) / 4.0
}

fn milli_word(bytes: ResponseBytes) -> f64 {
    word(bytes) / 1000.0
}

fn raw(bytes: ResponseBytes) -> f64 {
    bytes.a as f64
}

// Decoding table, one entry per PID; `Pid::entry` selects it

static ENGINE_RPM: PidEntry = PidEntry {
    name: "engine_rpm",
    unit: Unit::Rpm,
    formula: quarter_word,
};

static VEHICLE_SPEED: PidEntry = PidEntry {
    name: "vehicle_speed",
    unit: Unit::KilometersPerHour,
    formula: raw,
};

static COOLANT_TEMP: PidEntry = PidEntry {
    name: "coolant_temp",
    unit: Unit::Celsius,
    formula: offset_temp,
};

static ENGINE_LOAD: PidEntry = PidEntry {
    name: "engine_load",
    unit: Unit::Percent,
    formula: percent,
};

static INTAKE_AIR_TEMP: PidEntry = PidEntry {
    name: "intake_air_temp",
    unit: Unit::Celsius,
    formula: offset_temp,
};

static THROTTLE_POSITION: PidEntry = PidEntry {
    name: "throttle_position",
    unit: Unit::Percent,
    formula: percent,
};

static DISTANCE_TRAVELED: PidEntry = PidEntry {
    name: "distance_traveled",
    unit: Unit::Kilometers,
    formula: word,
};

static CONTROL_MODULE_VOLTAGE: PidEntry = PidEntry {
    name: "control_module_voltage",
    unit: Unit::Volts,
    formula: milli_word,
};

static AMBIENT_AIR_TEMP: PidEntry = PidEntry {
    name: "ambient_air_temp",
    unit: Unit::Celsius,
    formula: offset_temp,
};

impl Pid {
    /// Every supported PID, in table order
    pub const ALL: [Pid; 9] = [
        Pid::EngineRpm,
        Pid::VehicleSpeed,
        Pid::CoolantTemp,
        Pid::EngineLoad,
        Pid::IntakeAirTemp,
        Pid::ThrottlePosition,
        Pid::DistanceTraveled,
        Pid::ControlModuleVoltage,
        Pid::AmbientAirTemp,
    ];

    fn entry(&self) -> &'static PidEntry {
        match self {
            Pid::EngineRpm => &ENGINE_RPM,
            Pid::VehicleSpeed => &VEHICLE_SPEED,
            Pid::CoolantTemp => &COOLANT_TEMP,
            Pid::EngineLoad => &ENGINE_LOAD,
            Pid::IntakeAirTemp => &INTAKE_AIR_TEMP,
            Pid::ThrottlePosition => &THROTTLE_POSITION,
            Pid::DistanceTraveled => &DISTANCE_TRAVELED,
            Pid::ControlModuleVoltage => &CONTROL_MODULE_VOLTAGE,
            Pid::AmbientAirTemp => &AMBIENT_AIR_TEMP,
        }
    }

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Snake-case signal name
    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    /// Unit of the decoded value
    pub fn unit(&self) -> Unit {
        self.entry().unit
    }

    /// Apply this PID's formula to validated data bytes
    pub fn evaluate(&self, bytes: ResponseBytes) -> f64 {
        (self.entry().formula)(bytes)
    }

    /// Sampling priority (higher = polled more often)
    pub fn sampling_priority(&self) -> u8 {
        match self {
            Pid::EngineRpm | Pid::VehicleSpeed | Pid::CoolantTemp | Pid::EngineLoad => 10,
            Pid::ThrottlePosition | Pid::IntakeAirTemp => 5,
            _ => 2,
        }
    }
}

impl TryFrom<u8> for Pid {
    type Error = UnsupportedPid;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Pid::ALL
            .iter()
            .copied()
            .find(|pid| pid.as_hex() == value)
            .ok_or(UnsupportedPid(value))
    }
}

impl From<Pid> for u8 {
    fn from(pid: Pid) -> Self {
        pid.as_hex()
    }
}
