//! ECU Response Simulator
//!
//! Encodes physical signal values into mode 01 response payloads, the
//! inverse of [`crate::decode`]. Used to feed test benches and the
//! `obd-sim` tool.

use serde::{Deserialize, Serialize, Serializer};

use crate::mode::CURRENT_DATA_RESPONSE;
use crate::pid::Pid;

/// Length byte used in simulated responses
const SIMULATED_LENGTH: u8 = 0x04;

/// Signal values the simulated ECU reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signals {
    pub rpm: f64,
    pub speed_kmh: f64,
    pub coolant_c: f64,
    pub engine_load_pct: f64,
    pub intake_air_c: f64,
    pub throttle_pct: f64,
    pub distance_km: f64,
    pub voltage_v: f64,
    pub ambient_c: f64,
}

impl Default for Signals {
    fn default() -> Self {
        Self {
            rpm: 2350.0,
            speed_kmh: 72.0,
            coolant_c: 88.0,
            engine_load_pct: 42.0,
            intake_air_c: 32.0,
            throttle_pct: 18.0,
            distance_km: 12345.0,
            voltage_v: 13.8,
            ambient_c: 27.0,
        }
    }
}

/// One simulated response payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedFrame {
    #[serde(serialize_with = "serialize_pid_hex")]
    pub pid: Pid,
    pub name: &'static str,
    pub frame: [u8; 8],
}

fn serialize_pid_hex<S: Serializer>(pid: &Pid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{:02X}", pid.as_hex()))
}

/// `[0x04, 0x41, pid, a, b, c, 0, 0]`
pub fn build_pid_frame(pid: u8, a: u8, b: u8, c: u8) -> [u8; 8] {
    [SIMULATED_LENGTH, CURRENT_DATA_RESPONSE, pid, a, b, c, 0x00, 0x00]
}

fn split_word(value: i64) -> (u8, u8) {
    (((value >> 8) & 0xFF) as u8, (value & 0xFF) as u8)
}

/// RPM → (A, B) with `(A*256+B)/4`
pub fn encode_rpm(rpm: f64) -> (u8, u8) {
    split_word((rpm * 4.0) as i64)
}

/// km/h → A
pub fn encode_speed(speed_kmh: f64) -> u8 {
    ((speed_kmh as i64) & 0xFF) as u8
}

/// °C → A with `A-40`
pub fn encode_temp(temp_c: f64) -> u8 {
    (((temp_c + 40.0) as i64) & 0xFF) as u8
}

/// % → A with `A*100/255`
pub fn encode_pct(pct: f64) -> u8 {
    (((pct / 100.0 * 255.0) as i64) & 0xFF) as u8
}

/// km → (A, B) with `A*256+B`
pub fn encode_distance_km(distance_km: f64) -> (u8, u8) {
    split_word(distance_km as i64)
}

/// V → (A, B) with `(A*256+B)/1000`
pub fn encode_voltage(voltage_v: f64) -> (u8, u8) {
    split_word((voltage_v * 1000.0) as i64)
}

/// Response payload for one PID from the given signals
pub fn encode_pid(pid: Pid, signals: &Signals) -> [u8; 8] {
    let (a, b) = match pid {
        Pid::EngineRpm => encode_rpm(signals.rpm),
        Pid::VehicleSpeed => (encode_speed(signals.speed_kmh), 0),
        Pid::CoolantTemp => (encode_temp(signals.coolant_c), 0),
        Pid::EngineLoad => (encode_pct(signals.engine_load_pct), 0),
        Pid::IntakeAirTemp => (encode_temp(signals.intake_air_c), 0),
        Pid::ThrottlePosition => (encode_pct(signals.throttle_pct), 0),
        Pid::DistanceTraveled => encode_distance_km(signals.distance_km),
        Pid::ControlModuleVoltage => encode_voltage(signals.voltage_v),
        Pid::AmbientAirTemp => (encode_temp(signals.ambient_c), 0),
    };
    build_pid_frame(pid.as_hex(), a, b, 0)
}

/// One frame per supported PID
pub fn generate_frames(signals: &Signals) -> Vec<SimulatedFrame> {
    Pid::ALL
        .iter()
        .map(|&pid| SimulatedFrame {
            pid,
            name: pid.name(),
            frame: encode_pid(pid, signals),
        })
        .collect()
}
