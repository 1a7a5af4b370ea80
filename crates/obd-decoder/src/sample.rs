//! Decoded sample values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical unit of a decoded PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "rpm")]
    Rpm,
    #[serde(rename = "km/h")]
    KilometersPerHour,
    #[serde(rename = "°C")]
    Celsius,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "V")]
    Volts,
}

impl Unit {
    /// Unit tag as displayed
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Rpm => "rpm",
            Unit::KilometersPerHour => "km/h",
            Unit::Celsius => "°C",
            Unit::Percent => "%",
            Unit::Kilometers => "km",
            Unit::Volts => "V",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of decoding one PID response.
///
/// An invalid sample has `value == 0.0` but keeps the unit of the PID that
/// was requested; gate on `valid` (or use [`ObdSample::value`]) before
/// reading the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObdSample {
    /// Whether the response passed validation
    pub valid: bool,
    /// Decoded value, 0 when invalid
    pub value: f64,
    /// Unit of the requested PID
    pub unit: Unit,
}

impl ObdSample {
    /// A validated sample
    pub fn new(value: f64, unit: Unit) -> Self {
        Self {
            valid: true,
            value,
            unit,
        }
    }

    /// A rejected response
    pub fn invalid(unit: Unit) -> Self {
        Self {
            valid: false,
            value: 0.0,
            unit,
        }
    }

    /// The value, only when valid
    pub fn value(&self) -> Option<f64> {
        self.valid.then_some(self.value)
    }
}

impl fmt::Display for ObdSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{:.2} {}", self.value, self.unit)
        } else {
            write!(f, "invalid ({})", self.unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sample_keeps_unit() {
        let sample = ObdSample::invalid(Unit::Volts);
        assert!(!sample.valid);
        assert_eq!(sample.value, 0.0);
        assert_eq!(sample.value(), None);
        assert_eq!(sample.to_string(), "invalid (V)");
    }

    #[test]
    fn test_unit_serializes_as_tag() {
        let json = serde_json::to_string(&ObdSample::new(72.0, Unit::KilometersPerHour)).unwrap();
        assert_eq!(json, r#"{"valid":true,"value":72.0,"unit":"km/h"}"#);
    }
}
