//! CAN bus rate codes understood by the module's `AT+C` command

use serde::{Deserialize, Serialize};

/// Supported CAN bus rates
///
/// Serialized as the rate in bit/s so configuration files read naturally
/// (`can_rate = 500000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CanRate {
    /// 5 kbit/s
    Kbps5,
    /// 10 kbit/s
    Kbps10,
    /// 20 kbit/s
    Kbps20,
    /// 25 kbit/s
    Kbps25,
    /// 31.2 kbit/s
    Kbps31_2,
    /// 33 kbit/s
    Kbps33,
    /// 40 kbit/s
    Kbps40,
    /// 50 kbit/s
    Kbps50,
    /// 80 kbit/s
    Kbps80,
    /// 83.3 kbit/s
    Kbps83_3,
    /// 95 kbit/s
    Kbps95,
    /// 100 kbit/s
    Kbps100,
    /// 125 kbit/s
    Kbps125,
    /// 200 kbit/s
    Kbps200,
    /// 250 kbit/s
    Kbps250,
    /// 500 kbit/s (ISO 15765-4 default)
    Kbps500,
    /// 666 kbit/s
    Kbps666,
    /// 1 Mbit/s
    Kbps1000,
}

impl CanRate {
    /// Every rate, in code order
    pub const ALL: [CanRate; 18] = [
        CanRate::Kbps5,
        CanRate::Kbps10,
        CanRate::Kbps20,
        CanRate::Kbps25,
        CanRate::Kbps31_2,
        CanRate::Kbps33,
        CanRate::Kbps40,
        CanRate::Kbps50,
        CanRate::Kbps80,
        CanRate::Kbps83_3,
        CanRate::Kbps95,
        CanRate::Kbps100,
        CanRate::Kbps125,
        CanRate::Kbps200,
        CanRate::Kbps250,
        CanRate::Kbps500,
        CanRate::Kbps666,
        CanRate::Kbps1000,
    ];

    /// Numeric code sent in `AT+C=NN` (1..=18)
    pub fn code(&self) -> u8 {
        match self {
            CanRate::Kbps5 => 1,
            CanRate::Kbps10 => 2,
            CanRate::Kbps20 => 3,
            CanRate::Kbps25 => 4,
            CanRate::Kbps31_2 => 5,
            CanRate::Kbps33 => 6,
            CanRate::Kbps40 => 7,
            CanRate::Kbps50 => 8,
            CanRate::Kbps80 => 9,
            CanRate::Kbps83_3 => 10,
            CanRate::Kbps95 => 11,
            CanRate::Kbps100 => 12,
            CanRate::Kbps125 => 13,
            CanRate::Kbps200 => 14,
            CanRate::Kbps250 => 15,
            CanRate::Kbps500 => 16,
            CanRate::Kbps666 => 17,
            CanRate::Kbps1000 => 18,
        }
    }

    /// Bus rate in bit/s
    pub fn bits_per_second(&self) -> u32 {
        match self {
            CanRate::Kbps5 => 5_000,
            CanRate::Kbps10 => 10_000,
            CanRate::Kbps20 => 20_000,
            CanRate::Kbps25 => 25_000,
            CanRate::Kbps31_2 => 31_200,
            CanRate::Kbps33 => 33_000,
            CanRate::Kbps40 => 40_000,
            CanRate::Kbps50 => 50_000,
            CanRate::Kbps80 => 80_000,
            CanRate::Kbps83_3 => 83_300,
            CanRate::Kbps95 => 95_000,
            CanRate::Kbps100 => 100_000,
            CanRate::Kbps125 => 125_000,
            CanRate::Kbps200 => 200_000,
            CanRate::Kbps250 => 250_000,
            CanRate::Kbps500 => 500_000,
            CanRate::Kbps666 => 666_000,
            CanRate::Kbps1000 => 1_000_000,
        }
    }

    /// Look up a rate by its module code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|rate| rate.code() == code)
    }
}

impl Default for CanRate {
    fn default() -> Self {
        CanRate::Kbps500
    }
}

impl TryFrom<u32> for CanRate {
    type Error = String;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|rate| rate.bits_per_second() == bps)
            .ok_or_else(|| format!("unsupported CAN rate {} bit/s", bps))
    }
}

impl From<CanRate> for u32 {
    fn from(rate: CanRate) -> Self {
        rate.bits_per_second()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_sequential() {
        for (i, rate) in CanRate::ALL.iter().enumerate() {
            assert_eq!(rate.code() as usize, i + 1);
            assert_eq!(CanRate::from_code(rate.code()), Some(*rate));
        }
        assert_eq!(CanRate::from_code(0), None);
        assert_eq!(CanRate::from_code(19), None);
    }

    #[test]
    fn test_bps_conversion() {
        assert_eq!(CanRate::try_from(500_000), Ok(CanRate::Kbps500));
        assert_eq!(CanRate::try_from(83_300), Ok(CanRate::Kbps83_3));
        assert!(CanRate::try_from(123_456).is_err());
        assert_eq!(u32::from(CanRate::Kbps1000), 1_000_000);
    }
}
