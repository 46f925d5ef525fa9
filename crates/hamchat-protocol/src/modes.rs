//! Operating modes and modulation profiles understood by the TNC
//!
//! ARDOP names its FEC frame types `<modulation>.<bandwidth>.<baud>[S]`,
//! e.g. `4FSK.200.50S`. The catalogue below also carries the published
//! net throughput of each mode, used for time-to-send estimates.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Session protocol mode selected with `PROTOCOLMODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolMode {
    /// One-way forward-error-corrected broadcast
    #[default]
    Fec,
    /// Connected, acknowledged sessions
    Arq,
    /// Receive only
    ListenOnly,
}

impl ProtocolMode {
    /// Keyword used on the command channel
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Fec => "FEC",
            Self::Arq => "ARQ",
            Self::ListenOnly => "RXO",
        }
    }
}

impl FromStr for ProtocolMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FEC" => Ok(Self::Fec),
            "ARQ" => Ok(Self::Arq),
            "RXO" => Ok(Self::ListenOnly),
            other => Err(ParseError::InvalidProtocolMode(other.to_string())),
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// FEC frame type selected with `FECMODE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum FecMode {
    #[default]
    Fsk4_200_50S,
    Psk4_200_100S,
    Psk4_200_100,
    Psk8_200_100,
    Qam16_200_100,
    Fsk4_500_100S,
    Fsk4_500_100,
    Psk4_500_100,
    Psk8_500_100,
    Qam16_500_100,
    Psk4_1000_100,
    Psk8_1000_100,
    Qam16_1000_100,
    Psk4_2000_100,
    Psk8_2000_100,
    Qam16_2000_100,
    Fsk4_2000_600,
    Fsk4_2000_600S,
}

/// (mode, wire name, net bytes per minute if published)
const FEC_MODE_TABLE: &[(FecMode, &str, Option<u32>)] = &[
    (FecMode::Fsk4_200_50S, "4FSK.200.50S", Some(310)),
    (FecMode::Psk4_200_100S, "4PSK.200.100S", Some(436)),
    (FecMode::Psk4_200_100, "4PSK.200.100", Some(756)),
    (FecMode::Psk8_200_100, "8PSK.200.100", Some(1286)),
    (FecMode::Qam16_200_100, "16QAM.200.100", Some(1512)),
    (FecMode::Fsk4_500_100S, "4FSK.500.100S", None),
    (FecMode::Fsk4_500_100, "4FSK.500.100", None),
    (FecMode::Psk4_500_100, "4PSK.500.100", Some(1509)),
    (FecMode::Psk8_500_100, "8PSK.500.100", Some(2566)),
    (FecMode::Qam16_500_100, "16QAM.500.100", Some(3024)),
    (FecMode::Psk4_1000_100, "4PSK.1000.100", Some(3018)),
    (FecMode::Psk8_1000_100, "8PSK.1000.100", Some(5133)),
    (FecMode::Qam16_1000_100, "16QAM.1000.100", Some(6036)),
    (FecMode::Psk4_2000_100, "4PSK.2000.100", Some(6144)),
    (FecMode::Psk8_2000_100, "8PSK.2000.100", Some(10386)),
    (FecMode::Qam16_2000_100, "16QAM.2000.100", Some(12072)),
    (FecMode::Fsk4_2000_600, "4FSK.2000.600", None),
    (FecMode::Fsk4_2000_600S, "4FSK.2000.600S", None),
];

impl FecMode {
    /// All FEC modes in catalogue order (slowest first)
    pub fn all() -> impl Iterator<Item = FecMode> {
        FEC_MODE_TABLE.iter().map(|(mode, _, _)| *mode)
    }

    fn entry(&self) -> &'static (FecMode, &'static str, Option<u32>) {
        // The table is exhaustive over the enum
        FEC_MODE_TABLE
            .iter()
            .find(|(mode, _, _)| mode == self)
            .unwrap_or(&FEC_MODE_TABLE[0])
    }

    /// Wire name, e.g. `4FSK.200.50S`
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Published net throughput in bytes per minute
    pub fn bytes_per_minute(&self) -> Option<u32> {
        self.entry().2
    }

    /// Estimated minutes to send `len` bytes, rounded to one decimal place
    pub fn estimate_minutes(&self, len: usize) -> Option<f64> {
        let rate = self.bytes_per_minute()?;
        let minutes = len as f64 / rate as f64;
        Some((minutes * 10.0).round() / 10.0)
    }
}

impl FromStr for FecMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FEC_MODE_TABLE
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(mode, _, _)| *mode)
            .ok_or_else(|| ParseError::InvalidFecMode(wanted.to_string()))
    }
}

impl fmt::Display for FecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for FecMode {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FecMode> for String {
    fn from(mode: FecMode) -> Self {
        mode.name().to_string()
    }
}

/// Named FEC mode plus repeat count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModulationProfile {
    /// FEC frame type
    pub mode: FecMode,
    /// Number of times each frame is repeated (0-5)
    pub repeats: u8,
}

impl ModulationProfile {
    /// Highest repeat count the TNC accepts
    pub const MAX_REPEATS: u8 = 5;

    /// Create a profile, clamping the repeat count
    pub fn new(mode: FecMode, repeats: u8) -> Self {
        Self {
            mode,
            repeats: repeats.min(Self::MAX_REPEATS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fec_mode_names_round_trip() {
        for mode in FecMode::all() {
            assert_eq!(mode.name().parse::<FecMode>().unwrap(), mode);
        }
        assert_eq!(FecMode::all().count(), 18);
    }

    #[test]
    fn test_fec_mode_parse_is_case_insensitive() {
        assert_eq!("16qam.2000.100".parse::<FecMode>(), Ok(FecMode::Qam16_2000_100));
        assert!("9PSK.200.100".parse::<FecMode>().is_err());
    }

    #[test]
    fn test_estimate_minutes() {
        assert_eq!(FecMode::Fsk4_200_50S.estimate_minutes(620), Some(2.0));
        assert_eq!(FecMode::Psk4_2000_100.estimate_minutes(3072), Some(0.5));
        assert_eq!(FecMode::Fsk4_2000_600.estimate_minutes(1000), None);
    }

    #[test]
    fn test_protocol_mode_keywords() {
        assert_eq!("rxo".parse::<ProtocolMode>(), Ok(ProtocolMode::ListenOnly));
        assert_eq!(ProtocolMode::Arq.to_string(), "ARQ");
        assert!("XYZ".parse::<ProtocolMode>().is_err());
    }

    #[test]
    fn test_profile_clamps_repeats() {
        assert_eq!(ModulationProfile::new(FecMode::Psk4_200_100, 9).repeats, 5);
    }
}
