//! rigctld network protocol
//!
//! rigctld (hamlib) takes one LF-terminated command per line. Set commands
//! answer `RPRT <code>` where 0 is success; get commands answer with one or
//! more value lines, or `RPRT <negative code>` on failure.

use crate::error::ProtocolError;
use crate::EncodeCommand;

/// Default rigctld port
pub const DEFAULT_RIGCTLD_PORT: u16 = 4532;

/// Commands understood by rigctld
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigCommand {
    /// `f`: read VFO frequency
    GetFrequency,
    /// `F <hz>`: set VFO frequency
    SetFrequency(u64),
    /// `m`: read mode and passband
    GetMode,
    /// `M <mode> <passband>`: set mode; passband 0 keeps the rig default
    SetMode { mode: String, passband: i32 },
    /// `t`: read PTT
    GetPtt,
    /// `T <0|1>`: set PTT
    SetPtt(bool),
}

impl RigCommand {
    /// Number of value lines a successful reply carries
    pub fn value_lines(&self) -> usize {
        match self {
            Self::GetFrequency | Self::GetPtt => 1,
            Self::GetMode => 2,
            _ => 0,
        }
    }
}

impl EncodeCommand for RigCommand {
    fn encode(&self) -> Vec<u8> {
        let line = match self {
            Self::GetFrequency => "f".to_string(),
            Self::SetFrequency(hz) => format!("F {}", hz),
            Self::GetMode => "m".to_string(),
            Self::SetMode { mode, passband } => format!("M {} {}", mode, passband),
            Self::GetPtt => "t".to_string(),
            Self::SetPtt(on) => format!("T {}", u8::from(*on)),
        };
        format!("{}\n", line).into_bytes()
    }
}

/// One reply line from rigctld
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigReply {
    /// `RPRT <code>`
    Status(i32),
    /// A value line
    Value(String),
}

impl RigReply {
    /// Classify a reply line
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Some(code) = line.strip_prefix("RPRT") {
            if let Ok(code) = code.trim().parse() {
                return Self::Status(code);
            }
        }
        Self::Value(line.to_string())
    }

    /// Turn a status reply into a result
    pub fn into_result(self) -> Result<Option<String>, ProtocolError> {
        match self {
            Self::Status(0) => Ok(None),
            Self::Status(code) => Err(ProtocolError::RigError(code)),
            Self::Value(v) => Ok(Some(v)),
        }
    }
}

/// Parse a frequency value line
pub fn parse_frequency(value: &str) -> Result<u64, ProtocolError> {
    let value = value.trim();
    // Some backends report a float
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| ProtocolError::InvalidResponse(format!("frequency {:?}", value)))
}
