//! TNC command channel vocabulary
//!
//! Commands go to the TNC as `KEYWORD [VALUE]\r`. The TNC answers with
//! status lines that either echo a setting (`MYCALL now N0CALL`), report a
//! status field (`BUFFER 120`, `STATE FECSend`) or signal that the
//! transmitter must be keyed (`PTT TRUE`, `T T`).

use std::fmt;

use crate::error::ParseError;
use crate::modes::{FecMode, ModulationProfile, ProtocolMode};
use crate::EncodeCommand;

/// Commands sent on the TNC command channel
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TncCommand {
    /// Reset the TNC session
    Initialize,
    /// Set own callsign
    MyCall(String),
    /// Set Maidenhead grid locator
    GridSquare(String),
    /// Select FEC, ARQ or receive-only operation
    ProtocolMode(ProtocolMode),
    /// Select the FEC frame type
    FecMode(FecMode),
    /// Set the FEC repeat count
    FecRepeats(u8),
    /// Send an ID frame with each FEC transmission
    FecId(bool),
    /// Decode incoming traffic
    Listen(bool),
    /// Answer pings
    EnablePingAck(bool),
    /// Allow 600 baud modes
    Use600Modes(bool),
    /// Start (or stop) sending the buffered data
    FecSend(bool),
    /// Discard the outbound buffer
    PurgeBuffer,
    /// Abort the current transmission
    Abort,
    /// Query the session state
    State,
    /// Query the outbound buffer occupancy
    Buffer,
    /// Any other command line, sent verbatim
    Raw(String),
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl TncCommand {
    /// Keyword this command starts with
    pub fn keyword(&self) -> &str {
        match self {
            Self::Initialize => "INITIALIZE",
            Self::MyCall(_) => "MYCALL",
            Self::GridSquare(_) => "GRIDSQUARE",
            Self::ProtocolMode(_) => "PROTOCOLMODE",
            Self::FecMode(_) => "FECMODE",
            Self::FecRepeats(_) => "FECREPEATS",
            Self::FecId(_) => "FECID",
            Self::Listen(_) => "LISTEN",
            Self::EnablePingAck(_) => "ENABLEPINGACK",
            Self::Use600Modes(_) => "USE600MODES",
            Self::FecSend(_) => "FECSEND",
            Self::PurgeBuffer => "PURGEBUFFER",
            Self::Abort => "ABORT",
            Self::State => "STATE",
            Self::Buffer => "BUFFER",
            Self::Raw(line) => line.split_whitespace().next().unwrap_or(""),
        }
    }
}

impl fmt::Display for TncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MyCall(call) => write!(f, "MYCALL {}", call),
            Self::GridSquare(grid) => write!(f, "GRIDSQUARE {}", grid),
            Self::ProtocolMode(mode) => write!(f, "PROTOCOLMODE {}", mode),
            Self::FecMode(mode) => write!(f, "FECMODE {}", mode),
            Self::FecRepeats(n) => write!(f, "FECREPEATS {}", n),
            Self::FecId(on) => write!(f, "FECID {}", flag(*on)),
            Self::Listen(on) => write!(f, "LISTEN {}", flag(*on)),
            Self::EnablePingAck(on) => write!(f, "ENABLEPINGACK {}", flag(*on)),
            Self::Use600Modes(on) => write!(f, "USE600MODES {}", flag(*on)),
            Self::FecSend(on) => write!(f, "FECSEND {}", if *on { "TRUE" } else { "FALSE" }),
            Self::Raw(line) => f.write_str(line.trim_end_matches(['\r', '\n'])),
            other => f.write_str(other.keyword()),
        }
    }
}

impl EncodeCommand for TncCommand {
    fn encode(&self) -> Vec<u8> {
        format!("{}\r", self).into_bytes()
    }
}

/// Commands replayed after every successful (re)connect
pub fn provisioning_sequence(
    callsign: &str,
    gridsquare: &str,
    protocol_mode: ProtocolMode,
    profile: ModulationProfile,
) -> Vec<TncCommand> {
    vec![
        TncCommand::Initialize,
        TncCommand::MyCall(callsign.to_string()),
        TncCommand::GridSquare(gridsquare.to_string()),
        TncCommand::ProtocolMode(protocol_mode),
        TncCommand::FecMode(profile.mode),
        TncCommand::FecRepeats(profile.repeats),
        TncCommand::FecId(true),
        TncCommand::Listen(true),
        TncCommand::EnablePingAck(true),
        TncCommand::Use600Modes(true),
    ]
}

/// Status lines received on the command channel
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TncResponse {
    /// Transmitter must be keyed (`true`) or released (`false`)
    Keying(bool),
    /// Bytes waiting in the TNC's outbound buffer
    Buffer(u32),
    /// Session state, e.g. `DISC`, `FECSend`, `CONNECTED`
    State(String),
    /// Own callsign echo
    MyCall(String),
    /// Grid locator echo
    GridSquare(String),
    /// Protocol mode echo
    ProtocolMode(ProtocolMode),
    /// FEC mode echo
    FecMode(FecMode),
    /// FEC repeat count echo
    FecRepeats(u8),
    /// Transmit request acknowledgement
    FecSend,
    /// Anything else, kept for diagnostics
    Unknown(String),
}

impl TncResponse {
    /// Recognize a keying line without parsing anything else
    ///
    /// `PTT TRUE`/`PTT FALSE` and the short `T T`/`T F` forms are accepted.
    pub fn parse_keying(line: &str) -> Option<bool> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next()?;
        if !keyword.eq_ignore_ascii_case("PTT") && !keyword.eq_ignore_ascii_case("T") {
            return None;
        }
        let value = tokens.next()?;
        if tokens.next().is_some() {
            return None;
        }
        match value.to_ascii_uppercase().as_str() {
            "TRUE" | "T" => Some(true),
            "FALSE" | "F" => Some(false),
            _ => None,
        }
    }

    /// Parse one status line
    ///
    /// Unrecognized keywords are returned as [`TncResponse::Unknown`]; a known
    /// keyword with a missing or malformed value is an error.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        if let Some(keyed) = Self::parse_keying(line) {
            return Ok(Self::Keying(keyed));
        }

        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Ok(Self::Unknown(String::new()));
        };
        let keyword = keyword.to_ascii_uppercase();
        // Echoes read `KEYWORD now VALUE`; the value is always last
        let last = line.split_whitespace().skip(1).last();
        let value = || last.ok_or_else(|| ParseError::MissingValue(keyword.clone()));

        match keyword.as_str() {
            "BUFFER" => {
                let raw = tokens
                    .next()
                    .ok_or_else(|| ParseError::MissingValue(keyword.clone()))?;
                raw.parse()
                    .map(Self::Buffer)
                    .map_err(|_| ParseError::InvalidNumber(raw.to_string()))
            }
            "STATE" | "NEWSTATE" => {
                let status = line[keyword.len()..].trim();
                if status.is_empty() {
                    return Err(ParseError::MissingValue(keyword.clone()));
                }
                Ok(Self::State(status.to_string()))
            }
            "MYCALL" => Ok(Self::MyCall(value()?.to_string())),
            "GRIDSQUARE" => Ok(Self::GridSquare(value()?.to_string())),
            "PROTOCOLMODE" => Ok(Self::ProtocolMode(value()?.parse()?)),
            "FECMODE" => Ok(Self::FecMode(value()?.parse()?)),
            "FECREPEATS" => {
                let raw = value()?;
                raw.parse()
                    .map(Self::FecRepeats)
                    .map_err(|_| ParseError::InvalidNumber(raw.to_string()))
            }
            "FECSEND" => Ok(Self::FecSend),
            _ => Ok(Self::Unknown(line.to_string())),
        }
    }

    /// Keyword used to pair this line with an outstanding request
    pub fn keyword(&self) -> String {
        match self {
            Self::Keying(_) => "PTT".to_string(),
            Self::Buffer(_) => "BUFFER".to_string(),
            Self::State(_) => "STATE".to_string(),
            Self::MyCall(_) => "MYCALL".to_string(),
            Self::GridSquare(_) => "GRIDSQUARE".to_string(),
            Self::ProtocolMode(_) => "PROTOCOLMODE".to_string(),
            Self::FecMode(_) => "FECMODE".to_string(),
            Self::FecRepeats(_) => "FECREPEATS".to_string(),
            Self::FecSend => "FECSEND".to_string(),
            Self::Unknown(line) => line
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(TncCommand::Initialize.encode(), b"INITIALIZE\r");
        assert_eq!(TncCommand::MyCall("N0CALL".into()).encode(), b"MYCALL N0CALL\r");
        assert_eq!(
            TncCommand::FecMode(FecMode::Psk4_500_100).encode(),
            b"FECMODE 4PSK.500.100\r"
        );
        assert_eq!(TncCommand::FecSend(true).encode(), b"FECSEND TRUE\r");
        assert_eq!(TncCommand::Listen(true).encode(), b"LISTEN 1\r");
        assert_eq!(TncCommand::Raw("VERSION\r".into()).encode(), b"VERSION\r");
    }

    #[test]
    fn test_provisioning_sequence_order() {
        let seq = provisioning_sequence(
            "N0CALL",
            "AA00AA",
            ProtocolMode::Fec,
            ModulationProfile::new(FecMode::Fsk4_200_50S, 1),
        );
        let keywords: Vec<_> = seq.iter().map(|c| c.keyword()).collect();
        assert_eq!(
            keywords,
            [
                "INITIALIZE",
                "MYCALL",
                "GRIDSQUARE",
                "PROTOCOLMODE",
                "FECMODE",
                "FECREPEATS",
                "FECID",
                "LISTEN",
                "ENABLEPINGACK",
                "USE600MODES"
            ]
        );
        assert_eq!(seq[5], TncCommand::FecRepeats(1));
    }

    #[test]
    fn test_parse_keying_forms() {
        assert_eq!(TncResponse::parse("PTT TRUE"), Ok(TncResponse::Keying(true)));
        assert_eq!(TncResponse::parse("PTT FALSE"), Ok(TncResponse::Keying(false)));
        assert_eq!(TncResponse::parse("T T"), Ok(TncResponse::Keying(true)));
        assert_eq!(TncResponse::parse("T F"), Ok(TncResponse::Keying(false)));
        assert_eq!(TncResponse::parse_keying("PTT MAYBE"), None);
        assert_eq!(TncResponse::parse_keying("T T T"), None);
    }

    #[test]
    fn test_parse_status_lines() {
        assert_eq!(TncResponse::parse("BUFFER 120"), Ok(TncResponse::Buffer(120)));
        assert_eq!(
            TncResponse::parse("STATE CONNECTED"),
            Ok(TncResponse::State("CONNECTED".into()))
        );
        assert_eq!(
            TncResponse::parse("MYCALL now N0CALL"),
            Ok(TncResponse::MyCall("N0CALL".into()))
        );
        assert_eq!(
            TncResponse::parse("FECMODE now 8PSK.1000.100"),
            Ok(TncResponse::FecMode(FecMode::Psk8_1000_100))
        );
        assert_eq!(TncResponse::parse("FECREPEATS now 2"), Ok(TncResponse::FecRepeats(2)));
        assert_eq!(
            TncResponse::parse("PROTOCOLMODE now FEC"),
            Ok(TncResponse::ProtocolMode(ProtocolMode::Fec))
        );
        assert_eq!(TncResponse::parse("FECSEND now TRUE"), Ok(TncResponse::FecSend));
    }

    #[test]
    fn test_parse_errors_and_unknown() {
        assert!(matches!(
            TncResponse::parse("BUFFER lots"),
            Err(ParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            TncResponse::parse("MYCALL"),
            Err(ParseError::MissingValue(_))
        ));
        assert_eq!(
            TncResponse::parse("BUSY FALSE"),
            Ok(TncResponse::Unknown("BUSY FALSE".into()))
        );
    }

    #[test]
    fn test_response_keyword_pairs_with_command() {
        let reply = TncResponse::parse("NEWSTATE FECRcv").unwrap();
        assert_eq!(reply.keyword(), TncCommand::State.keyword());
        let reply = TncResponse::parse("version 1.0.4").unwrap();
        assert_eq!(reply.keyword(), "VERSION");
    }
}
