//! hamChat application header
//!
//! Application payloads look like:
//!
//! ```text
//! SENDER:PROTOCOL_ID:VERSION:RECIPIENTS:[field:...]BEGIN:<body>:END:
//! ```
//!
//! e.g. `N0CALL:chat:1.0:ALL:BEGIN:hello:END:`. Recipients is either the
//! broadcast token `ALL` or a comma-separated list of callsigns.

use std::fmt;
use std::str::FromStr;

use crate::error::HeaderError;
use crate::frame::PAYLOAD_TERMINATOR;

/// Separator between the header and the body
pub const BEGIN_MARKER: &[u8] = b":BEGIN:";

/// Recipient token addressing every station
pub const BROADCAST: &str = "ALL";

/// Shortest accepted sender identifier
pub const SENDER_MIN_LEN: usize = 3;

/// Longest accepted sender identifier
pub const SENDER_MAX_LEN: usize = 10;

/// Dotted `major.minor` protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ProtocolVersion {
    type Err = HeaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HeaderError::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Who a payload is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Recipients {
    /// Every station (`ALL`)
    Broadcast,
    /// Listed callsigns
    Stations(Vec<String>),
}

impl Recipients {
    fn parse(field: &str) -> Self {
        if field.trim().eq_ignore_ascii_case(BROADCAST) {
            return Self::Broadcast;
        }
        Self::Stations(
            field
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Whether `callsign` is addressed
    pub fn includes(&self, callsign: &str) -> bool {
        match self {
            Self::Broadcast => true,
            Self::Stations(calls) => calls.iter().any(|c| c.eq_ignore_ascii_case(callsign)),
        }
    }
}

impl fmt::Display for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str(BROADCAST),
            Self::Stations(calls) => f.write_str(&calls.join(",")),
        }
    }
}

/// Parsed header fields
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header {
    pub sender: String,
    pub protocol_id: String,
    pub version: ProtocolVersion,
    pub recipients: Recipients,
    /// Handler specific fields between RECIPIENTS and BEGIN
    pub fields: Vec<String>,
}

impl Header {
    /// Broadcast header without extra fields
    pub fn new(
        sender: impl Into<String>,
        protocol_id: impl Into<String>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            sender: sender.into(),
            protocol_id: protocol_id.into(),
            version,
            recipients: Recipients::Broadcast,
            fields: Vec::new(),
        }
    }

    /// Address specific stations
    pub fn with_recipients(mut self, recipients: Recipients) -> Self {
        self.recipients = recipients;
        self
    }

    /// Append a handler specific field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Parse the header text preceding `:BEGIN:`
    pub fn parse(text: &str) -> Result<Self, HeaderError> {
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() < 4 {
            return Err(HeaderError::TooFewFields(parts.len()));
        }

        let sender = parts[0].trim();
        if !(SENDER_MIN_LEN..=SENDER_MAX_LEN).contains(&sender.len()) {
            return Err(HeaderError::InvalidSender(sender.to_string()));
        }

        let protocol_id = parts[1].trim();
        if protocol_id.is_empty() {
            return Err(HeaderError::EmptyProtocolId);
        }

        Ok(Self {
            sender: sender.to_string(),
            protocol_id: protocol_id.to_string(),
            version: parts[2].parse()?,
            recipients: Recipients::parse(parts[3]),
            fields: parts[4..].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Header text without the BEGIN marker
    pub fn encode(&self) -> String {
        let mut out = format!(
            "{}:{}:{}:{}",
            self.sender, self.protocol_id, self.version, self.recipients
        );
        for field in &self.fields {
            out.push(':');
            out.push_str(field);
        }
        out
    }

    /// Complete payload: header, BEGIN marker, body and terminator
    pub fn encode_payload(&self, body: &[u8]) -> Vec<u8> {
        let header = self.encode();
        let mut out = Vec::with_capacity(
            header.len() + BEGIN_MARKER.len() + body.len() + PAYLOAD_TERMINATOR.len(),
        );
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(BEGIN_MARKER);
        out.extend_from_slice(body);
        out.extend_from_slice(PAYLOAD_TERMINATOR);
        out
    }
}

/// A received payload split into header and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    /// `None` when the payload has no usable header
    pub header: Option<Header>,
    /// Body with the BEGIN marker and terminator removed
    pub body: Vec<u8>,
}

impl ParsedPayload {
    /// Split a reassembled payload
    ///
    /// Never fails: a missing or malformed header yields a headerless payload
    /// whose body is everything except the terminator.
    pub fn parse(payload: &[u8]) -> Self {
        let content = payload
            .strip_suffix(PAYLOAD_TERMINATOR)
            .unwrap_or(payload);

        match Self::split_header(content) {
            Ok((header, body)) => Self {
                header: Some(header),
                body: body.to_vec(),
            },
            Err(e) => {
                tracing::debug!("Payload without usable header: {}", e);
                Self {
                    header: None,
                    body: content.to_vec(),
                }
            }
        }
    }

    fn split_header(content: &[u8]) -> Result<(Header, &[u8]), HeaderError> {
        let pos = content
            .windows(BEGIN_MARKER.len())
            .position(|w| w == BEGIN_MARKER)
            .ok_or(HeaderError::MissingBegin)?;
        let text = std::str::from_utf8(&content[..pos]).map_err(|_| HeaderError::NotUtf8)?;
        let header = Header::parse(text)?;
        Ok((header, &content[pos + BEGIN_MARKER.len()..]))
    }

    /// Protocol identifier, if the payload has a header
    pub fn protocol_id(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.protocol_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_payload() {
        let parsed = ParsedPayload::parse(b"N0CALL:chat:1.0:ALL:BEGIN:hello:END:");
        let header = parsed.header.unwrap();
        assert_eq!(header.sender, "N0CALL");
        assert_eq!(header.protocol_id, "chat");
        assert_eq!(header.version, ProtocolVersion::new(1, 0));
        assert_eq!(header.recipients, Recipients::Broadcast);
        assert!(header.fields.is_empty());
        assert_eq!(parsed.body, b"hello");
    }

    #[test]
    fn test_parse_fields_and_recipients() {
        let parsed =
            ParsedPayload::parse(b"KD9ABC:file:2.1:W1AW,K2XYZ:notes.txt:42:BEGIN:data:END:");
        let header = parsed.header.unwrap();
        assert_eq!(
            header.recipients,
            Recipients::Stations(vec!["W1AW".into(), "K2XYZ".into()])
        );
        assert!(header.recipients.includes("w1aw"));
        assert!(!header.recipients.includes("N0CALL"));
        assert_eq!(header.fields, ["notes.txt", "42"]);
    }

    #[test]
    fn test_body_may_contain_colons() {
        let parsed = ParsedPayload::parse(b"N0CALL:chat:1.0:ALL:BEGIN:a:b:BEGIN:c:END:");
        assert_eq!(parsed.body, b"a:b:BEGIN:c");
    }

    #[test]
    fn test_headerless_payloads() {
        let parsed = ParsedPayload::parse(b"just some text:END:");
        assert!(parsed.header.is_none());
        assert_eq!(parsed.body, b"just some text");

        // Sender too long
        let parsed = ParsedPayload::parse(b"ABCDEFGHIJK:chat:1.0:ALL:BEGIN:x:END:");
        assert!(parsed.header.is_none());
        assert_eq!(parsed.protocol_id(), None);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(Header::parse("N0CALL:chat"), Err(HeaderError::TooFewFields(2)));
        assert_eq!(
            Header::parse("AB:chat:1.0:ALL"),
            Err(HeaderError::InvalidSender("AB".into()))
        );
        assert_eq!(
            Header::parse("N0CALL::1.0:ALL"),
            Err(HeaderError::EmptyProtocolId)
        );
        assert_eq!(
            Header::parse("N0CALL:chat:one:ALL"),
            Err(HeaderError::InvalidVersion("one".into()))
        );
    }

    #[test]
    fn test_encode_payload() {
        let header = Header::new("N0CALL", "chat", ProtocolVersion::new(1, 0));
        assert_eq!(
            header.encode_payload(b"hello"),
            b"N0CALL:chat:1.0:ALL:BEGIN:hello:END:"
        );

        let header = header
            .with_recipients(Recipients::Stations(vec!["W1AW".into()]))
            .with_field("x");
        let parsed = ParsedPayload::parse(&header.encode_payload(b"hi"));
        assert_eq!(parsed.header.as_ref(), Some(&header));
    }
}
