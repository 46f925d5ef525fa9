//! Error types for TNC protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Declared frame length is outside the accepted range
    #[error("invalid frame length: {length} (allowed {min}..={max})")]
    InvalidLength {
        length: usize,
        min: usize,
        max: usize,
    },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A command or status line exceeded the maximum line length
    #[error("line too long: {0} bytes")]
    LineTooLong(usize),

    /// Unknown or unsupported keyword
    #[error("unknown keyword: {0}")]
    UnknownKeyword(String),

    /// A keyword arrived without its value
    #[error("missing value for {0}")]
    MissingValue(String),

    /// A numeric field did not parse
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// Unknown FEC mode name
    #[error("invalid FEC mode: {0}")]
    InvalidFecMode(String),

    /// Unknown protocol mode name
    #[error("invalid protocol mode: {0}")]
    InvalidProtocolMode(String),
}

/// Errors raised while interpreting the hamChat application header
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The payload has no `:BEGIN:` marker
    #[error("missing BEGIN marker")]
    MissingBegin,

    /// Fewer than the four mandatory fields precede BEGIN
    #[error("header has {0} fields, need at least 4")]
    TooFewFields(usize),

    /// Sender identifier length outside the allowed range
    #[error("invalid sender {0:?}")]
    InvalidSender(String),

    /// Protocol identifier is empty
    #[error("empty protocol identifier")]
    EmptyProtocolId,

    /// Version is not a dotted numeric pair
    #[error("invalid version {0:?}")]
    InvalidVersion(String),

    /// Header bytes are not valid UTF-8
    #[error("header is not valid UTF-8")]
    NotUtf8,
}

/// Higher-level protocol errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Header error
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// Payload cannot be framed (empty or oversized)
    #[error("cannot frame payload: {0}")]
    Unframeable(String),

    /// Invalid response from the peer
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The rig control daemon reported an error code
    #[error("rig control error code {0}")]
    RigError(i32),
}
