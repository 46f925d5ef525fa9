//! hamChat protocol library
//!
//! Wire formats spoken by the hamChat transport engine:
//!
//! - **Command channel**: CR-terminated ASCII lines to and from the ARDOP TNC
//! - **Data channel**: `[u16 BE length][3-byte mode tag][body]` frames
//! - **Rig control**: the rigctld line protocol used for frequency, mode and PTT
//! - **Application header**: `SENDER:ID:VER:RCPT:[fields]:BEGIN:body:END:`
//!
//! # Architecture
//!
//! Each inbound stream has a streaming codec that accepts partial reads and
//! yields complete items. Outbound commands implement [`EncodeCommand`].
//!
//! # Example
//!
//! ```rust
//! use hamchat_protocol::{StreamCodec, TncResponse};
//! use hamchat_protocol::line::LineCodec;
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"BUFFER 1");
//! assert!(codec.next_item().is_none());
//! codec.push_bytes(b"20\r");
//!
//! let line = codec.next_item().unwrap();
//! assert_eq!(TncResponse::parse(&line), Ok(TncResponse::Buffer(120)));
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod header;
pub mod line;
pub mod modes;
pub mod rigctl;

pub use command::{provisioning_sequence, TncCommand, TncResponse};
pub use error::{HeaderError, ParseError, ProtocolError};
pub use frame::{chunk_payload, DataFrame, FrameCodec, ModeTag, PAYLOAD_TERMINATOR};
pub use header::{Header, ParsedPayload, ProtocolVersion, Recipients};
pub use modes::{FecMode, ModulationProfile, ProtocolMode};
pub use rigctl::{RigCommand, RigReply};

/// Trait for codecs that turn a byte stream into discrete items
pub trait StreamCodec {
    /// The item type produced by this codec
    type Item;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete item from the buffer
    fn next_item(&mut self) -> Option<Self::Item>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Encode a command to the bytes written on the wire
pub trait EncodeCommand {
    /// Encode this command to protocol bytes
    fn encode(&self) -> Vec<u8>;
}
