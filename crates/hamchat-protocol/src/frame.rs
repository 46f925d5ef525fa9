//! Data channel framing
//!
//! Every frame on the TNC data channel is laid out as:
//!
//! ```text
//! [length: u16 BE][tag: 3 bytes][body ...]
//! ```
//!
//! The length counts the tag and the body, not the prefix itself. Tags are
//! `FEC` and `ARQ` for data and `ERR` for frames the TNC failed to decode.
//! Some TNC builds repeat the tag on the first frame of a transmission
//! (`FECFEC...`). Decoding here only splits off the real tag; removing the
//! repeat is up to whoever knows where a payload starts.
//!
//! Frame boundaries carry no meaning for the application: an application
//! payload spans any number of frames and ends with [`PAYLOAD_TERMINATOR`].

use crate::error::{ParseError, ProtocolError};
use crate::StreamCodec;

/// Size of the big-endian length prefix
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Size of the mode tag
pub const TAG_LEN: usize = 3;

/// Default maximum body size of an outbound frame
pub const DEFAULT_CHUNK_MAX: usize = 1000;

/// Largest declared length accepted from the TNC
pub const MAX_FRAME_LEN: usize = 2048;

/// Marker ending every application payload
pub const PAYLOAD_TERMINATOR: &[u8] = b":END:";

/// Mode tag carried after the length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModeTag {
    /// Forward-error-corrected broadcast data
    Fec,
    /// Connected-mode data
    Arq,
    /// Undecodable frame
    Err,
}

impl ModeTag {
    /// Wire bytes of this tag
    pub fn as_bytes(&self) -> &'static [u8; TAG_LEN] {
        match self {
            Self::Fec => b"FEC",
            Self::Arq => b"ARQ",
            Self::Err => b"ERR",
        }
    }

    /// Recognize a tag at the start of `data`
    pub fn from_prefix(data: &[u8]) -> Option<Self> {
        match data.get(..TAG_LEN)? {
            b"FEC" => Some(Self::Fec),
            b"ARQ" => Some(Self::Arq),
            b"ERR" => Some(Self::Err),
            _ => None,
        }
    }
}

/// One data channel frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Mode tag, `None` when the frame did not start with a known tag
    pub tag: Option<ModeTag>,
    /// Frame body with the tag removed
    pub body: Vec<u8>,
}

impl DataFrame {
    /// Create a tagged frame
    pub fn new(tag: ModeTag, body: impl Into<Vec<u8>>) -> Self {
        Self {
            tag: Some(tag),
            body: body.into(),
        }
    }

    /// Whether the TNC marked this frame as undecodable
    pub fn is_error(&self) -> bool {
        self.tag == Some(ModeTag::Err)
    }

    /// Length written in the prefix: tag plus body
    pub fn declared_len(&self) -> usize {
        self.tag.map_or(0, |_| TAG_LEN) + self.body.len()
    }

    /// Split raw frame contents (everything after the prefix) into tag and body
    pub fn from_contents(contents: &[u8]) -> Self {
        match ModeTag::from_prefix(contents) {
            Some(tag) => Self {
                tag: Some(tag),
                body: contents[TAG_LEN..].to_vec(),
            },
            None => Self {
                tag: None,
                body: contents.to_vec(),
            },
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let len = u16::try_from(self.declared_len()).map_err(|_| {
            ProtocolError::Unframeable(format!("frame of {} bytes", self.declared_len()))
        })?;

        let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + self.declared_len());
        out.extend_from_slice(&len.to_be_bytes());
        if let Some(tag) = self.tag {
            out.extend_from_slice(tag.as_bytes());
        }
        out.extend_from_slice(&self.body);
        Ok(out)
    }
}

/// Split an outbound payload into tagged frames of at most `chunk_max` body bytes
pub fn chunk_payload(
    payload: &[u8],
    tag: ModeTag,
    chunk_max: usize,
) -> Result<Vec<DataFrame>, ProtocolError> {
    if payload.is_empty() {
        return Err(ProtocolError::Unframeable("empty payload".into()));
    }
    if chunk_max == 0 || chunk_max + TAG_LEN > u16::MAX as usize {
        return Err(ProtocolError::Unframeable(format!(
            "chunk size {} out of range",
            chunk_max
        )));
    }
    Ok(payload
        .chunks(chunk_max)
        .map(|chunk| DataFrame::new(tag, chunk))
        .collect())
}

/// Whether an assembled payload carries the terminator
pub fn is_terminated(payload: &[u8]) -> bool {
    payload.ends_with(PAYLOAD_TERMINATOR)
}

/// Streaming decoder for the data channel
///
/// A declared length of zero or above the configured maximum means the
/// stream is out of sync. The decoder reports it once, drops everything
/// buffered and starts over with the next read.
#[derive(Debug)]
pub struct FrameCodec {
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameCodec {
    /// Create a decoder accepting frames up to [`MAX_FRAME_LEN`]
    pub fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Create a decoder with a custom length bound
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Bytes buffered but not yet decoded
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCodec for FrameCodec {
    type Item = Result<DataFrame, ParseError>;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_item(&mut self) -> Option<Self::Item> {
        if self.buffer.len() < LENGTH_PREFIX_LEN {
            return None;
        }
        let declared = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;

        if declared == 0 || declared > self.max_len {
            tracing::debug!("Bad frame length {}, resyncing", declared);
            self.buffer.clear();
            return Some(Err(ParseError::InvalidLength {
                length: declared,
                min: 1,
                max: self.max_len,
            }));
        }

        if self.buffer.len() < LENGTH_PREFIX_LEN + declared {
            return None;
        }

        let raw: Vec<u8> = self
            .buffer
            .drain(..LENGTH_PREFIX_LEN + declared)
            .skip(LENGTH_PREFIX_LEN)
            .collect();
        Some(Ok(DataFrame::from_contents(&raw)))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_tag_in_length() {
        let frame = DataFrame::new(ModeTag::Fec, b"hello".to_vec());
        assert_eq!(frame.encode().unwrap(), b"\x00\x08FEChello");
    }

    #[test]
    fn test_decode_streaming() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(b"\x00\x08FEC");
        assert!(codec.next_item().is_none());
        codec.push_bytes(b"hello\x00\x06ERRabc");

        let first = codec.next_item().unwrap().unwrap();
        assert_eq!(first.tag, Some(ModeTag::Fec));
        assert_eq!(first.body, b"hello");

        let second = codec.next_item().unwrap().unwrap();
        assert!(second.is_error());
        assert!(codec.next_item().is_none());
    }

    #[test]
    fn test_repeated_tag_is_body_data() {
        let frame = DataFrame::from_contents(b"FECFEChi");
        assert_eq!(frame.tag, Some(ModeTag::Fec));
        assert_eq!(frame.body, b"FEChi");

        let frame = DataFrame::from_contents(b"FECARQ");
        assert_eq!(frame.body, b"ARQ");
    }

    fn decode_all(payload: &[u8], chunk_max: usize) -> Vec<u8> {
        let mut codec = FrameCodec::new();
        for frame in chunk_payload(payload, ModeTag::Fec, chunk_max).unwrap() {
            codec.push_bytes(&frame.encode().unwrap());
        }
        let mut out = Vec::new();
        while let Some(frame) = codec.next_item() {
            out.extend(frame.unwrap().body);
        }
        out
    }

    #[test]
    fn test_payload_starting_with_tag_decodes_intact() {
        assert_eq!(decode_all(b"FECxyz:END:", DEFAULT_CHUNK_MAX), b"FECxyz:END:");
    }

    #[test]
    fn test_chunk_boundary_on_tag_decodes_intact() {
        assert_eq!(decode_all(b"aaaaFECtail:END:", 4), b"aaaaFECtail:END:");
    }

    #[test]
    fn test_untagged_frame_keeps_contents() {
        let frame = DataFrame::from_contents(b"xyzzy");
        assert_eq!(frame.tag, None);
        assert_eq!(frame.body, b"xyzzy");
    }

    #[test]
    fn test_bad_length_resets() {
        let mut codec = FrameCodec::with_max_len(100);
        codec.push_bytes(b"\xff\xffgarbage");
        assert!(matches!(
            codec.next_item(),
            Some(Err(ParseError::InvalidLength { length: 65535, .. }))
        ));
        assert_eq!(codec.pending(), 0);

        codec.push_bytes(b"\x00\x00");
        assert!(matches!(codec.next_item(), Some(Err(_))));

        codec.push_bytes(b"\x00\x04FECx");
        assert_eq!(codec.next_item().unwrap().unwrap().body, b"x");
    }

    #[test]
    fn test_chunk_payload_sizes() {
        let payload = vec![b'a'; 2500];
        let frames = chunk_payload(&payload, ModeTag::Fec, DEFAULT_CHUNK_MAX).unwrap();
        let sizes: Vec<_> = frames.iter().map(|f| f.body.len()).collect();
        assert_eq!(sizes, [1000, 1000, 500]);
        assert!(frames.iter().all(|f| f.declared_len() <= DEFAULT_CHUNK_MAX + TAG_LEN));
    }

    #[test]
    fn test_chunk_payload_rejects_empty() {
        assert!(chunk_payload(b"", ModeTag::Fec, 10).is_err());
        assert!(chunk_payload(b"abc", ModeTag::Fec, 0).is_err());
    }

    #[test]
    fn test_terminator() {
        assert!(is_terminated(b"abc:END:"));
        assert!(!is_terminated(b":END:abc"));
    }
}
