//! Inbound payload reassembly
//!
//! Frames from the data socket are stripped of their length prefix and mode
//! tag and appended to the payload in progress. A payload is complete when
//! it ends with the terminator, or when no data arrives for the inactivity
//! timeout after it was started. Frame boundaries and counts never decide
//! completion.
//!
//! ARDOP repeats the tag on the first frame of a transmission (`FECFEC...`).
//! The repeat is dropped from the first frame of each payload only; later
//! frames are appended as received.

use std::time::Duration;

use hamchat_protocol::frame::{is_terminated, TAG_LEN};
use hamchat_protocol::{FrameCodec, ModeTag, StreamCodec};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::TncError;
use crate::state::ChannelKind;

/// How a payload was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    /// Ended with the terminator
    Terminated,
    /// The inactivity timeout expired first
    TimedOut,
}

/// A reassembled inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPayload {
    /// Accepted frame bodies in arrival order, terminator included
    pub bytes: Vec<u8>,
    /// How the payload ended
    pub completion: Completion,
    /// Number of frames that contributed
    pub frames: usize,
}

impl AssembledPayload {
    /// Whether the terminator was seen
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Terminated
    }
}

#[derive(Default)]
struct InProgress {
    bytes: Vec<u8>,
    frames: usize,
}

/// Reads frames from the data socket and yields whole payloads
pub struct FrameAssembler<R> {
    reader: R,
    codec: FrameCodec,
    timeout: Duration,
    current: Option<InProgress>,
    strip_duplicate_tag: bool,
    buffer: Vec<u8>,
}

impl<R> FrameAssembler<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create an assembler with the given inactivity timeout
    pub fn new(reader: R, timeout: Duration) -> Self {
        Self {
            reader,
            codec: FrameCodec::new(),
            timeout,
            current: None,
            strip_duplicate_tag: true,
            buffer: vec![0u8; 4096],
        }
    }

    /// Whether to drop a repeated tag at the start of a payload (on by default)
    ///
    /// Turn this off when talking to a peer that never repeats the tag and
    /// payloads may legitimately begin with the tag bytes.
    pub fn strip_duplicate_tag(mut self, strip: bool) -> Self {
        self.strip_duplicate_tag = strip;
        self
    }

    /// Feed every buffered frame; returns a payload if one completed
    fn drain_frames(&mut self) -> Option<AssembledPayload> {
        while let Some(item) = self.codec.next_item() {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Malformed data frame, dropping payload in progress: {}", e);
                    self.current = None;
                    continue;
                }
            };

            if frame.is_error() {
                debug!("Discarding ERR frame ({} bytes)", frame.body.len());
                continue;
            }

            trace!("Data frame {:?}, {} bytes", frame.tag, frame.body.len());
            let mut body = frame.body.as_slice();
            if self.current.is_none()
                && self.strip_duplicate_tag
                && frame.tag.is_some()
                && ModeTag::from_prefix(body) == frame.tag
            {
                body = &body[TAG_LEN..];
            }
            let current = self.current.get_or_insert_with(InProgress::default);
            current.bytes.extend_from_slice(body);
            current.frames += 1;

            if is_terminated(&current.bytes) {
                let done = self.current.take().unwrap_or_default();
                return Some(AssembledPayload {
                    bytes: done.bytes,
                    completion: Completion::Terminated,
                    frames: done.frames,
                });
            }
        }
        None
    }

    /// Wait for the next payload
    ///
    /// Idle waiting is unbounded; once a payload has started each read is
    /// bounded by the inactivity timeout. Returns `Ok(None)` when `cancel`
    /// fires and an error when the socket fails or closes.
    pub async fn next_payload(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<AssembledPayload>, TncError> {
        loop {
            if let Some(payload) = self.drain_frames() {
                return Ok(Some(payload));
            }

            let read = if self.current.is_some() {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    read = tokio::time::timeout(self.timeout, self.reader.read(&mut self.buffer)) => {
                        match read {
                            Ok(read) => read,
                            Err(_) => {
                                let partial = self.current.take().unwrap_or_default();
                                warn!(
                                    "Payload timed out after {} bytes in {} frames",
                                    partial.bytes.len(),
                                    partial.frames
                                );
                                self.codec.clear();
                                return Ok(Some(AssembledPayload {
                                    bytes: partial.bytes,
                                    completion: Completion::TimedOut,
                                    frames: partial.frames,
                                }));
                            }
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    read = self.reader.read(&mut self.buffer) => read,
                }
            };

            match read {
                Ok(0) => return Err(TncError::Closed(ChannelKind::Data)),
                Ok(n) => self.codec.push_bytes(&self.buffer[..n]),
                Err(e) => return Err(TncError::on(ChannelKind::Data)(e)),
            }
        }
    }

    /// Drop any partial payload and buffered bytes
    pub fn reset(&mut self) {
        self.current = None;
        self.codec.clear();
    }
}
