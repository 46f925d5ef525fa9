//! CR-terminated line codec for the TNC command channel

use crate::StreamCodec;

/// Maximum length of a single status line
pub const MAX_LINE_LEN: usize = 512;

/// Line terminator used by the TNC
pub const LINE_TERMINATOR: u8 = b'\r';

/// Streaming splitter for the command channel
///
/// Lines are terminated by CR. A stray LF (some TNC builds send CRLF) is
/// trimmed along with surrounding whitespace, and blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Number of buffered bytes not yet forming a complete line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl StreamCodec for LineCodec {
    type Item = String;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A runaway line without a terminator is garbage; keep only the tail
        if self.buffer.len() > MAX_LINE_LEN * 4
            && !self.buffer.contains(&LINE_TERMINATOR)
        {
            tracing::warn!(
                "Dropping {} bytes of unterminated command channel data",
                self.buffer.len() - MAX_LINE_LEN
            );
            let start = self.buffer.len() - MAX_LINE_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    fn next_item(&mut self) -> Option<Self::Item> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == LINE_TERMINATOR)?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();

            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_LINE_LEN {
                tracing::warn!("Discarding over-long status line ({} bytes)", line.len());
                continue;
            }
            return Some(line.to_string());
        }
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"STATE DISC\rBUFFER 0\r");
        assert_eq!(codec.next_item().as_deref(), Some("STATE DISC"));
        assert_eq!(codec.next_item().as_deref(), Some("BUFFER 0"));
        assert_eq!(codec.next_item(), None);
    }

    #[test]
    fn test_partial_line_waits() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"PTT TR");
        assert_eq!(codec.next_item(), None);
        assert_eq!(codec.pending(), 6);
        codec.push_bytes(b"UE\r");
        assert_eq!(codec.next_item().as_deref(), Some("PTT TRUE"));
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"\r\r\nT T\r\n");
        assert_eq!(codec.next_item().as_deref(), Some("T T"));
        // Trailing LF stays buffered until the next CR and is then trimmed away
        codec.push_bytes(b"T F\r");
        assert_eq!(codec.next_item().as_deref(), Some("T F"));
    }

    #[test]
    fn test_runaway_data_is_bounded() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&vec![b'x'; MAX_LINE_LEN * 5]);
        assert_eq!(codec.pending(), MAX_LINE_LEN);
        codec.clear();
        assert_eq!(codec.pending(), 0);
    }
}
