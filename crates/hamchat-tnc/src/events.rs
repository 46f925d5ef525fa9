//! Event stream for the transport engine
//!
//! Connection changes, keying transitions, raw status lines and warnings
//! that the host should surface are emitted through one broadcast channel.
//! State itself is published separately through [`crate::SharedState`].

use tokio::sync::broadcast;

use crate::assembler::Completion;
use crate::state::{ChannelKind, ConnectionStatus};

/// Capacity of the event broadcast channel
pub const EVENT_CAPACITY: usize = 256;

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum TncEvent {
    // -------------------------------------------------------------------------
    // Link events
    // -------------------------------------------------------------------------
    /// A channel changed connection status
    ConnectionChanged {
        /// Channel affected
        channel: ChannelKind,
        /// New status
        status: ConnectionStatus,
    },

    /// A reconnect attempt is about to start
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
    },

    // -------------------------------------------------------------------------
    // Command channel
    // -------------------------------------------------------------------------
    /// Transmitter keyed or released
    KeyingChanged {
        /// New keying state
        keyed: bool,
    },

    /// A line arrived on the command channel
    CommandLine {
        /// The line, terminator removed
        line: String,
    },

    // -------------------------------------------------------------------------
    // Data channel
    // -------------------------------------------------------------------------
    /// An outbound payload was written to the TNC buffer
    PayloadLoaded {
        /// Payload length in bytes
        len: usize,
        /// Number of frames written
        frames: usize,
    },

    /// An inbound payload was reassembled
    PayloadReceived {
        /// Payload length in bytes
        len: usize,
        /// How the payload ended
        completion: Completion,
    },

    /// Something the operator should know about
    Warning {
        /// Component raising the warning
        source: String,
        /// Message
        message: String,
    },
}

impl TncEvent {
    /// Build a warning event
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warning {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Check if this is a link lifecycle event
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            TncEvent::ConnectionChanged { .. } | TncEvent::Reconnecting { .. }
        )
    }

    /// Check if this is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, TncEvent::Warning { .. })
    }
}

/// Sending side of the event stream
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: broadcast::Sender<TncEvent>,
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSender {
    /// Create a new event stream
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit an event; having no subscribers is not an error
    pub fn emit(&self, event: TncEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<TncEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let connected = TncEvent::ConnectionChanged {
            channel: ChannelKind::Command,
            status: ConnectionStatus::Ready,
        };
        assert!(connected.is_link());
        assert!(!connected.is_warning());

        let warning = TncEvent::warning("writer", "buffer confirmation lost");
        assert!(warning.is_warning());
        assert!(!warning.is_link());
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let events = EventSender::new();
        events.emit(TncEvent::KeyingChanged { keyed: true });

        let mut rx = events.subscribe();
        events.emit(TncEvent::KeyingChanged { keyed: false });
        assert_eq!(
            rx.recv().await.unwrap(),
            TncEvent::KeyingChanged { keyed: false }
        );
    }
}
