//! Events delivered to plugins
//!
//! Every event has an [`EventKind`] tag. Plugins declare the tags they want
//! as an [`EventSet`]; the router keeps a lookup table from tag to
//! subscribers so each event only visits interested plugins.

use hamchat_protocol::ParsedPayload;

/// A reassembled payload as seen by plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPayload {
    /// Raw bytes including header and terminator
    pub raw: Vec<u8>,
    /// Header and body split
    pub parsed: ParsedPayload,
    /// False when the payload was cut short by the inactivity timeout
    pub complete: bool,
}

impl InboundPayload {
    pub fn new(raw: Vec<u8>, complete: bool) -> Self {
        let parsed = ParsedPayload::parse(&raw);
        Self {
            raw,
            parsed,
            complete,
        }
    }
}

/// Event delivered to plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// A payload addressed to the plugin's handler (or any payload for wildcard plugins)
    Payload(InboundPayload),
    /// A line arrived on the TNC command channel
    CommandLine(String),
    /// Bytes were loaded into the TNC buffer
    PayloadLoaded { len: usize },
    /// The host asked the TNC to transmit its buffer
    TransmitRequested,
    /// The TNC buffer was purged
    BufferCleared,
    /// Transmitter keyed or released
    KeyingChanged { keyed: bool },
    /// Station settings changed
    SettingsChanged { callsign: String, gridsquare: String },
    /// The host is shutting down
    Shutdown,
}

impl PluginEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Payload(_) => EventKind::Payload,
            Self::CommandLine(_) => EventKind::CommandLine,
            Self::PayloadLoaded { .. } => EventKind::PayloadLoaded,
            Self::TransmitRequested => EventKind::TransmitRequested,
            Self::BufferCleared => EventKind::BufferCleared,
            Self::KeyingChanged { .. } => EventKind::KeyingChanged,
            Self::SettingsChanged { .. } => EventKind::SettingsChanged,
            Self::Shutdown => EventKind::Shutdown,
        }
    }
}

/// Tag of a [`PluginEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Payload,
    CommandLine,
    PayloadLoaded,
    TransmitRequested,
    BufferCleared,
    KeyingChanged,
    SettingsChanged,
    Shutdown,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Payload,
        EventKind::CommandLine,
        EventKind::PayloadLoaded,
        EventKind::TransmitRequested,
        EventKind::BufferCleared,
        EventKind::KeyingChanged,
        EventKind::SettingsChanged,
        EventKind::Shutdown,
    ];

    const fn bit(self) -> u16 {
        1 << self as u16
    }
}

/// Set of event kinds a plugin subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet(u16);

impl EventSet {
    pub const EMPTY: EventSet = EventSet(0);

    /// Host lifecycle events
    pub const LIFECYCLE: EventSet = EventSet::EMPTY
        .with(EventKind::TransmitRequested)
        .with(EventKind::BufferCleared)
        .with(EventKind::SettingsChanged)
        .with(EventKind::Shutdown);

    /// Everything except payloads, which are routed by handler identifier
    pub const ALL: EventSet = EventSet::LIFECYCLE
        .with(EventKind::CommandLine)
        .with(EventKind::PayloadLoaded)
        .with(EventKind::KeyingChanged);

    pub const fn with(self, kind: EventKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<EventKind> for EventSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_set() {
        let set = EventSet::LIFECYCLE;
        assert!(set.contains(EventKind::Shutdown));
        assert!(set.contains(EventKind::TransmitRequested));
        assert!(!set.contains(EventKind::CommandLine));
        assert!(!set.contains(EventKind::Payload));
        assert_eq!(set.iter().count(), 4);
    }

    #[test]
    fn test_all_excludes_payload() {
        assert!(!EventSet::ALL.contains(EventKind::Payload));
        assert_eq!(EventSet::ALL.iter().count(), 7);
    }

    #[test]
    fn test_collect() {
        let set: EventSet = [EventKind::KeyingChanged, EventKind::Shutdown]
            .into_iter()
            .collect();
        assert!(set.contains(EventKind::KeyingChanged));
        assert!(!set.contains(EventKind::BufferCleared));
    }

    #[test]
    fn test_event_kind() {
        let payload = InboundPayload::new(b"N0CALL:chat:1.0:ALL:BEGIN:hi:END:".to_vec(), true);
        assert_eq!(payload.parsed.protocol_id(), Some("chat"));
        assert_eq!(PluginEvent::Payload(payload).kind(), EventKind::Payload);
        assert_eq!(
            PluginEvent::KeyingChanged { keyed: true }.kind(),
            EventKind::KeyingChanged
        );
    }
}
