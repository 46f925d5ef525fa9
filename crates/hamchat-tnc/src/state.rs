//! Shared TNC session state
//!
//! One [`TncState`] record is published through a `watch` channel. Each
//! field has a single writer:
//!
//! - connection statuses: the modem channel (command, data) and the session
//!   supervisor (rig)
//! - everything else: the command response loop, from TNC status lines
//!
//! Readers take snapshots or subscribe and may see a value one update old.

use std::fmt;
use std::sync::Arc;

use hamchat_protocol::{ModulationProfile, ProtocolMode};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::TncError;

/// Which socket a connection status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// CR-terminated command/status lines
    Command,
    /// Length-prefixed data frames
    Data,
    /// rigctld keying and tuning
    RigControl,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Data => "data",
            Self::RigControl => "rig-control",
        })
    }
}

/// Lifecycle of one socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

impl ConnectionStatus {
    /// Allowed moves: Disconnected -> Connecting -> Ready|Failed -> Disconnected
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Ready)
                | (Connecting, Failed)
                | (Ready, Disconnected)
                | (Failed, Disconnected)
        )
    }

    /// Whether the socket may be used
    pub fn is_usable(self) -> bool {
        self == ConnectionStatus::Ready
    }
}

/// Snapshot of everything known about the TNC session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TncState {
    /// Last reported session state (`DISC`, `FECSend`, ...)
    pub session_status: String,
    /// Bytes queued in the TNC's outbound buffer
    pub buffer_occupancy: u32,
    /// Transmitter keyed
    pub keyed: bool,
    /// Protocol mode as echoed by the TNC
    pub protocol_mode: ProtocolMode,
    /// Own callsign as echoed by the TNC
    pub callsign: Option<String>,
    /// Grid locator as echoed by the TNC
    pub gridsquare: Option<String>,
    /// FEC mode and repeats as echoed by the TNC
    pub profile: ModulationProfile,
    /// Command socket status
    pub command: ConnectionStatus,
    /// Data socket status
    pub data: ConnectionStatus,
    /// rigctld socket status
    pub rig: ConnectionStatus,
    /// Incremented on every change
    pub version: u64,
}

impl Default for TncState {
    fn default() -> Self {
        Self {
            session_status: "DISC".to_string(),
            buffer_occupancy: 0,
            keyed: false,
            protocol_mode: ProtocolMode::default(),
            callsign: None,
            gridsquare: None,
            profile: ModulationProfile::default(),
            command: ConnectionStatus::Disconnected,
            data: ConnectionStatus::Disconnected,
            rig: ConnectionStatus::Disconnected,
            version: 0,
        }
    }
}

impl TncState {
    /// Both modem channels usable
    pub fn is_ready(&self) -> bool {
        self.command.is_usable() && self.data.is_usable()
    }

    /// Status of one channel
    pub fn connection(&self, channel: ChannelKind) -> ConnectionStatus {
        match channel {
            ChannelKind::Command => self.command,
            ChannelKind::Data => self.data,
            ChannelKind::RigControl => self.rig,
        }
    }

    fn connection_mut(&mut self, channel: ChannelKind) -> &mut ConnectionStatus {
        match channel {
            ChannelKind::Command => &mut self.command,
            ChannelKind::Data => &mut self.data,
            ChannelKind::RigControl => &mut self.rig,
        }
    }

    /// Minutes needed to send what is queued at the current FEC mode
    pub fn estimated_send_minutes(&self) -> Option<f64> {
        self.profile
            .mode
            .estimate_minutes(self.buffer_occupancy as usize)
    }
}

/// Cloneable handle to the published [`TncState`]
#[derive(Debug, Clone)]
pub struct SharedState {
    tx: Arc<watch::Sender<TncState>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create a state channel holding the default state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TncState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn snapshot(&self) -> TncState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<TncState> {
        self.tx.subscribe()
    }

    /// Modify the state; subscribers are notified only if `f` returns true
    pub fn update(&self, f: impl FnOnce(&mut TncState) -> bool) -> bool {
        self.tx.send_if_modified(|state| {
            let changed = f(state);
            if changed {
                state.version += 1;
            }
            changed
        })
    }

    /// Move a channel to a new status, enforcing the allowed transitions
    pub fn transition(&self, channel: ChannelKind, to: ConnectionStatus) -> Result<(), TncError> {
        let mut result = Ok(());
        self.update(|state| {
            let slot = state.connection_mut(channel);
            if slot.can_transition_to(to) {
                *slot = to;
                true
            } else {
                result = Err(TncError::InvalidTransition {
                    channel,
                    from: *slot,
                    to,
                });
                false
            }
        });
        result
    }

    /// Walk a channel back to Disconnected through legal transitions
    ///
    /// A channel caught mid-connect fails first.
    pub fn reset_connection(&self, channel: ChannelKind) -> Result<(), TncError> {
        loop {
            let next = match self.snapshot().connection(channel) {
                ConnectionStatus::Disconnected => return Ok(()),
                ConnectionStatus::Connecting => ConnectionStatus::Failed,
                ConnectionStatus::Ready | ConnectionStatus::Failed => ConnectionStatus::Disconnected,
            };
            self.transition(channel, next)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_rules() {
        use ConnectionStatus::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Ready));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Ready.can_transition_to(Disconnected));
        assert!(Failed.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Connecting));
        assert!(!Failed.can_transition_to(Ready));
    }

    #[test]
    fn test_shared_transition_enforced() {
        let state = SharedState::new();
        assert!(state
            .transition(ChannelKind::Command, ConnectionStatus::Ready)
            .is_err());
        state
            .transition(ChannelKind::Command, ConnectionStatus::Connecting)
            .unwrap();
        state
            .transition(ChannelKind::Command, ConnectionStatus::Ready)
            .unwrap();
        assert!(!state.snapshot().is_ready());

        state
            .transition(ChannelKind::Data, ConnectionStatus::Connecting)
            .unwrap();
        state
            .transition(ChannelKind::Data, ConnectionStatus::Ready)
            .unwrap();
        assert!(state.snapshot().is_ready());

        state.reset_connection(ChannelKind::Data).unwrap();
        assert_eq!(state.snapshot().data, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_reset_from_connecting_goes_through_failed() {
        let state = SharedState::new();
        state
            .transition(ChannelKind::RigControl, ConnectionStatus::Connecting)
            .unwrap();

        state.reset_connection(ChannelKind::RigControl).unwrap();
        let after = state.snapshot();
        assert_eq!(after.rig, ConnectionStatus::Disconnected);
        // Connecting -> Failed -> Disconnected is two updates
        assert_eq!(after.version, 3);

        // Already disconnected is a no-op
        state.reset_connection(ChannelKind::RigControl).unwrap();
        assert_eq!(state.snapshot().version, 3);
    }

    #[test]
    fn test_version_bumps_only_on_change() {
        let state = SharedState::new();
        let rx = state.subscribe();
        assert!(!state.update(|_| false));
        assert_eq!(state.snapshot().version, 0);
        assert!(!rx.has_changed().unwrap());

        state.update(|s| {
            s.buffer_occupancy = 42;
            true
        });
        assert_eq!(state.snapshot().version, 1);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_estimated_send_minutes() {
        let state = TncState {
            buffer_occupancy: 620,
            ..Default::default()
        };
        assert_eq!(state.estimated_send_minutes(), Some(2.0));
    }
}
