//! Error types for the transport engine

use thiserror::Error;

use crate::state::{ChannelKind, ConnectionStatus};

/// Errors that can occur in the transport engine
#[derive(Debug, Error)]
pub enum TncError {
    /// A socket operation failed on one of the channels
    #[error("{channel} channel: {source}")]
    Connection {
        /// Channel the error occurred on
        channel: ChannelKind,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The peer closed a channel
    #[error("{0} channel closed by peer")]
    Closed(ChannelKind),

    /// Connecting gave up after the configured number of attempts
    #[error("failed to connect after {attempts} attempts")]
    ConnectFailed {
        /// Attempts made
        attempts: u32,
    },

    /// The modem link is not ready
    #[error("modem link not ready")]
    NotReady,

    /// No reply arrived in time
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The engine task is gone or the link dropped mid-request
    #[error("engine channel closed")]
    ChannelClosed,

    /// The stop signal fired
    #[error("cancelled")]
    Cancelled,

    /// Configuration cannot be used
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Illegal connection status change
    #[error("invalid {channel} transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Channel whose status was changed
        channel: ChannelKind,
        /// Current status
        from: ConnectionStatus,
        /// Requested status
        to: ConnectionStatus,
    },

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] hamchat_protocol::ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TncError {
    /// Wrap an I/O error with the channel it happened on
    pub fn on(channel: ChannelKind) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Connection { channel, source }
    }

    /// Whether reconnecting can clear this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidConfig(_) | Self::ConnectFailed { .. } | Self::Cancelled
        )
    }
}
