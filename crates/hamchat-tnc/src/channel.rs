//! Modem socket management
//!
//! [`ModemChannel`] opens the command and data sockets to the TNC and keeps
//! their connection status in the shared state. It is owned by the session
//! supervisor, so at most one connect attempt is ever in flight.

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TncConfig;
use crate::error::TncError;
use crate::events::{EventSender, TncEvent};
use crate::state::{ChannelKind, ConnectionStatus, SharedState};

/// The two open TNC sockets
#[derive(Debug)]
pub struct ModemLink {
    /// Command/status socket
    pub command: TcpStream,
    /// Data socket
    pub data: TcpStream,
}

/// Connects to the TNC and tracks command/data socket status
#[derive(Debug)]
pub struct ModemChannel {
    state: SharedState,
    events: EventSender,
}

impl ModemChannel {
    /// Create a channel publishing into `state`
    pub fn new(state: SharedState, events: EventSender) -> Self {
        Self { state, events }
    }

    fn set_status(&self, channel: ChannelKind, status: ConnectionStatus) {
        if let Err(e) = self.state.transition(channel, status) {
            warn!("{}", e);
            return;
        }
        self.events
            .emit(TncEvent::ConnectionChanged { channel, status });
    }

    /// Both sockets usable
    pub fn is_ready(&self) -> bool {
        self.state.snapshot().is_ready()
    }

    /// Open both sockets, retrying with backoff
    ///
    /// A partially opened link is closed before the next attempt. Gives up
    /// with [`TncError::ConnectFailed`] once `max_connect_attempts` is
    /// reached, or with [`TncError::Cancelled`] when `cancel` fires.
    pub async fn connect(
        &mut self,
        config: &TncConfig,
        cancel: &CancellationToken,
    ) -> Result<ModemLink, TncError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > 1 {
                self.events.emit(TncEvent::Reconnecting { attempt });
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.teardown();
                    return Err(TncError::Cancelled);
                }
                result = self.try_connect(config) => result,
            };

            match result {
                Ok(link) => {
                    info!(
                        "Connected to TNC at {}:{} (data {})",
                        config.host,
                        config.port,
                        config.data_port()
                    );
                    return Ok(link);
                }
                Err(e) => {
                    warn!("TNC connect attempt {} failed: {}", attempt, e);
                    self.teardown();
                }
            }

            if config.max_connect_attempts.is_some_and(|max| attempt >= max) {
                return Err(TncError::ConnectFailed { attempts: attempt });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(TncError::Cancelled),
                _ = tokio::time::sleep(config.backoff()) => {}
            }
        }
    }

    async fn try_connect(&self, config: &TncConfig) -> Result<ModemLink, TncError> {
        self.set_status(ChannelKind::Command, ConnectionStatus::Connecting);
        self.set_status(ChannelKind::Data, ConnectionStatus::Connecting);

        let (host, port) = config.command_addr();
        let command = match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_status(ChannelKind::Command, ConnectionStatus::Failed);
                self.set_status(ChannelKind::Data, ConnectionStatus::Failed);
                return Err(TncError::on(ChannelKind::Command)(e));
            }
        };
        self.set_status(ChannelKind::Command, ConnectionStatus::Ready);

        let (host, port) = config.data_addr();
        let data = match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_status(ChannelKind::Data, ConnectionStatus::Failed);
                // `command` is dropped here, closing the half-open link
                return Err(TncError::on(ChannelKind::Data)(e));
            }
        };
        self.set_status(ChannelKind::Data, ConnectionStatus::Ready);

        command.set_nodelay(true).ok();
        data.set_nodelay(true).ok();
        Ok(ModemLink { command, data })
    }

    /// Mark both sockets disconnected
    ///
    /// The sockets themselves belong to the session and close when it drops
    /// them, after every loop using them has returned.
    pub fn teardown(&self) {
        for channel in [ChannelKind::Command, ChannelKind::Data] {
            let status = self.state.snapshot().connection(channel);
            match status {
                ConnectionStatus::Disconnected => {}
                ConnectionStatus::Connecting => {
                    self.set_status(channel, ConnectionStatus::Failed);
                    self.set_status(channel, ConnectionStatus::Disconnected);
                }
                ConnectionStatus::Ready | ConnectionStatus::Failed => {
                    self.set_status(channel, ConnectionStatus::Disconnected);
                }
            }
        }
        debug!("Modem channel torn down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    async fn listener_pair() -> (TcpListener, TcpListener) {
        (
            TcpListener::bind("127.0.0.1:0").await.unwrap(),
            TcpListener::bind("127.0.0.1:0").await.unwrap(),
        )
    }

    fn config_for(cmd: &TcpListener, data: &TcpListener) -> TncConfig {
        TncConfig {
            host: "127.0.0.1".into(),
            port: cmd.local_addr().unwrap().port(),
            data_port: Some(data.local_addr().unwrap().port()),
            backoff_ms: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_marks_ready() {
        let (cmd, data) = listener_pair().await;
        let config = config_for(&cmd, &data);
        let state = SharedState::new();
        let mut channel = ModemChannel::new(state.clone(), EventSender::new());

        let link = channel
            .connect(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert!(channel.is_ready());

        channel.teardown();
        drop(link);
        assert!(!channel.is_ready());
        assert_eq!(state.snapshot().command, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (cmd, data) = listener_pair().await;
        let mut config = config_for(&cmd, &data);
        config.max_connect_attempts = Some(3);
        // Nothing listens on the data port any more
        drop(data);

        let events = EventSender::new();
        let mut rx = events.subscribe();
        let state = SharedState::new();
        let mut channel = ModemChannel::new(state.clone(), events);

        let err = channel
            .connect(&config, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TncError::ConnectFailed { attempts: 3 }));
        assert_eq!(state.snapshot().command, ConnectionStatus::Disconnected);
        assert_eq!(state.snapshot().data, ConnectionStatus::Disconnected);

        let mut reconnects = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, TncEvent::Reconnecting { .. }) {
                reconnects += 1;
            }
        }
        assert_eq!(reconnects, 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let (cmd, data) = listener_pair().await;
        let config = config_for(&cmd, &data);
        drop(cmd);

        let cancel = CancellationToken::new();
        let mut channel = ModemChannel::new(SharedState::new(), EventSender::new());
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = channel.connect(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, TncError::Cancelled));
    }
}
