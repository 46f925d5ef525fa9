//! Session supervisor and public handle
//!
//! The supervisor task owns the modem channel. For every connection it
//! provisions the TNC and then drives three loops over the sockets:
//!
//! - the command response loop (command socket)
//! - the frame assembler (data socket, inbound)
//! - the buffer writer (data socket, outbound)
//!
//! When any loop ends the others are stopped through a per-session
//! cancellation token. Sockets are dropped only after all three returned,
//! then the supervisor backs off and reconnects. Cancelling the root token
//! releases the transmitter and stops everything.

use hamchat_protocol::TncCommand;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assembler::{AssembledPayload, FrameAssembler};
use crate::channel::{ModemChannel, ModemLink};
use crate::command::{CommandClient, CommandLoop, CommandRequest, COMMAND_QUEUE};
use crate::config::TncConfig;
use crate::error::TncError;
use crate::events::{EventSender, TncEvent};
use crate::keying::{Keying, VoxKeying};
use crate::rig::RigControl;
use crate::state::{ChannelKind, ConnectionStatus, SharedState, TncState};
use crate::writer::{BufferWriter, WriteOutcome, WriterConfig};

/// Capacity of the outbound payload queue
const WRITE_QUEUE: usize = 16;

/// Capacity of the inbound payload queue
const PAYLOAD_QUEUE: usize = 64;

/// A payload waiting to be loaded into the TNC buffer
#[derive(Debug)]
pub struct WriteRequest {
    pub payload: Vec<u8>,
    pub reply: oneshot::Sender<Result<WriteOutcome, TncError>>,
}

/// Out-of-band requests to the supervisor
#[derive(Debug)]
enum SessionControl {
    UpdateSettings(Box<TncConfig>),
    Reconnect,
}

/// Handle to a running transport engine
pub struct TncHandle {
    commands: CommandClient,
    writes: mpsc::Sender<WriteRequest>,
    control: mpsc::Sender<SessionControl>,
    state: SharedState,
    events: EventSender,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), TncError>>,
}

impl TncHandle {
    /// Validate `config` and start the engine on the current runtime
    ///
    /// Returns the handle and the receiver of reassembled inbound payloads.
    pub fn spawn(
        config: TncConfig,
    ) -> Result<(Self, mpsc::Receiver<AssembledPayload>), TncError> {
        config.validate()?;

        let state = SharedState::new();
        let events = EventSender::new();
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE);
        let (control_tx, control_rx) = mpsc::channel(8);
        let (payload_tx, payload_rx) = mpsc::channel(PAYLOAD_QUEUE);

        let commands = CommandClient::new(command_tx, state.clone(), config.command_timeout());

        let supervisor = Supervisor {
            channel: ModemChannel::new(state.clone(), events.clone()),
            config,
            state: state.clone(),
            events: events.clone(),
            commands: commands.clone(),
            command_rx,
            write_rx,
            control_rx,
            payload_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        Ok((
            Self {
                commands,
                writes: write_tx,
                control: control_tx,
                state,
                events,
                cancel,
                task,
            },
            payload_rx,
        ))
    }

    /// Command channel client
    pub fn commands(&self) -> &CommandClient {
        &self.commands
    }

    /// Current state snapshot
    pub fn state(&self) -> TncState {
        self.state.snapshot()
    }

    /// Shared state handle
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe_state(&self) -> watch::Receiver<TncState> {
        self.state.subscribe()
    }

    /// Subscribe to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<TncEvent> {
        self.events.subscribe()
    }

    /// Both modem channels usable
    pub fn is_ready(&self) -> bool {
        self.state.snapshot().is_ready()
    }

    /// Load a payload into the TNC buffer
    pub async fn write_payload(&self, payload: Vec<u8>) -> Result<WriteOutcome, TncError> {
        if payload.is_empty() || !self.is_ready() {
            return Ok(WriteOutcome::Rejected);
        }
        let (reply, rx) = oneshot::channel();
        self.writes
            .send(WriteRequest { payload, reply })
            .await
            .map_err(|_| TncError::ChannelClosed)?;
        rx.await.map_err(|_| TncError::ChannelClosed)?
    }

    /// Transmit what is in the TNC buffer
    pub async fn transmit(&self) -> Result<(), TncError> {
        self.commands.transmit().await
    }

    /// Discard the TNC buffer
    pub async fn clear_buffer(&self) -> Result<(), TncError> {
        self.commands.purge_buffer().await
    }

    /// Abort the transmission in progress
    pub async fn abort(&self) -> Result<(), TncError> {
        self.commands.abort().await
    }

    /// Apply new settings
    ///
    /// Station changes are sent to the connected TNC; address changes force
    /// a reconnect.
    pub async fn update_settings(&self, config: TncConfig) -> Result<(), TncError> {
        config.validate()?;
        self.control
            .send(SessionControl::UpdateSettings(Box::new(config)))
            .await
            .map_err(|_| TncError::ChannelClosed)
    }

    /// Drop the current connection and connect again
    pub async fn reconnect(&self) -> Result<(), TncError> {
        self.control
            .send(SessionControl::Reconnect)
            .await
            .map_err(|_| TncError::ChannelClosed)
    }

    /// Stop the engine and wait for it to finish
    pub async fn shutdown(self) -> Result<(), TncError> {
        info!("Shutting down TNC engine");
        self.cancel.cancel();
        self.task.await.map_err(|_| TncError::ChannelClosed)?
    }
}

struct Supervisor {
    config: TncConfig,
    channel: ModemChannel,
    state: SharedState,
    events: EventSender,
    commands: CommandClient,
    command_rx: mpsc::Receiver<CommandRequest>,
    write_rx: mpsc::Receiver<WriteRequest>,
    control_rx: mpsc::Receiver<SessionControl>,
    payload_tx: mpsc::Sender<AssembledPayload>,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(mut self) -> Result<(), TncError> {
        info!("TNC supervisor started");

        loop {
            let connected = tokio::select! {
                result = self.channel.connect(&self.config, &self.cancel) => result,
                control = self.control_rx.recv() => {
                    self.channel.teardown();
                    self.handle_offline_control(control);
                    continue;
                }
            };

            let link = match connected {
                Ok(link) => link,
                Err(TncError::Cancelled) => break,
                Err(e) => {
                    error!("Giving up on TNC: {}", e);
                    self.events.emit(TncEvent::warning("channel", e.to_string()));
                    return Err(e);
                }
            };

            let keying = self.connect_keying().await;
            match self.run_session(link, keying).await {
                Ok(()) => debug!("Session ended"),
                Err(e) => warn!("Session lost: {}", e),
            }
            self.channel.teardown();
            if let Err(e) = self.state.reset_connection(ChannelKind::RigControl) {
                warn!("{}", e);
            }

            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.backoff()) => {}
            }
        }

        info!("TNC supervisor stopped");
        Ok(())
    }

    fn handle_offline_control(&mut self, control: Option<SessionControl>) {
        match control {
            Some(SessionControl::UpdateSettings(next)) => {
                info!("Settings updated while disconnected");
                self.config = *next;
            }
            Some(SessionControl::Reconnect) => {}
            None => self.cancel.cancel(),
        }
    }

    fn set_rig_status(&self, status: ConnectionStatus) {
        if self
            .state
            .transition(ChannelKind::RigControl, status)
            .is_ok()
        {
            self.events.emit(TncEvent::ConnectionChanged {
                channel: ChannelKind::RigControl,
                status,
            });
        }
    }

    async fn connect_keying(&self) -> Keying {
        let Some(rig) = &self.config.rig else {
            info!("No rig control configured, keying by VOX");
            return Keying::Vox(VoxKeying);
        };

        self.set_rig_status(ConnectionStatus::Connecting);
        let connected = async {
            let mut control = RigControl::connect(rig).await?;
            control.test().await?;
            Ok::<_, TncError>(control)
        }
        .await;

        match connected {
            Ok(control) => {
                info!("Connected to rigctld at {}:{}", rig.host, rig.port);
                self.set_rig_status(ConnectionStatus::Ready);
                Keying::Rig(control)
            }
            Err(e) => {
                warn!("rigctld unavailable ({}), keying by VOX", e);
                self.set_rig_status(ConnectionStatus::Failed);
                self.events.emit(TncEvent::warning(
                    "rig",
                    format!("rigctld unavailable: {}", e),
                ));
                Keying::Vox(VoxKeying)
            }
        }
    }

    async fn run_session(&mut self, link: ModemLink, keying: Keying) -> Result<(), TncError> {
        let session = self.cancel.child_token();
        let ModemLink { command, data } = link;
        let (command_read, command_write) = command.into_split();
        let (data_read, data_write) = data.into_split();

        let mut command_loop = CommandLoop::new(
            command_read,
            command_write,
            keying,
            self.state.clone(),
            self.events.clone(),
        )
        .with_status_poll(self.config.status_poll_ms.map(std::time::Duration::from_millis));
        command_loop
            .provision(&self.config.station.provisioning())
            .await?;

        let mut assembler = FrameAssembler::new(data_read, self.config.reassembly_timeout());
        let mut writer = BufferWriter::new(
            data_write,
            self.commands.clone(),
            self.state.clone(),
            self.events.clone(),
            WriterConfig::from(&self.config),
        );

        let Self {
            config,
            commands,
            command_rx,
            write_rx,
            control_rx,
            payload_tx,
            events,
            cancel,
            ..
        } = self;

        let results = {
            let command_fut = async {
                let _guard = session.clone().drop_guard();
                command_loop.run(command_rx, &session).await
            };
            let receive_fut = async {
                let _guard = session.clone().drop_guard();
                receive_loop(&mut assembler, payload_tx, events, &session).await
            };
            let write_fut = async {
                let _guard = session.clone().drop_guard();
                write_loop(&mut writer, write_rx, &session).await
            };
            let loops = async { tokio::join!(command_fut, receive_fut, write_fut) };
            tokio::pin!(loops);

            loop {
                tokio::select! {
                    results = &mut loops => break results,
                    control = control_rx.recv(), if !session.is_cancelled() => match control {
                        Some(SessionControl::UpdateSettings(next)) => {
                            if config.needs_reconnect(&next) {
                                info!("Connection settings changed, reconnecting");
                                *config = *next;
                                session.cancel();
                            } else {
                                let changes = config.station.changes_to(&next.station);
                                *config = *next;
                                send_in_background(commands.clone(), changes);
                            }
                        }
                        Some(SessionControl::Reconnect) => {
                            info!("Reconnect requested");
                            session.cancel();
                        }
                        None => cancel.cancel(),
                    },
                }
            }
        };

        // Loops have returned; the link may be gone, but the radio must not stay keyed
        command_loop.release().await;

        let (command_result, receive_result, write_result) = results;
        command_result.and(receive_result).and(write_result)
    }
}

fn send_in_background(commands: CommandClient, changes: Vec<TncCommand>) {
    if changes.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for command in changes {
            if let Err(e) = commands.send(command).await {
                warn!("Failed to apply setting: {}", e);
            }
        }
    });
}

async fn receive_loop<R>(
    assembler: &mut FrameAssembler<R>,
    payloads: &mpsc::Sender<AssembledPayload>,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<(), TncError>
where
    R: AsyncRead + Unpin + Send,
{
    while let Some(payload) = assembler.next_payload(cancel).await? {
        events.emit(TncEvent::PayloadReceived {
            len: payload.bytes.len(),
            completion: payload.completion,
        });
        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = payloads.send(payload) => {
                if sent.is_err() {
                    debug!("Payload receiver dropped, discarding");
                }
            }
        }
    }
    Ok(())
}

async fn write_loop<W>(
    writer: &mut BufferWriter<W>,
    requests: &mut mpsc::Receiver<WriteRequest>,
    cancel: &CancellationToken,
) -> Result<(), TncError>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            request = requests.recv() => request,
        };
        let Some(WriteRequest { payload, reply }) = request else {
            cancel.cancelled().await;
            return Ok(());
        };

        match writer.write(&payload, cancel).await {
            Ok(outcome) => {
                let _ = reply.send(Ok(outcome));
            }
            Err(TncError::Cancelled) => {
                let _ = reply.send(Err(TncError::Cancelled));
                return Ok(());
            }
            Err(e) => {
                let _ = reply.send(Err(TncError::ChannelClosed));
                return Err(e);
            }
        }
    }
}
