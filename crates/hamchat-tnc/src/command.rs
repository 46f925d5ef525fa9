//! Command response loop
//!
//! One loop owns the TNC command socket. It writes queued commands, drains
//! status lines and applies them to [`SharedState`]. Keying lines are
//! recognized before any other parsing and the keying side-channel is
//! driven inline, so a `PTT TRUE` reaches the radio before the loop looks at
//! anything else.
//!
//! Replies are not ordered relative to commands. A request waits for the
//! next line carrying its keyword; every line is applied to the state
//! regardless of whether a request consumed it.

use std::time::Duration;

use hamchat_protocol::line::LineCodec;
use hamchat_protocol::{EncodeCommand, StreamCodec, TncCommand, TncResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::TncError;
use crate::events::{EventSender, TncEvent};
use crate::keying::KeyingLine;
use crate::state::{ChannelKind, SharedState, TncState};

/// Capacity of the command request queue
pub const COMMAND_QUEUE: usize = 64;

/// Bound on a single keying side-channel operation
const KEYING_TIMEOUT: Duration = Duration::from_millis(1000);

/// Requests handled by the command loop
#[derive(Debug)]
pub enum CommandRequest {
    /// Write a command; `written` fires once it is on the wire
    Send {
        command: TncCommand,
        written: oneshot::Sender<()>,
    },
    /// Write a command and wait for the next line with its keyword
    Request {
        command: TncCommand,
        reply: oneshot::Sender<TncResponse>,
    },
}

/// Cloneable front end to the command loop
#[derive(Debug, Clone)]
pub struct CommandClient {
    tx: mpsc::Sender<CommandRequest>,
    state: SharedState,
    timeout: Duration,
}

impl CommandClient {
    /// Create a client feeding `tx`
    pub fn new(tx: mpsc::Sender<CommandRequest>, state: SharedState, timeout: Duration) -> Self {
        Self { tx, state, timeout }
    }

    fn ensure_ready(&self) -> Result<(), TncError> {
        if self.state.snapshot().command.is_usable() {
            Ok(())
        } else {
            Err(TncError::NotReady)
        }
    }

    /// Fire-and-forget: returns once the command has been written
    pub async fn send(&self, command: TncCommand) -> Result<(), TncError> {
        self.ensure_ready()?;
        let (written, rx) = oneshot::channel();
        self.tx
            .send(CommandRequest::Send { command, written })
            .await
            .map_err(|_| TncError::ChannelClosed)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TncError::ChannelClosed),
            Err(_) => Err(TncError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Request/response: returns the first line answering the command
    pub async fn request(&self, command: TncCommand) -> Result<TncResponse, TncError> {
        self.ensure_ready()?;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CommandRequest::Request { command, reply })
            .await
            .map_err(|_| TncError::ChannelClosed)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TncError::ChannelClosed),
            Err(_) => Err(TncError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Start sending the buffered data
    pub async fn transmit(&self) -> Result<(), TncError> {
        self.send(TncCommand::FecSend(true)).await
    }

    /// Discard the TNC's outbound buffer
    pub async fn purge_buffer(&self) -> Result<(), TncError> {
        self.send(TncCommand::PurgeBuffer).await
    }

    /// Abort the current transmission
    pub async fn abort(&self) -> Result<(), TncError> {
        self.send(TncCommand::Abort).await
    }

    /// Ask for a fresh STATE and BUFFER report
    pub async fn poll_status(&self) -> Result<(), TncError> {
        self.send(TncCommand::State).await?;
        self.send(TncCommand::Buffer).await
    }
}

struct Waiter {
    keyword: String,
    reply: oneshot::Sender<TncResponse>,
}

/// The loop owning the command socket for one session
pub struct CommandLoop<R, W, K> {
    reader: R,
    writer: W,
    keying: K,
    codec: LineCodec,
    state: SharedState,
    events: EventSender,
    waiters: Vec<Waiter>,
    status_poll: Option<Duration>,
    buffer: Vec<u8>,
}

impl<R, W, K> CommandLoop<R, W, K>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    K: KeyingLine,
{
    /// Create a loop over the two halves of the command socket
    pub fn new(reader: R, writer: W, keying: K, state: SharedState, events: EventSender) -> Self {
        Self {
            reader,
            writer,
            keying,
            codec: LineCodec::new(),
            state,
            events,
            waiters: Vec::new(),
            status_poll: None,
            buffer: vec![0u8; 1024],
        }
    }

    /// Poll STATE and BUFFER every `period`
    pub fn with_status_poll(mut self, period: Option<Duration>) -> Self {
        self.status_poll = period.filter(|p| !p.is_zero());
        self
    }

    async fn write(&mut self, command: &TncCommand) -> Result<(), TncError> {
        trace!("TNC <- {}", command);
        self.writer
            .write_all(&command.encode())
            .await
            .map_err(TncError::on(ChannelKind::Command))?;
        self.writer
            .flush()
            .await
            .map_err(TncError::on(ChannelKind::Command))
    }

    /// Write every command of a provisioning sequence
    pub async fn provision(&mut self, commands: &[TncCommand]) -> Result<(), TncError> {
        info!("Provisioning TNC ({} commands)", commands.len());
        for command in commands {
            self.write(command).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, request: CommandRequest) -> Result<(), TncError> {
        match request {
            CommandRequest::Send { command, written } => {
                if written.is_closed() {
                    debug!("Dropping stale command {}", command);
                    return Ok(());
                }
                self.write(&command).await?;
                let _ = written.send(());
            }
            CommandRequest::Request { command, reply } => {
                if reply.is_closed() {
                    debug!("Dropping stale request {}", command);
                    return Ok(());
                }
                // Register before writing so a fast reply cannot slip past
                self.waiters.push(Waiter {
                    keyword: command.keyword().to_ascii_uppercase(),
                    reply,
                });
                self.write(&command).await?;
            }
        }
        Ok(())
    }

    async fn apply_keying(&mut self, keyed: bool) {
        match tokio::time::timeout(KEYING_TIMEOUT, self.keying.set_keyed(keyed)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Keying side-channel failed: {}", e);
                self.events
                    .emit(TncEvent::warning("keying", format!("PTT {}: {}", keyed, e)));
            }
            Err(_) => {
                warn!("Keying side-channel timed out");
                self.events
                    .emit(TncEvent::warning("keying", format!("PTT {} timed out", keyed)));
            }
        }

        let changed = self.state.update(|state| {
            let changed = state.keyed != keyed;
            state.keyed = keyed;
            changed
        });
        if changed {
            info!("Transmitter {}", if keyed { "keyed" } else { "released" });
            self.events.emit(TncEvent::KeyingChanged { keyed });
        }
    }

    /// Handle one status line
    pub async fn handle_line(&mut self, line: &str) {
        trace!("TNC -> {}", line);

        // Keying first: drive the radio before anything else happens
        if let Some(keyed) = TncResponse::parse_keying(line) {
            self.apply_keying(keyed).await;
            self.answer_waiter(&TncResponse::Keying(keyed));
            self.events.emit(TncEvent::CommandLine {
                line: line.to_string(),
            });
            return;
        }

        match TncResponse::parse(line) {
            Ok(response) => {
                self.state.update(|state| apply_status(state, &response));
                if let TncResponse::Unknown(ref text) = response {
                    debug!("Unrecognized TNC line: {}", text);
                }
                self.answer_waiter(&response);
            }
            Err(e) => debug!("Discarding TNC line {:?}: {}", line, e),
        }

        self.events.emit(TncEvent::CommandLine {
            line: line.to_string(),
        });
    }

    fn answer_waiter(&mut self, response: &TncResponse) {
        self.waiters.retain(|w| !w.reply.is_closed());
        let keyword = response.keyword();
        if let Some(pos) = self.waiters.iter().position(|w| w.keyword == keyword) {
            let waiter = self.waiters.remove(pos);
            let _ = waiter.reply.send(response.clone());
        }
    }

    /// Release the transmitter if it is keyed
    pub async fn release(&mut self) {
        if self.state.snapshot().keyed {
            info!("Releasing transmitter");
            self.apply_keying(false).await;
        }
    }

    /// Run until the socket fails or `cancel` fires
    ///
    /// On cancel the transmitter is released before returning.
    pub async fn run(
        &mut self,
        requests: &mut mpsc::Receiver<CommandRequest>,
        cancel: &CancellationToken,
    ) -> Result<(), TncError> {
        let mut poll = interval(self.status_poll.unwrap_or(Duration::from_secs(3600)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let polling = self.status_poll.is_some();
        let mut queue_open = true;

        loop {
            while let Some(line) = self.codec.next_item() {
                self.handle_line(&line).await;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.release().await;
                    return Ok(());
                }

                read = self.reader.read(&mut self.buffer) => {
                    match read {
                        Ok(0) => return Err(TncError::Closed(ChannelKind::Command)),
                        Ok(n) => self.codec.push_bytes(&self.buffer[..n]),
                        Err(e) => return Err(TncError::on(ChannelKind::Command)(e)),
                    }
                }

                request = requests.recv(), if queue_open => {
                    match request {
                        Some(request) => self.dispatch(request).await?,
                        None => {
                            debug!("Command queue closed");
                            queue_open = false;
                        }
                    }
                }

                _ = poll.tick(), if polling => {
                    self.write(&TncCommand::State).await?;
                    self.write(&TncCommand::Buffer).await?;
                }
            }
        }
    }
}

/// Apply a parsed status line to the state; returns whether anything changed
pub fn apply_status(state: &mut TncState, response: &TncResponse) -> bool {
    fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    match response {
        TncResponse::Keying(keyed) => set(&mut state.keyed, *keyed),
        TncResponse::Buffer(n) => set(&mut state.buffer_occupancy, *n),
        TncResponse::State(status) => set(&mut state.session_status, status.clone()),
        TncResponse::MyCall(call) => set(&mut state.callsign, Some(call.clone())),
        TncResponse::GridSquare(grid) => set(&mut state.gridsquare, Some(grid.clone())),
        TncResponse::ProtocolMode(mode) => set(&mut state.protocol_mode, *mode),
        TncResponse::FecMode(mode) => set(&mut state.profile.mode, *mode),
        TncResponse::FecRepeats(n) => set(&mut state.profile.repeats, *n),
        TncResponse::FecSend | TncResponse::Unknown(_) => false,
    }
}
