//! Outbound payload writer
//!
//! Payloads are cut into frames of at most `chunk_max` body bytes and
//! written to the data socket. The writer then polls BUFFER until the TNC
//! reports at least the written bytes on top of what was queued before, or
//! gives up after a timeout proportional to the payload size.

use std::time::Duration;

use hamchat_protocol::{chunk_payload, ModeTag, TncCommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::CommandClient;
use crate::config::TncConfig;
use crate::error::TncError;
use crate::events::{EventSender, TncEvent};
use crate::state::{ChannelKind, SharedState};

/// Result of loading a payload into the TNC buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOutcome {
    /// The TNC accounted for every byte
    Confirmed,
    /// Written, but the TNC never confirmed it in time
    TimedOut,
    /// Nothing was written: link not ready or empty payload
    Rejected,
}

/// Pacing parameters taken from [`TncConfig`]
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub chunk_max: usize,
    pub confirm_base: Duration,
    pub confirm_per_byte: Duration,
    pub poll_interval: Duration,
}

impl From<&TncConfig> for WriterConfig {
    fn from(config: &TncConfig) -> Self {
        Self {
            chunk_max: config.chunk_max,
            confirm_base: Duration::from_millis(config.confirm_base_ms),
            confirm_per_byte: Duration::from_millis(config.confirm_per_byte_ms),
            poll_interval: Duration::from_millis(config.confirm_poll_ms.max(1)),
        }
    }
}

impl WriterConfig {
    fn confirm_timeout(&self, len: usize) -> Duration {
        self.confirm_base + self.confirm_per_byte.saturating_mul(len as u32)
    }
}

/// Writes payloads to the data socket and confirms them via BUFFER
pub struct BufferWriter<W> {
    writer: W,
    commands: CommandClient,
    state: SharedState,
    events: EventSender,
    config: WriterConfig,
}

impl<W> BufferWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        writer: W,
        commands: CommandClient,
        state: SharedState,
        events: EventSender,
        config: WriterConfig,
    ) -> Self {
        Self {
            writer,
            commands,
            state,
            events,
            config,
        }
    }

    /// Load one payload into the TNC buffer
    ///
    /// Socket errors are returned; the session treats them as link loss.
    pub async fn write(
        &mut self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, TncError> {
        if payload.is_empty() {
            debug!("Rejecting empty payload");
            return Ok(WriteOutcome::Rejected);
        }
        if !self.state.snapshot().is_ready() {
            debug!("Rejecting payload, link not ready");
            return Ok(WriteOutcome::Rejected);
        }

        let frames = chunk_payload(payload, ModeTag::Fec, self.config.chunk_max)?;
        let baseline = self.state.snapshot().buffer_occupancy;

        for frame in &frames {
            self.writer
                .write_all(&frame.encode()?)
                .await
                .map_err(TncError::on(ChannelKind::Data))?;
        }
        self.writer
            .flush()
            .await
            .map_err(TncError::on(ChannelKind::Data))?;

        info!(
            "Loaded {} bytes in {} frames into TNC buffer",
            payload.len(),
            frames.len()
        );
        self.events.emit(TncEvent::PayloadLoaded {
            len: payload.len(),
            frames: frames.len(),
        });

        let target = baseline.saturating_add(payload.len() as u32);
        self.confirm(target, payload.len(), cancel).await
    }

    async fn confirm(
        &mut self,
        target: u32,
        len: usize,
        cancel: &CancellationToken,
    ) -> Result<WriteOutcome, TncError> {
        let timeout = self.config.confirm_timeout(len);
        let deadline = Instant::now() + timeout;
        let mut updates = self.state.subscribe();

        loop {
            if updates.borrow_and_update().buffer_occupancy >= target {
                debug!("TNC buffer confirmed at {} bytes", target);
                return Ok(WriteOutcome::Confirmed);
            }
            if Instant::now() >= deadline {
                break;
            }

            if let Err(e) = self.commands.send(TncCommand::Buffer).await {
                debug!("BUFFER poll failed: {}", e);
            }

            let wake = (Instant::now() + self.config.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(TncError::Cancelled),
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Err(TncError::ChannelClosed);
                    }
                }
                _ = tokio::time::sleep_until(wake) => {}
            }
        }

        warn!(
            "TNC did not confirm {} buffered bytes within {:?}",
            target, timeout
        );
        self.events.emit(TncEvent::warning(
            "writer",
            format!("buffer confirmation lost for {} byte payload", len),
        ));
        Ok(WriteOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use hamchat_protocol::{FrameCodec, StreamCodec};
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::command::{CommandRequest, COMMAND_QUEUE};
    use crate::state::ConnectionStatus;

    fn ready_state() -> SharedState {
        let state = SharedState::new();
        for channel in [ChannelKind::Command, ChannelKind::Data] {
            state.transition(channel, ConnectionStatus::Connecting).unwrap();
            state.transition(channel, ConnectionStatus::Ready).unwrap();
        }
        state
    }

    fn fast_config(chunk_max: usize) -> WriterConfig {
        WriterConfig {
            chunk_max,
            confirm_base: Duration::from_millis(200),
            confirm_per_byte: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_confirm_timeout_scales() {
        let config = WriterConfig::from(&TncConfig::default());
        assert_eq!(config.confirm_timeout(0), Duration::from_millis(2000));
        assert_eq!(config.confirm_timeout(1000), Duration::from_millis(4000));
    }

    /// Fake command loop answering BUFFER polls by bumping occupancy
    fn spawn_fake_tnc(
        state: SharedState,
        mut rx: mpsc::Receiver<CommandRequest>,
        report: Option<u32>,
    ) {
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let CommandRequest::Send { written, .. } = request {
                    let _ = written.send(());
                    if let Some(n) = report {
                        state.update(|s| {
                            s.buffer_occupancy = n;
                            true
                        });
                    }
                }
            }
        });
    }

    fn make_writer(
        chunk_max: usize,
        report: Option<u32>,
        state: SharedState,
    ) -> (BufferWriter<DuplexStream>, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let client = CommandClient::new(tx, state.clone(), Duration::from_secs(1));
        spawn_fake_tnc(state.clone(), rx, report);
        (
            BufferWriter::new(ours, client, state, EventSender::new(), fast_config(chunk_max)),
            theirs,
        )
    }

    #[tokio::test]
    async fn test_chunks_and_confirms() {
        let state = ready_state();
        let (mut writer, mut tnc) = make_writer(1000, Some(2500), state);

        let payload = vec![b'x'; 2500];
        let outcome = writer
            .write(&payload, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Confirmed);
        drop(writer);

        let mut wire = Vec::new();
        tnc.read_to_end(&mut wire).await.unwrap();
        let mut codec = FrameCodec::new();
        codec.push_bytes(&wire);
        let mut sizes = Vec::new();
        while let Some(frame) = codec.next_item() {
            let frame = frame.unwrap();
            assert_eq!(frame.tag, Some(ModeTag::Fec));
            sizes.push(frame.body.len());
        }
        assert_eq!(sizes, [1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_times_out_without_confirmation() {
        let state = ready_state();
        let (mut writer, _tnc) = make_writer(1000, None, state);

        let outcome = writer
            .write(b"hello:END:", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_confirmation_counts_from_baseline() {
        let state = ready_state();
        state.update(|s| {
            s.buffer_occupancy = 100;
            true
        });
        // TNC reports 105: only 5 of our 10 bytes accounted for
        let (mut writer, _tnc) = make_writer(1000, Some(105), state);
        let outcome = writer
            .write(b"0123456789", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_rejects_empty_or_not_ready() {
        let (mut writer, _tnc) = make_writer(1000, Some(0), ready_state());
        assert_eq!(
            writer.write(b"", &CancellationToken::new()).await.unwrap(),
            WriteOutcome::Rejected
        );

        let (mut writer, _tnc) = make_writer(1000, Some(10), SharedState::new());
        assert_eq!(
            writer.write(b"hi", &CancellationToken::new()).await.unwrap(),
            WriteOutcome::Rejected
        );
    }
}
