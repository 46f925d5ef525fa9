//! rigctld client
//!
//! Talks the hamlib network protocol over any async byte stream. Used as the
//! keying side-channel and for frequency/mode control.

use std::time::Duration;

use hamchat_protocol::rigctl::{parse_frequency, RigCommand, RigReply};
use hamchat_protocol::{EncodeCommand, ProtocolError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::RigConfig;
use crate::error::TncError;
use crate::state::ChannelKind;

/// Connection to a rigctld instance
pub struct RigControl<T> {
    io: BufReader<T>,
    timeout: Duration,
    line: String,
}

impl RigControl<TcpStream> {
    /// Connect to the configured rigctld
    pub async fn connect(config: &RigConfig) -> Result<Self, TncError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let stream = tokio::time::timeout(
            timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TncError::Timeout(config.timeout_ms))?
        .map_err(TncError::on(ChannelKind::RigControl))?;
        stream.set_nodelay(true).ok();
        Ok(Self::new(stream, timeout))
    }
}

impl<T> RigControl<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an existing stream
    pub fn new(io: T, timeout: Duration) -> Self {
        Self {
            io: BufReader::new(io),
            timeout,
            line: String::new(),
        }
    }

    async fn read_reply(&mut self) -> Result<RigReply, TncError> {
        self.line.clear();
        let n = tokio::time::timeout(self.timeout, self.io.read_line(&mut self.line))
            .await
            .map_err(|_| TncError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(TncError::on(ChannelKind::RigControl))?;
        if n == 0 {
            return Err(TncError::Closed(ChannelKind::RigControl));
        }
        Ok(RigReply::parse(&self.line))
    }

    /// Send one command and collect its value lines
    pub async fn execute(&mut self, command: RigCommand) -> Result<Vec<String>, TncError> {
        debug!("rigctld <- {:?}", command);
        let io = self.io.get_mut();
        io.write_all(&command.encode())
            .await
            .map_err(TncError::on(ChannelKind::RigControl))?;
        io.flush()
            .await
            .map_err(TncError::on(ChannelKind::RigControl))?;

        let expected = command.value_lines();
        if expected == 0 {
            self.read_reply().await?.into_result()?;
            return Ok(Vec::new());
        }

        let mut values = Vec::with_capacity(expected);
        while values.len() < expected {
            if let Some(value) = self.read_reply().await?.into_result()? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Current VFO frequency in Hz
    pub async fn frequency(&mut self) -> Result<u64, TncError> {
        let values = self.execute(RigCommand::GetFrequency).await?;
        let first = values.first().map(String::as_str).unwrap_or_default();
        Ok(parse_frequency(first)?)
    }

    /// Tune the VFO
    pub async fn set_frequency(&mut self, hz: u64) -> Result<(), TncError> {
        self.execute(RigCommand::SetFrequency(hz)).await.map(|_| ())
    }

    /// Current mode and passband
    pub async fn mode(&mut self) -> Result<(String, i32), TncError> {
        let values = self.execute(RigCommand::GetMode).await?;
        match values.as_slice() {
            [mode, passband] => {
                let passband = passband.trim().parse().map_err(|_| {
                    ProtocolError::InvalidResponse(format!("passband {:?}", passband))
                })?;
                Ok((mode.clone(), passband))
            }
            _ => Err(ProtocolError::InvalidResponse(format!("mode reply {:?}", values)).into()),
        }
    }

    /// Change mode; a passband of 0 keeps the rig default
    pub async fn set_mode(&mut self, mode: &str, passband: i32) -> Result<(), TncError> {
        self.execute(RigCommand::SetMode {
            mode: mode.to_string(),
            passband,
        })
        .await
        .map(|_| ())
    }

    /// Key or release the transmitter
    pub async fn set_ptt(&mut self, on: bool) -> Result<(), TncError> {
        self.execute(RigCommand::SetPtt(on)).await.map(|_| ())
    }

    /// Current PTT state
    pub async fn ptt(&mut self) -> Result<bool, TncError> {
        let values = self.execute(RigCommand::GetPtt).await?;
        Ok(values.first().is_some_and(|v| v.trim() != "0"))
    }

    /// Check that rigctld answers
    pub async fn test(&mut self) -> Result<(), TncError> {
        self.frequency().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;

    fn rig() -> (RigControl<DuplexStream>, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(256);
        (RigControl::new(ours, Duration::from_millis(500)), theirs)
    }

    #[tokio::test]
    async fn test_set_ptt() {
        let (mut rig, mut daemon) = rig();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let n = daemon.read(&mut buf).await.unwrap();
            daemon.write_all(b"RPRT 0\n").await.unwrap();
            buf[..n].to_vec()
        });

        rig.set_ptt(true).await.unwrap();
        assert_eq!(task.await.unwrap(), b"T 1\n");
    }

    #[tokio::test]
    async fn test_get_frequency_and_mode() {
        let (mut rig, mut daemon) = rig();
        daemon
            .write_all(b"14074000\nPKTUSB\n3000\n")
            .await
            .unwrap();

        assert_eq!(rig.frequency().await.unwrap(), 14_074_000);
        assert_eq!(rig.mode().await.unwrap(), ("PKTUSB".to_string(), 3000));
    }

    #[tokio::test]
    async fn test_error_code() {
        let (mut rig, mut daemon) = rig();
        daemon.write_all(b"RPRT -9\n").await.unwrap();
        assert!(matches!(
            rig.set_frequency(7_074_000).await,
            Err(TncError::Protocol(ProtocolError::RigError(-9)))
        ));
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let (mut rig, _daemon) = rig();
        assert!(matches!(rig.ptt().await, Err(TncError::Timeout(500))));
    }
}
