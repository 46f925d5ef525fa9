//! Virtual TNC served over loopback TCP
//!
//! Binds a command and a data listener on `127.0.0.1` with ephemeral ports
//! and serves one client connection pair at a time. Tests drive it through
//! [`VirtualTncServer`]: inject status lines or data frames, drop the link,
//! and inspect what the TNC received.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use hamchat_protocol::line::LineCodec;
use hamchat_protocol::{DataFrame, FrameCodec, StreamCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::VirtualTnc;

/// Commands for the server task
#[derive(Debug)]
enum ServerCommand {
    SendLine(String),
    SendData(Vec<u8>),
    DropConnections,
}

/// Handle to a running virtual TNC
pub struct VirtualTncServer {
    command_addr: SocketAddr,
    data_addr: SocketAddr,
    tnc: Arc<Mutex<VirtualTnc>>,
    control: mpsc::Sender<ServerCommand>,
    task: JoinHandle<()>,
}

impl VirtualTncServer {
    /// Bind both listeners and start serving
    pub async fn start() -> io::Result<Self> {
        Self::with_tnc(VirtualTnc::new()).await
    }

    /// Serve a preconfigured model
    pub async fn with_tnc(tnc: VirtualTnc) -> io::Result<Self> {
        let command_listener = TcpListener::bind("127.0.0.1:0").await?;
        let data_listener = TcpListener::bind("127.0.0.1:0").await?;
        let command_addr = command_listener.local_addr()?;
        let data_addr = data_listener.local_addr()?;

        let tnc = Arc::new(Mutex::new(tnc));
        let (control, control_rx) = mpsc::channel(64);
        let task = tokio::spawn(serve(
            command_listener,
            data_listener,
            Arc::clone(&tnc),
            control_rx,
        ));

        info!(
            "Virtual TNC listening on {} (data {})",
            command_addr, data_addr
        );
        Ok(Self {
            command_addr,
            data_addr,
            tnc,
            control,
            task,
        })
    }

    pub fn command_port(&self) -> u16 {
        self.command_addr.port()
    }

    pub fn data_port(&self) -> u16 {
        self.data_addr.port()
    }

    /// Lock the model for inspection
    pub fn tnc(&self) -> MutexGuard<'_, VirtualTnc> {
        self.tnc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send an unsolicited status line
    pub async fn send_line(&self, line: &str) {
        let _ = self
            .control
            .send(ServerCommand::SendLine(line.to_string()))
            .await;
    }

    /// Send one encoded frame on the data socket
    pub async fn send_frame(&self, frame: &DataFrame) {
        if let Ok(bytes) = frame.encode() {
            self.send_data(bytes).await;
        }
    }

    /// Send raw bytes on the data socket
    pub async fn send_data(&self, bytes: Vec<u8>) {
        let _ = self.control.send(ServerCommand::SendData(bytes)).await;
    }

    /// Close both client connections; the server keeps listening
    pub async fn drop_connections(&self) {
        let _ = self.control.send(ServerCommand::DropConnections).await;
    }

    /// Stop serving
    pub fn shutdown(self) {
        self.task.abort();
    }
}

fn lock(tnc: &Mutex<VirtualTnc>) -> MutexGuard<'_, VirtualTnc> {
    tnc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn serve(
    command_listener: TcpListener,
    data_listener: TcpListener,
    tnc: Arc<Mutex<VirtualTnc>>,
    mut control: mpsc::Receiver<ServerCommand>,
) {
    loop {
        let accepted = async {
            let (command, _) = command_listener.accept().await?;
            let (data, _) = data_listener.accept().await?;
            Ok::<_, io::Error>((command, data))
        };

        let (command, data) = tokio::select! {
            accepted = accepted => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Virtual TNC accept failed: {}", e);
                    continue;
                }
            },
            cmd = control.recv() => match cmd {
                // Nothing connected yet; injected traffic is dropped
                Some(_) => continue,
                None => return,
            },
        };

        debug!("Virtual TNC client connected");
        match serve_connection(command, data, &tnc, &mut control).await {
            Ok(true) => debug!("Virtual TNC client disconnected"),
            Ok(false) => return,
            Err(e) => debug!("Virtual TNC connection error: {}", e),
        }
    }
}

/// Returns Ok(false) when the server should stop
async fn serve_connection(
    mut command: TcpStream,
    mut data: TcpStream,
    tnc: &Mutex<VirtualTnc>,
    control: &mut mpsc::Receiver<ServerCommand>,
) -> io::Result<bool> {
    let mut lines = LineCodec::new();
    let mut frames = FrameCodec::new();
    let mut command_buf = [0u8; 1024];
    let mut data_buf = [0u8; 4096];

    loop {
        tokio::select! {
            read = command.read(&mut command_buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(true);
                }
                lines.push_bytes(&command_buf[..n]);
                let mut out = Vec::new();
                {
                    let mut tnc = lock(tnc);
                    while let Some(line) = lines.next_item() {
                        tnc.process_line(&line);
                    }
                    while let Some(reply) = tnc.take_output() {
                        out.extend_from_slice(reply.as_bytes());
                        out.push(b'\r');
                    }
                }
                command.write_all(&out).await?;
            }

            read = data.read(&mut data_buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(true);
                }
                frames.push_bytes(&data_buf[..n]);
                let mut tnc = lock(tnc);
                while let Some(frame) = frames.next_item() {
                    match frame {
                        Ok(frame) => tnc.load_frame(frame),
                        Err(e) => warn!("Virtual TNC got a bad frame: {}", e),
                    }
                }
            }

            cmd = control.recv() => match cmd {
                Some(ServerCommand::SendLine(line)) => {
                    command.write_all(format!("{}\r", line).as_bytes()).await?;
                }
                Some(ServerCommand::SendData(bytes)) => {
                    data.write_all(&bytes).await?;
                }
                Some(ServerCommand::DropConnections) => return Ok(true),
                None => return Ok(false),
            },
        }
    }
}
