//! Virtual rigctld
//!
//! Answers the small subset of the hamlib network protocol used for keying
//! and tuning, and records every PTT change.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// hamlib `RIG_ENAVAIL`
const NOT_AVAILABLE: i32 = -11;
/// hamlib `RIG_EINVAL`
const INVALID_PARAM: i32 = -1;

/// Simulated radio behind rigctld
#[derive(Debug, Clone)]
pub struct VirtualRig {
    frequency: u64,
    mode: String,
    passband: i32,
    ptt: bool,
    ptt_history: Vec<bool>,
}

impl Default for VirtualRig {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRig {
    pub fn new() -> Self {
        Self {
            frequency: 14_105_000,
            mode: "PKTUSB".to_string(),
            passband: 2400,
            ptt: false,
            ptt_history: Vec::new(),
        }
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn ptt(&self) -> bool {
        self.ptt
    }

    /// Every `T` command received, in order
    pub fn ptt_history(&self) -> &[bool] {
        &self.ptt_history
    }

    fn status(code: i32) -> Vec<String> {
        vec![format!("RPRT {}", code)]
    }

    /// Handle one command line and return the reply lines
    pub fn process_line(&mut self, line: &str) -> Vec<String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = parts.collect();

        match (command, args.as_slice()) {
            ("f", []) => vec![self.frequency.to_string()],
            ("F", [hz]) => match hz.parse::<f64>() {
                Ok(hz) if hz >= 0.0 => {
                    self.frequency = hz as u64;
                    Self::status(0)
                }
                _ => Self::status(INVALID_PARAM),
            },
            ("m", []) => vec![self.mode.clone(), self.passband.to_string()],
            ("M", [mode, passband]) => match passband.parse::<i32>() {
                Ok(passband) => {
                    self.mode = mode.to_string();
                    if passband > 0 {
                        self.passband = passband;
                    }
                    Self::status(0)
                }
                Err(_) => Self::status(INVALID_PARAM),
            },
            ("t", []) => vec![u8::from(self.ptt).to_string()],
            ("T", [on]) => match *on {
                "0" | "1" => {
                    self.ptt = *on == "1";
                    self.ptt_history.push(self.ptt);
                    debug!("Virtual rig PTT {}", self.ptt);
                    Self::status(0)
                }
                _ => Self::status(INVALID_PARAM),
            },
            _ => Self::status(NOT_AVAILABLE),
        }
    }
}

/// A [`VirtualRig`] served on a loopback port
pub struct VirtualRigServer {
    addr: SocketAddr,
    rig: Arc<Mutex<VirtualRig>>,
    task: JoinHandle<()>,
}

impl VirtualRigServer {
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let rig = Arc::new(Mutex::new(VirtualRig::new()));
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&rig)));
        info!("Virtual rigctld listening on {}", addr);
        Ok(Self { addr, rig, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Lock the model for inspection
    pub fn rig(&self) -> MutexGuard<'_, VirtualRig> {
        self.rig.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, rig: Arc<Mutex<VirtualRig>>) {
    while let Ok((stream, peer)) = listener.accept().await {
        debug!("Virtual rigctld client {}", peer);
        let rig = Arc::clone(&rig);
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, rig).await {
                debug!("Virtual rigctld client error: {}", e);
            }
        });
    }
}

async fn serve_client(stream: TcpStream, rig: Arc<Mutex<VirtualRig>>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let replies = rig
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .process_line(&line);
        let mut out = String::new();
        for reply in replies {
            out.push_str(&reply);
            out.push('\n');
        }
        writer.write_all(out.as_bytes()).await?;
    }
    Ok(())
}
