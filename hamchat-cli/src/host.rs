//! Terminal host
//!
//! Glue between the transport engine, the plugin router and the terminal:
//! received payloads go to the router, engine events become plugin events,
//! typed lines become chat payloads and router notifications are printed or
//! transmitted.

use std::future::Future;

use anyhow::Result;
use hamchat_plugins::{ChatPlugin, Notification, PluginEvent, PluginRouter};
use hamchat_protocol::Recipients;
use hamchat_tnc::{AssembledPayload, TncEvent, TncHandle, WriteOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::settings::Settings;

/// One line typed by the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Chat { recipients: Recipients, text: String },
    SetCallsign(String),
    SetGrid(String),
    Clear,
    Abort,
    Status,
    Quit,
    Empty,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Chat {
                recipients: Recipients::Broadcast,
                text: line.to_string(),
            };
        };

        let (word, rest) = command
            .split_once(' ')
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((command, ""));
        match (word.to_ascii_lowercase().as_str(), rest) {
            ("clear", "") => Self::Clear,
            ("abort", "") => Self::Abort,
            ("status", "") => Self::Status,
            ("quit", "") | ("exit", "") => Self::Quit,
            ("call", call) if !call.is_empty() => Self::SetCallsign(call.to_uppercase()),
            ("grid", grid) if !grid.is_empty() => Self::SetGrid(grid.to_string()),
            ("to", rest) => match rest.split_once(' ') {
                Some((stations, text)) if !text.trim().is_empty() => Self::Chat {
                    recipients: Recipients::Stations(
                        stations.split(',').map(|s| s.trim().to_uppercase()).collect(),
                    ),
                    text: text.trim().to_string(),
                },
                _ => Self::Unknown(line.to_string()),
            },
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Engine events that plugins subscribe to
pub fn plugin_event(event: &TncEvent) -> Option<PluginEvent> {
    match event {
        TncEvent::KeyingChanged { keyed } => Some(PluginEvent::KeyingChanged { keyed: *keyed }),
        TncEvent::CommandLine { line } => Some(PluginEvent::CommandLine(line.clone())),
        TncEvent::PayloadLoaded { len, .. } => Some(PluginEvent::PayloadLoaded { len: *len }),
        _ => None,
    }
}

pub struct Host {
    handle: TncHandle,
    router: PluginRouter,
    settings: Settings,
}

impl Host {
    pub fn new(handle: TncHandle, router: PluginRouter, settings: Settings) -> Self {
        Self {
            handle,
            router,
            settings,
        }
    }

    /// Run until `shutdown` resolves, input asks to quit or the engine stops
    pub async fn run<I>(
        mut self,
        input: I,
        mut payloads: mpsc::Receiver<AssembledPayload>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut events = self.handle.subscribe_events();
        let mut lines = input.lines();
        let mut input_open = true;
        tokio::pin!(shutdown);

        self.flush_notifications().await;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupted");
                    break;
                }
                Some(payload) = payloads.recv() => {
                    let complete = payload.is_complete();
                    self.router.dispatch_payload(payload.bytes, complete);
                }
                event = events.recv() => match event {
                    Ok(event) => self.on_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!("Missed {} engine events", n),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if !self.on_input(Input::parse(&line)).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Input closed");
                        input_open = false;
                    }
                    Err(e) => {
                        warn!("Reading input failed: {}", e);
                        input_open = false;
                    }
                },
            }
            self.flush_notifications().await;
        }

        self.router.broadcast(&PluginEvent::Shutdown);
        self.flush_notifications().await;
        self.handle.shutdown().await?;
        Ok(())
    }

    fn on_event(&mut self, event: &TncEvent) {
        match event {
            TncEvent::ConnectionChanged { channel, status } => {
                println!("* {} channel {:?}", channel, status);
            }
            TncEvent::Reconnecting { attempt } => println!("* reconnecting (attempt {})", attempt),
            TncEvent::Warning { source, message } => println!("! [{}] {}", source, message),
            TncEvent::CommandLine { line } if self.settings.show_command_traffic => {
                println!("  < {}", line);
            }
            _ => {}
        }
        if let Some(plugin_event) = plugin_event(event) {
            self.router.broadcast(&plugin_event);
        }
    }

    /// Returns false when the operator quits
    async fn on_input(&mut self, input: Input) -> bool {
        let result = match input {
            Input::Chat { recipients, text } => {
                let payload =
                    ChatPlugin::encode(&self.settings.tnc.station.callsign, recipients, &text);
                self.send_payload(payload).await
            }
            Input::SetCallsign(call) => {
                let mut next = self.settings.tnc.clone();
                next.station.callsign = call;
                self.update_settings(next).await
            }
            Input::SetGrid(grid) => {
                let mut next = self.settings.tnc.clone();
                next.station.gridsquare = grid;
                self.update_settings(next).await
            }
            Input::Clear => {
                let result = self.handle.clear_buffer().await;
                if result.is_ok() {
                    self.router.broadcast(&PluginEvent::BufferCleared);
                }
                result.map_err(Into::into)
            }
            Input::Abort => self.handle.abort().await.map_err(Into::into),
            Input::Status => {
                self.print_status();
                Ok(())
            }
            Input::Quit => return false,
            Input::Empty => Ok(()),
            Input::Unknown(line) => {
                println!("? {}  (try /to CALL text, /call, /grid, /clear, /abort, /status, /quit)", line);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("! {}", e);
        }
        true
    }

    async fn update_settings(&mut self, next: hamchat_tnc::TncConfig) -> Result<()> {
        self.handle.update_settings(next.clone()).await?;
        self.router.broadcast(&PluginEvent::SettingsChanged {
            callsign: next.station.callsign.clone(),
            gridsquare: next.station.gridsquare.clone(),
        });
        self.settings.tnc = next;
        Ok(())
    }

    /// Load into the TNC buffer and transmit
    async fn send_payload(&mut self, payload: Vec<u8>) -> Result<()> {
        match self.handle.write_payload(payload).await? {
            WriteOutcome::Rejected => {
                println!("! not connected, message not sent");
                return Ok(());
            }
            WriteOutcome::TimedOut => println!("! TNC did not confirm the buffer, sending anyway"),
            WriteOutcome::Confirmed => {}
        }
        self.handle.transmit().await?;
        self.router.broadcast(&PluginEvent::TransmitRequested);
        Ok(())
    }

    async fn flush_notifications(&mut self) {
        for notification in self.router.drain_notifications() {
            match notification {
                Notification::Chat {
                    sender,
                    recipients,
                    text,
                } => println!("<{} to {}> {}", sender, recipients, text),
                Notification::Warning { source, message } => println!("! [{}] {}", source, message),
                Notification::Outbound { plugin, payload } => {
                    debug!("{} queued {} bytes", plugin, payload.len());
                    if let Err(e) = self.send_payload(payload).await {
                        println!("! {}: {}", plugin, e);
                    }
                }
            }
        }
    }

    fn print_status(&self) {
        let state = self.handle.state();
        let estimate = state
            .estimated_send_minutes()
            .map(|m| format!(", ~{:.1} min to send", m))
            .unwrap_or_default();
        println!(
            "* {} {} | {} | buffer {} bytes{} | {}",
            state.callsign.as_deref().unwrap_or("-"),
            state.gridsquare.as_deref().unwrap_or("-"),
            state.session_status,
            state.buffer_occupancy,
            estimate,
            if state.keyed { "TX" } else { "RX" },
        );
    }
}
