//! Engine configuration

use std::time::Duration;

use hamchat_protocol::frame::{DEFAULT_CHUNK_MAX, MAX_FRAME_LEN, TAG_LEN};
use hamchat_protocol::header::{SENDER_MAX_LEN, SENDER_MIN_LEN};
use hamchat_protocol::rigctl::DEFAULT_RIGCTLD_PORT;
use hamchat_protocol::{ModulationProfile, ProtocolMode, TncCommand};
use serde::{Deserialize, Serialize};

use crate::error::TncError;

/// Default TNC command port; the data port is the next one up
pub const DEFAULT_COMMAND_PORT: u16 = 8515;

/// rigctld endpoint used for keying and tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RigConfig {
    /// rigctld host
    #[serde(default = "default_host")]
    pub host: String,
    /// rigctld port
    #[serde(default = "default_rig_port")]
    pub port: u16,
    /// Per-command reply timeout
    #[serde(default = "default_rig_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_rig_port() -> u16 {
    DEFAULT_RIGCTLD_PORT
}

fn default_rig_timeout_ms() -> u64 {
    1000
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_rig_port(),
            timeout_ms: default_rig_timeout_ms(),
        }
    }
}

/// Station identity and modulation replayed on every connect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationConfig {
    /// Own callsign
    pub callsign: String,
    /// Maidenhead grid locator
    pub gridsquare: String,
    /// FEC, ARQ or receive-only
    #[serde(default)]
    pub protocol_mode: ProtocolMode,
    /// FEC mode and repeat count
    #[serde(default)]
    pub profile: ModulationProfile,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            callsign: "N0CALL".to_string(),
            gridsquare: "AA00AA".to_string(),
            protocol_mode: ProtocolMode::Fec,
            profile: ModulationProfile::default(),
        }
    }
}

impl StationConfig {
    /// Commands bringing a freshly connected TNC to this configuration
    pub fn provisioning(&self) -> Vec<TncCommand> {
        hamchat_protocol::provisioning_sequence(
            &self.callsign,
            &self.gridsquare,
            self.protocol_mode,
            self.profile,
        )
    }

    /// Commands moving a connected TNC from `self` to `next`
    pub fn changes_to(&self, next: &StationConfig) -> Vec<TncCommand> {
        let mut commands = Vec::new();
        if self.callsign != next.callsign {
            commands.push(TncCommand::MyCall(next.callsign.clone()));
        }
        if self.gridsquare != next.gridsquare {
            commands.push(TncCommand::GridSquare(next.gridsquare.clone()));
        }
        if self.protocol_mode != next.protocol_mode {
            commands.push(TncCommand::ProtocolMode(next.protocol_mode));
        }
        if self.profile.mode != next.profile.mode {
            commands.push(TncCommand::FecMode(next.profile.mode));
        }
        if self.profile.repeats != next.profile.repeats {
            commands.push(TncCommand::FecRepeats(next.profile.repeats));
        }
        commands
    }
}

/// Transport engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TncConfig {
    /// TNC host
    pub host: String,
    /// TNC command port
    pub port: u16,
    /// TNC data port; `None` means `port + 1`
    pub data_port: Option<u16>,
    /// rigctld endpoint; `None` keys by VOX
    pub rig: Option<RigConfig>,
    /// Pause between connection attempts
    pub backoff_ms: u64,
    /// Give up after this many failed attempts; `None` retries forever
    pub max_connect_attempts: Option<u32>,
    /// Inactivity timeout while a payload is being reassembled
    pub reassembly_timeout_ms: u64,
    /// Largest outbound frame body
    pub chunk_max: usize,
    /// Fixed part of the buffer confirmation timeout
    pub confirm_base_ms: u64,
    /// Per-byte part of the buffer confirmation timeout
    pub confirm_per_byte_ms: u64,
    /// Interval between BUFFER polls while confirming
    pub confirm_poll_ms: u64,
    /// Periodic STATE/BUFFER poll; `None` disables it
    pub status_poll_ms: Option<u64>,
    /// Reply timeout for request/response commands
    pub command_timeout_ms: u64,
    /// Station provisioning
    pub station: StationConfig,
}

impl Default for TncConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_COMMAND_PORT,
            data_port: None,
            rig: None,
            backoff_ms: 250,
            max_connect_attempts: None,
            reassembly_timeout_ms: 7000,
            chunk_max: DEFAULT_CHUNK_MAX,
            confirm_base_ms: 2000,
            confirm_per_byte_ms: 2,
            confirm_poll_ms: 100,
            status_poll_ms: Some(2000),
            command_timeout_ms: 2000,
            station: StationConfig::default(),
        }
    }
}

impl TncConfig {
    /// Data channel port
    pub fn data_port(&self) -> u16 {
        self.data_port.unwrap_or(self.port.wrapping_add(1))
    }

    /// Command channel address
    pub fn command_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    /// Data channel address
    pub fn data_addr(&self) -> (String, u16) {
        (self.host.clone(), self.data_port())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Whether moving to `next` needs a fresh connection
    pub fn needs_reconnect(&self, next: &TncConfig) -> bool {
        self.host != next.host
            || self.port != next.port
            || self.data_port() != next.data_port()
            || self.rig != next.rig
    }

    /// Reject configurations that can never connect
    pub fn validate(&self) -> Result<(), TncError> {
        check_host(&self.host)?;
        if self.port == 0 {
            return Err(TncError::InvalidConfig("command port is 0".into()));
        }
        if self.data_port.is_none() && self.port == u16::MAX {
            return Err(TncError::InvalidConfig(
                "command port leaves no room for the data port".into(),
            ));
        }
        if self.data_port() == 0 || self.data_port() == self.port {
            return Err(TncError::InvalidConfig(format!(
                "data port {} unusable",
                self.data_port()
            )));
        }
        if let Some(rig) = &self.rig {
            check_host(&rig.host)?;
            if rig.port == 0 {
                return Err(TncError::InvalidConfig("rig port is 0".into()));
            }
        }
        if self.chunk_max == 0 || self.chunk_max + TAG_LEN > MAX_FRAME_LEN {
            return Err(TncError::InvalidConfig(format!(
                "chunk size {} outside 1..={}",
                self.chunk_max,
                MAX_FRAME_LEN - TAG_LEN
            )));
        }
        let call_len = self.station.callsign.trim().len();
        if !(SENDER_MIN_LEN..=SENDER_MAX_LEN).contains(&call_len) {
            return Err(TncError::InvalidConfig(format!(
                "callsign {:?} must be {}-{} characters",
                self.station.callsign, SENDER_MIN_LEN, SENDER_MAX_LEN
            )));
        }
        Ok(())
    }
}

fn check_host(host: &str) -> Result<(), TncError> {
    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(TncError::InvalidConfig(format!("unusable host {:?}", host)));
    }
    Ok(())
}
