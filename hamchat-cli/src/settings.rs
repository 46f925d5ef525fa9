//! Application settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hamchat_tnc::{RigConfig, TncConfig};
use serde::{Deserialize, Serialize};

use crate::Cli;

/// Settings persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    /// Transport engine settings
    pub tnc: TncConfig,
    /// Echo every command-channel line to the terminal
    pub show_command_traffic: bool,
}

impl Settings {
    /// `$XDG_CONFIG_HOME/hamchat`, falling back to `~/.config/hamchat`
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("hamchat"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("hamchat"))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings; a missing file yields defaults, a corrupt one is an error
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing settings")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Overlay command-line flags
    pub fn apply(&mut self, cli: &Cli) -> Result<()> {
        if let Some(host) = &cli.host {
            self.tnc.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.tnc.port = port;
        }
        if let Some(callsign) = &cli.callsign {
            self.tnc.station.callsign = callsign.to_uppercase();
        }
        if let Some(grid) = &cli.grid {
            self.tnc.station.gridsquare = grid.clone();
        }
        if let Some(rig) = &cli.rig {
            self.tnc.rig = Some(parse_rig(rig)?);
        }
        if cli.no_rig {
            self.tnc.rig = None;
        }
        Ok(())
    }
}

/// `host:port`, `host` or `:port`
fn parse_rig(value: &str) -> Result<RigConfig> {
    let mut rig = RigConfig::default();
    match value.rsplit_once(':') {
        Some((host, port)) => {
            if !host.is_empty() {
                rig.host = host.to_string();
            }
            rig.port = port
                .parse()
                .with_context(|| format!("invalid rigctld port in {:?}", value))?;
        }
        None => rig.host = value.to_string(),
    }
    Ok(rig)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hamchat-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load(&temp_path("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip.json");
        let mut settings = Settings::default();
        settings.tnc.station.callsign = "W1AW".into();
        settings.tnc.port = 8600;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.tnc.data_port(), 8601);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("partial.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"tnc":{"host":"10.0.0.2"}}"#).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.tnc.host, "10.0.0.2");
        assert_eq!(loaded.tnc.port, hamchat_tnc::DEFAULT_COMMAND_PORT);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let path = temp_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "hamchat",
            "--host",
            "192.168.1.5",
            "--callsign",
            "k1ttt",
            "--rig",
            ":4533",
        ]);
        let mut settings = Settings::default();
        settings.apply(&cli).unwrap();

        assert_eq!(settings.tnc.host, "192.168.1.5");
        assert_eq!(settings.tnc.station.callsign, "K1TTT");
        let rig = settings.tnc.rig.unwrap();
        assert_eq!(rig.port, 4533);
        assert_eq!(rig.host, RigConfig::default().host);
    }

    #[test]
    fn test_bad_rig_port() {
        assert!(parse_rig("localhost:radio").is_err());
        assert_eq!(parse_rig("shack").unwrap().host, "shack");
    }
}
