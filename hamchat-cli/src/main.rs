//! hamChat terminal host
//!
//! Keyboard-to-keyboard chat over an ARDOP TNC. Lines typed on stdin are
//! broadcast as chat messages; received payloads are routed through the
//! plugin router and chat messages printed.

mod host;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hamchat_plugins::{PluginRegistry, PluginRouter, APP_VERSION};
use hamchat_tnc::TncHandle;
use host::Host;
use settings::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hamchat")]
#[command(version = APP_VERSION)]
#[command(about = "Keyboard chat over an ARDOP TNC")]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// TNC host
    #[arg(long)]
    pub host: Option<String>,

    /// TNC command port; the data port is the next one up
    #[arg(long)]
    pub port: Option<u16>,

    /// Own callsign
    #[arg(long)]
    pub callsign: Option<String>,

    /// Maidenhead grid locator
    #[arg(long)]
    pub grid: Option<String>,

    /// rigctld endpoint for keying, e.g. localhost:4532
    #[arg(long, value_name = "HOST:PORT")]
    pub rig: Option<String>,

    /// Key by VOX even if the settings name a rigctld
    #[arg(long, conflicts_with = "rig")]
    pub no_rig: bool,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    pub save: bool,

    /// Print the loaded plugins as JSON and exit
    #[arg(long)]
    pub list_plugins: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hamchat=info,hamchat_protocol=info,hamchat_tnc=info,hamchat_plugins=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .or_else(Settings::default_path)
        .context("cannot determine settings location, pass --config")?;

    let mut settings = Settings::load(&path)?;
    settings.apply(&cli)?;
    settings.tnc.validate().context("invalid settings")?;
    if cli.save {
        settings.save(&path)?;
        tracing::info!("Saved settings to {}", path.display());
    }

    let registry = PluginRegistry::with_builtins(APP_VERSION);
    let router = PluginRouter::load(&registry, settings.tnc.station.callsign.clone());
    if cli.list_plugins {
        let definitions: Vec<_> = router.definitions().collect();
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    tracing::info!(
        "Starting hamChat {} as {} via {}:{}",
        APP_VERSION,
        settings.tnc.station.callsign,
        settings.tnc.host,
        settings.tnc.port
    );
    let (handle, payloads) = TncHandle::spawn(settings.tnc.clone())?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    Host::new(handle, router, settings)
        .run(stdin, payloads, ctrl_c)
        .await
}
