//! pigateway - portal status gateway for serial display controllers
//!
//! Subcommands:
//! - `pigateway` / `pigateway run` - Poll the feeds and drive attached devices
//! - `pigateway show-config` - Print the effective configuration as TOML
//! - `pigateway list-devices` - Print the device paths discovery would try

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gateconf::{GatewayConfig, Overrides};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pigateway::{discovery, serve, shutdown, telemetry};

#[derive(Parser)]
#[command(name = "pigateway")]
#[command(about = "Drive portal display controllers from a live status feed")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./pigateway.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name of the home portal
    #[arg(long, global = true)]
    home: Option<String>,

    /// Status feed URLs, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Fixed device paths, comma separated (disables discovery)
    #[arg(long, global = true, value_delimiter = ',')]
    devices: Option<Vec<String>>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding audio cue files
    #[arg(long, global = true)]
    audio_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Run,

    /// Print the effective configuration
    ShowConfig,

    /// List candidate serial devices
    ListDevices,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            home: self.home.clone(),
            sources: self.sources.clone(),
            devices: self.devices.clone(),
            log_level: self.log_level.clone(),
            audio_dir: self.audio_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = GatewayConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.overrides().apply(&mut config);

    telemetry::init(&config.telemetry.log_level)?;
    debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration sources");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
        Commands::ListDevices => {
            let discovery = discovery::from_config(&config.devices.fixed);
            let candidates = tokio::task::spawn_blocking(move || discovery.candidates())
                .await
                .context("Device discovery task failed")?
                .context("Device discovery failed")?;
            if candidates.is_empty() {
                eprintln!("no candidate devices found");
            }
            for path in candidates {
                println!("{}", path);
            }
        }
        Commands::Run => {
            config.validate().context("Invalid configuration")?;

            let cancel = CancellationToken::new();
            shutdown::cancel_on_signal(cancel.clone());

            let closed = serve::run(config, cancel).await?;
            info!("closed {} device(s)", closed.len());
        }
    }

    Ok(())
}
