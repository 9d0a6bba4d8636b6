//! Configuration loading for pigateway.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/pigateway/config.toml` (system)
//! 2. `~/.config/pigateway/config.toml` (user)
//! 3. `./pigateway.toml`, or the path given with `--config`
//! 4. Environment variables (`PIGATEWAY_*`)
//! 5. Command line flags (`Overrides`)
//!
//! Files are merged table by table, so a local file can override a single
//! key without repeating its section.
//!
//! # Example Config
//!
//! ```toml
//! [gateway]
//! home = "Camp Navarro"
//!
//! [sources]
//! urls = ["http://10.0.0.12:12345"]
//! poll_ms = 2000
//!
//! [devices]
//! fixed = ["/dev/ttyUSB0"]
//!
//! [audio]
//! dir = "~/pigateway/sounds"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{
    AudioConfig, DevicesConfig, HomeConfig, QueuesConfig, SourcesConfig, TelemetryConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No status sources were configured")]
    NoStatusSource,

    #[error("Home portal name is empty")]
    EmptyHome,

    #[error("Unsupported status source {url}: {reason}")]
    UnsupportedSource { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub gateway: HomeConfig,
    pub sources: SourcesConfig,
    pub devices: DevicesConfig,
    pub audio: AudioConfig,
    pub queues: QueuesConfig,
    pub telemetry: TelemetryConfig,
}

/// Command line values that take precedence over files and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub home: Option<String>,
    pub sources: Option<Vec<String>>,
    pub devices: Option<Vec<String>>,
    pub log_level: Option<String>,
    pub audio_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(home) = self.home {
            config.gateway.home = home;
        }
        if let Some(sources) = self.sources {
            config.sources.urls = sources;
        }
        if let Some(devices) = self.devices {
            config.devices.fixed = devices;
        }
        if let Some(level) = self.log_level {
            config.telemetry.log_level = level;
        }
        if let Some(dir) = self.audio_dir {
            config.audio.dir = dir;
        }
    }
}

impl GatewayConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Check everything the gateway needs before it can start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.home.trim().is_empty() {
            return Err(ConfigError::EmptyHome);
        }

        let urls: Vec<&String> = self
            .sources
            .urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .collect();
        if urls.is_empty() {
            return Err(ConfigError::NoStatusSource);
        }
        for url in urls {
            check_source_url(url)?;
        }

        if self.sources.poll_ms == 0 {
            return Err(ConfigError::InvalidInterval("sources.poll_ms"));
        }
        if self.devices.scan_ms == 0 {
            return Err(ConfigError::InvalidInterval("devices.scan_ms"));
        }
        if self.gateway.refresh_ms == 0 {
            return Err(ConfigError::InvalidInterval("gateway.refresh_ms"));
        }
        if self.devices.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidInterval("devices.handshake_timeout_ms"));
        }
        if self.devices.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidInterval("devices.write_timeout_ms"));
        }
        if self.queues.capacity == 0 {
            return Err(ConfigError::Invalid(
                "queues.capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(format!("# pigateway configuration\n\n{}", body))
    }
}

fn check_source_url(url: &str) -> Result<(), ConfigError> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase());

    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(()),
        Some("serial") | Some("usb") => Err(ConfigError::UnsupportedSource {
            url: url.to_string(),
            reason: "serial-attached feeds are not implemented".to_string(),
        }),
        Some(other) => Err(ConfigError::UnsupportedSource {
            url: url.to_string(),
            reason: format!("unknown scheme '{}'", other),
        }),
        None => Err(ConfigError::UnsupportedSource {
            url: url.to_string(),
            reason: "missing scheme".to_string(),
        }),
    }
}
