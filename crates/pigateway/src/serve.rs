//! Wiring: start every task, wait for shutdown, close devices on the way out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gateconf::GatewayConfig;
use portalproto::Cue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{AudioPlayer, CueCatalog, CueSender};
use crate::device::{DeviceOpener, HandshakeSettings, SerialOpener};
use crate::discovery::{self, DeviceDiscovery};
use crate::dispatch::Dispatcher;
use crate::error::{drain_errors, ErrorReporter};
use crate::gateway::Gateway;
use crate::hotplug::HotplugSupervisor;
use crate::registry::DeviceRegistry;
use crate::source::{spawn_poller, HttpStatusSource, PollSettings, StatusSource};

/// How long the startup ambient cue may wait for the audio task.
const STARTUP_AMBIENT_TIMEOUT: Duration = Duration::from_secs(3);

/// The pluggable edges of the gateway.
pub struct Collaborators {
    pub opener: Arc<dyn DeviceOpener>,
    pub discovery: Arc<dyn DeviceDiscovery>,
    pub sources: Vec<Arc<dyn StatusSource>>,
}

impl Collaborators {
    /// Serial ports, USB discovery (or the fixed list) and HTTP feeds.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let sources = config
            .sources
            .urls
            .iter()
            .filter(|url| !url.trim().is_empty())
            .map(|url| {
                HttpStatusSource::new(url, config.sources.timeout())
                    .map(|s| Arc::new(s) as Arc<dyn StatusSource>)
                    .with_context(|| format!("Failed to set up status source {}", url))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            opener: Arc::new(SerialOpener::from_config(&config.devices)),
            discovery: Arc::from(discovery::from_config(&config.devices.fixed)),
            sources,
        })
    }
}

/// Run the gateway with real hardware and feeds until `cancel` fires.
pub async fn run(config: GatewayConfig, cancel: CancellationToken) -> Result<Vec<String>> {
    let collaborators = Collaborators::from_config(&config)?;
    run_with(config, collaborators, cancel).await
}

/// Run the gateway until `cancel` fires or every feed stops.
///
/// Returns the paths of the devices closed during shutdown.
pub async fn run_with(
    config: GatewayConfig,
    collaborators: Collaborators,
    cancel: CancellationToken,
) -> Result<Vec<String>> {
    let home = config.gateway.home.clone();
    let capacity = config.queues.capacity;

    info!("🛰️  pigateway starting");
    info!("   Home portal: {}", home);
    info!("   Status sources: {}", collaborators.sources.len());
    if config.devices.fixed.is_empty() {
        info!("   Devices: automatic discovery");
    } else {
        info!("   Devices: {:?}", config.devices.fixed);
    }

    let (errors, error_rx) = ErrorReporter::channel(capacity, config.queues.error_timeout());
    let error_task = tokio::spawn(drain_errors(error_rx, cancel.clone()));

    // Audio
    let audio_dir = config.audio.dir.clone();
    let extension = config.audio.extension.clone();
    let catalog = tokio::task::spawn_blocking(move || CueCatalog::scan(&audio_dir, &extension))
        .await
        .context("Audio catalog scan failed")?;
    info!("   Audio cues: {} in {}", catalog.len(), catalog.dir().display());
    for cue in catalog.missing_faction_cues() {
        warn!(cue = %cue, "no audio file for cue");
    }
    let (cues, cue_queues) = CueSender::channel(capacity, config.audio.cue_timeout());
    let audio_task = tokio::spawn(AudioPlayer::new(catalog).run(cue_queues, cancel.clone()));
    if !config.audio.default_ambient.is_empty() {
        cues.send_ambient(
            Cue::named(config.audio.default_ambient.clone()),
            STARTUP_AMBIENT_TIMEOUT,
        )
        .await;
    }

    // Devices
    let registry = DeviceRegistry::new_shared();
    let supervisor = HotplugSupervisor::new(
        home.clone(),
        collaborators.discovery,
        collaborators.opener,
        Arc::clone(&registry),
        errors.clone(),
    )
    .with_settings(HandshakeSettings::from_config(&config.devices))
    .with_interval(config.devices.scan_interval());
    let supervisor_task = tokio::spawn(supervisor.run(cancel.clone()));

    // Feeds
    let (status_tx, status_rx) = mpsc::channel(capacity);
    let poll = PollSettings {
        interval: config.sources.poll_interval(),
        enqueue_timeout: config.queues.enqueue_timeout(),
    };
    let pollers: Vec<_> = collaborators
        .sources
        .into_iter()
        .map(|source| {
            info!("   Polling {}", source.name());
            spawn_poller(
                source,
                poll.clone(),
                status_tx.clone(),
                errors.clone(),
                cancel.clone(),
            )
        })
        .collect();
    drop(status_tx);

    let gateway = Gateway::new(home.clone(), Dispatcher::new(Arc::clone(&registry), errors))
        .with_audio(cues)
        .with_refresh(config.gateway.refresh());

    info!("✅ pigateway running");
    gateway.run(status_rx, cancel.clone()).await;

    // The gateway can also stop because every feed ended
    cancel.cancel();
    for poller in pollers {
        if let Err(e) = poller.await {
            warn!("status poller ended abnormally: {}", e);
        }
    }
    if let Err(e) = supervisor_task.await {
        warn!("hotplug supervisor ended abnormally: {}", e);
    }
    if let Err(e) = audio_task.await {
        warn!("audio task ended abnormally: {}", e);
    }
    if let Err(e) = error_task.await {
        warn!("error reporter ended abnormally: {}", e);
    }

    let closed: Vec<String> = registry
        .close_all(&home)
        .iter()
        .map(|device| {
            info!(device = %device.path(), role = %device.role(), "closed device");
            device.path().to_string()
        })
        .collect();

    info!("👋 pigateway stopped");
    Ok(closed)
}
