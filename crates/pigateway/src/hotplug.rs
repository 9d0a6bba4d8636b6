//! Hotplug supervisor
//!
//! On every tick: enumerate candidates, drop registered devices that have
//! vanished, and handshake whatever is new. Handshakes for one scan run
//! concurrently; a slow board costs at most one handshake timeout.
//!
//! A failed enumeration halts automatic discovery for the rest of the run.
//! Devices already registered keep working.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceHandle, DeviceOpener, HandshakeSettings};
use crate::discovery::DeviceDiscovery;
use crate::error::{DiscoveryError, ErrorReporter, GatewayError};
use crate::registry::DeviceRegistry;

/// What one scan did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub registered: Vec<String>,
    pub failed: Vec<String>,
    pub evicted: Vec<String>,
    pub discovery_halted: bool,
}

impl ScanReport {
    pub fn changed(&self) -> bool {
        !self.registered.is_empty() || !self.evicted.is_empty()
    }
}

async fn enumerate(discovery: Arc<dyn DeviceDiscovery>) -> Result<Vec<String>, DiscoveryError> {
    tokio::task::spawn_blocking(move || discovery.candidates())
        .await
        .map_err(|e| DiscoveryError::Aborted(e.to_string()))?
}

pub struct HotplugSupervisor {
    location: String,
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    opener: Arc<dyn DeviceOpener>,
    registry: Arc<DeviceRegistry>,
    settings: HandshakeSettings,
    interval: Duration,
    errors: ErrorReporter,
}

impl HotplugSupervisor {
    pub fn new(
        location: impl Into<String>,
        discovery: Arc<dyn DeviceDiscovery>,
        opener: Arc<dyn DeviceOpener>,
        registry: Arc<DeviceRegistry>,
        errors: ErrorReporter,
    ) -> Self {
        Self {
            location: location.into(),
            discovery: Some(discovery),
            opener,
            registry,
            settings: HandshakeSettings::default(),
            interval: Duration::from_secs(10),
            errors,
        }
    }

    pub fn with_settings(mut self, settings: HandshakeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    /// Run one discovery cycle.
    pub async fn scan_once(&mut self) -> ScanReport {
        let mut report = ScanReport::default();

        let Some(discovery) = self.discovery.clone() else {
            return report;
        };

        let candidates = match enumerate(discovery).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(location = %self.location, "device discovery failed, halting: {}", e);
                self.discovery = None;
                report.discovery_halted = true;
                self.errors.report(GatewayError::Discovery(e)).await;
                return report;
            }
        };

        let mut seen = HashSet::new();
        let candidates: Vec<String> = candidates
            .into_iter()
            .filter(|c| !c.trim().is_empty() && seen.insert(c.clone()))
            .collect();
        report.candidates = candidates.len();

        for path in self.registry.ids(&self.location) {
            if !seen.contains(&path) && self.registry.remove(&self.location, &path).is_some() {
                info!(device = %path, location = %self.location, "device vanished, closed");
                report.evicted.push(path);
            }
        }

        let fresh: Vec<String> = candidates
            .into_iter()
            .filter(|path| !self.registry.contains(&self.location, path))
            .collect();

        if fresh.is_empty() {
            debug!(location = %self.location, "no new devices");
            return report;
        }

        let attempts = fresh.iter().map(|path| {
            DeviceHandle::connect(
                Arc::clone(&self.opener),
                &self.location,
                path,
                &self.settings,
            )
        });
        let results = join_all(attempts).await;

        for (path, result) in fresh.into_iter().zip(results) {
            match result {
                Ok(handle) => {
                    if self.registry.register_if_absent(handle) {
                        report.registered.push(path);
                    }
                }
                Err(e) => {
                    warn!(device = %path, "device handshake failed: {}", e);
                    self.errors
                        .report(GatewayError::Handshake {
                            path: path.clone(),
                            error: e,
                        })
                        .await;
                    report.failed.push(path);
                }
            }
        }

        report
    }

    /// Scan on every tick until cancelled. The first scan runs immediately.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            location = %self.location,
            interval_ms = self.interval.as_millis() as u64,
            "hotplug supervisor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("hotplug supervisor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let report = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        report = self.scan_once() => report,
                    };
                    if report.changed() {
                        info!(
                            location = %self.location,
                            registered = ?report.registered,
                            evicted = ?report.evicted,
                            "device set changed"
                        );
                    }
                }
            }
        }
    }
}
