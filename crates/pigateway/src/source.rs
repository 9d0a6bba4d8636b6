//! Portal status sources and their pollers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portalproto::{parse_status, LocationState};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{ErrorReporter, GatewayError, SourceError};

/// Path served by a tecthulhu module when the URL names only the host.
pub const TECTHULHU_STATUS_PATH: &str = "/module/status/json";

/// Something that can be asked for the current state of a portal.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Identifies the source in logs and error reports.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<LocationState, SourceError>;
}

/// Add the tecthulhu status path to a bare host URL.
pub fn resolve_url(raw: &str) -> Result<Url, SourceError> {
    let mut url =
        Url::parse(raw.trim()).map_err(|e| SourceError::InvalidUrl(raw.to_string(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SourceError::InvalidUrl(
                raw.to_string(),
                format!("unsupported scheme '{}'", other),
            ))
        }
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(TECTHULHU_STATUS_PATH);
    }
    Ok(url)
}

/// Polls a tecthulhu module or concentrator over HTTP.
pub struct HttpStatusSource {
    url: Url,
    name: String,
    client: reqwest::Client,
}

impl HttpStatusSource {
    pub fn new(raw: &str, timeout: Duration) -> Result<Self, SourceError> {
        let url = resolve_url(raw)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: url.to_string(),
            url,
            client,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<LocationState, SourceError> {
        let resp = self.client.get(self.url.clone()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }

        let body = resp.bytes().await?;
        trace!(url = %self.url, bytes = body.len(), "status body");
        Ok(parse_status(&body)?)
    }
}

/// Timing for a poller task.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub enqueue_timeout: Duration,
}

/// Poll `source` until cancelled, forwarding each state to `tx`.
///
/// An update the gateway can't take within `enqueue_timeout` is dropped and
/// reported; the next poll supersedes it anyway.
pub fn spawn_poller(
    source: Arc<dyn StatusSource>,
    settings: PollSettings,
    tx: mpsc::Sender<LocationState>,
    errors: ErrorReporter,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = source.fetch() => fetched,
            };

            match fetched {
                Ok(state) => match tx.send_timeout(state, settings.enqueue_timeout).await {
                    Ok(()) => {}
                    Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                        errors
                            .report(GatewayError::Skipped {
                                url: source.name().to_string(),
                            })
                            .await;
                    }
                    Err(mpsc::error::SendTimeoutError::Closed(_)) => break,
                },
                Err(error) => {
                    errors
                        .report(GatewayError::Source {
                            url: source.name().to_string(),
                            error,
                        })
                        .await;
                }
            }
        }

        debug!(source = %source.name(), "poller stopped");
    })
}
