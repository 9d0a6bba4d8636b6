//! Error types and the single error-reporting path.
//!
//! Steady-state failures never stop a task. They are wrapped in a
//! `GatewayError`, pushed onto a bounded queue by an `ErrorReporter`, and
//! logged by whoever drains it (the binary's main loop).

use std::io;
use std::time::Duration;

use portalproto::FeedError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Failures talking to a single serial controller.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unable to open: {0}")]
    Open(String),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("malformed handshake reply {0:?}")]
    Handshake(String),

    #[error("connection already closed")]
    Closed,

    #[error("device task aborted: {0}")]
    Aborted(String),
}

/// Failures enumerating candidate devices.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("serial port enumeration failed: {0}")]
    Enumerate(String),

    #[error("discovery task aborted: {0}")]
    Aborted(String),
}

/// Failures fetching portal status from a feed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid feed URL {0}: {1}")]
    InvalidUrl(String, String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("bad status document: {0}")]
    Feed(#[from] FeedError),
}

/// Everything that flows through the error-reporting path.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("portal status for {url} could not be retrieved: {error}")]
    Source {
        url: String,
        #[source]
        error: SourceError,
    },

    #[error("portal status for {url} had to be skipped, gateway is busy")]
    Skipped { url: String },

    #[error("device {path} ({role}) failed, taking it offline: {error}")]
    Evicted {
        path: String,
        role: String,
        #[source]
        error: DeviceError,
    },

    #[error("device {path} could not be started: {error}")]
    Handshake {
        path: String,
        #[source]
        error: DeviceError,
    },

    #[error("automatic device discovery halted: {0}")]
    Discovery(#[source] DiscoveryError),
}

/// Producer side of the error-reporting path.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<GatewayError>,
    timeout: Duration,
}

impl ErrorReporter {
    /// Create a reporter and the receiver that drains it.
    pub fn channel(capacity: usize, timeout: Duration) -> (Self, mpsc::Receiver<GatewayError>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, timeout }, rx)
    }

    /// Enqueue an error, giving up after the configured timeout.
    ///
    /// An error that can't be enqueued is logged here instead of lost silently.
    pub async fn report(&self, error: GatewayError) {
        if let Err(e) = self.tx.send_timeout(error, self.timeout).await {
            let error = match e {
                mpsc::error::SendTimeoutError::Timeout(error) => error,
                mpsc::error::SendTimeoutError::Closed(error) => error,
            };
            warn!("could not report error, logging directly: {}", error);
        }
    }
}

/// Log everything on the error queue until cancelled or every reporter is gone.
pub async fn drain_errors(mut rx: mpsc::Receiver<GatewayError>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(error) => warn!("{}", error),
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reporter_delivers_errors() {
        let (reporter, mut rx) = ErrorReporter::channel(2, Duration::from_millis(50));
        reporter
            .report(GatewayError::Skipped {
                url: "http://a".to_string(),
            })
            .await;

        let got = rx.recv().await.unwrap();
        assert!(got.to_string().contains("http://a"));
    }

    #[tokio::test]
    async fn reporter_gives_up_when_full() {
        let (reporter, _rx) = ErrorReporter::channel(1, Duration::from_millis(10));
        for _ in 0..3 {
            // Must return even though nobody drains the queue
            reporter
                .report(GatewayError::Skipped {
                    url: "http://a".to_string(),
                })
                .await;
        }
    }

    #[test]
    fn eviction_message_names_device_and_role() {
        let err = GatewayError::Evicted {
            path: "/dev/ttyUSB0".to_string(),
            role: "core".to_string(),
            error: DeviceError::Closed,
        };
        let text = err.to_string();
        assert!(text.contains("/dev/ttyUSB0"));
        assert!(text.contains("core"));
    }
}
