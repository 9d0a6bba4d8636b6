//! Configuration sections.
//!
//! Every field has a serde default so a partial file only overrides what it
//! names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which portal drives the attached controllers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeConfig {
    /// Name of the home portal, matched against the feed's title.
    /// Default: "Camp Navarro"
    pub home: String,

    /// How often the last home frame is re-sent to devices.
    /// Default: 2000
    pub refresh_ms: u64,
}

impl HomeConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self {
            home: "Camp Navarro".to_string(),
            refresh_ms: 2000,
        }
    }
}

/// Status feeds to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Feed URLs (http:// or https://).
    /// Default: ["http://127.0.0.1:12345"]
    pub urls: Vec<String>,

    /// Poll interval per feed.
    /// Default: 2000
    pub poll_ms: u64,

    /// Per-request HTTP timeout.
    /// Default: 5000
    pub timeout_ms: u64,
}

impl SourcesConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            urls: vec!["http://127.0.0.1:12345".to_string()],
            poll_ms: 2000,
            timeout_ms: 5000,
        }
    }
}

/// Serial controller discovery and handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Fixed device paths. Empty means automatic discovery.
    pub fixed: Vec<String>,

    /// Hotplug scan interval.
    /// Default: 10000
    pub scan_ms: u64,

    /// Default: 115200
    pub baud_rate: u32,

    /// Delay after opening a port before the handshake, while the board resets.
    /// Default: 2000
    pub settle_ms: u64,

    /// Time allowed for the handshake reply line.
    /// Default: 5000
    pub handshake_timeout_ms: u64,

    /// Time allowed for a frame write.
    /// Default: 2000
    pub write_timeout_ms: u64,
}

impl DevicesConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            fixed: Vec::new(),
            scan_ms: 10_000,
            baud_rate: 115_200,
            settle_ms: 2000,
            handshake_timeout_ms: 5000,
            write_timeout_ms: 2000,
        }
    }
}

/// Audio cue delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory holding cue files.
    /// Default: assets/sounds
    pub dir: PathBuf,

    /// Ambient cue played at startup.
    /// Default: e-ambient
    pub default_ambient: String,

    /// How long a cue may wait for the audio queue before it is dropped.
    /// Default: 1000
    pub cue_timeout_ms: u64,

    /// File extension of cue files.
    /// Default: ogg
    pub extension: String,
}

impl AudioConfig {
    pub fn cue_timeout(&self) -> Duration {
        Duration::from_millis(self.cue_timeout_ms)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("assets/sounds"),
            default_ambient: "e-ambient".to_string(),
            cue_timeout_ms: 1000,
            extension: "ogg".to_string(),
        }
    }
}

/// Bounded queues between tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    /// Capacity of every inter-task queue.
    /// Default: 4
    pub capacity: usize,

    /// How long a status update may wait for the gateway before it is dropped.
    /// Default: 750
    pub enqueue_timeout_ms: u64,

    /// How long an error report may wait before it is logged and dropped.
    /// Default: 500
    pub error_timeout_ms: u64,
}

impl QueuesConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn error_timeout(&self) -> Duration {
        Duration::from_millis(self.error_timeout_ms)
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            enqueue_timeout_ms: 750,
            error_timeout_ms: 500,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error, fatal).
    /// Default: warn
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}
