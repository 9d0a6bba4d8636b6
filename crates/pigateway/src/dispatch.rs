//! Command dispatch: one frame, every registered device of a location.

use std::sync::Arc;

use futures::future::join_all;
use portalproto::CommandFrame;
use tracing::{debug, info, warn};

use crate::error::{ErrorReporter, GatewayError};
use crate::registry::DeviceRegistry;

/// Result of one dispatch cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: Vec<String>,
    pub evicted: Vec<String>,
}

/// Sends frames to registered devices, evicting any that fail.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    errors: ErrorReporter,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, errors: ErrorReporter) -> Self {
        Self { registry, errors }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Send `frame` to every device registered for `location`.
    ///
    /// Sends run concurrently and each is bounded by the device's write
    /// timeout. A failing device is evicted; the others are unaffected.
    pub async fn dispatch(&self, location: &str, frame: &CommandFrame) -> DispatchReport {
        let devices = self.registry.snapshot(location);
        let mut report = DispatchReport::default();

        if devices.is_empty() {
            debug!(location = %location, frame = %frame, "no devices to send to");
            return report;
        }

        let sends = devices.iter().map(|device| device.send(frame));
        let results = join_all(sends).await;

        for (device, result) in devices.iter().zip(results) {
            match result {
                Ok(()) => report.sent.push(device.path().to_string()),
                Err(error) => {
                    warn!(
                        device = %device.path(),
                        role = %device.role(),
                        "send failed, evicting: {}",
                        error
                    );
                    self.registry.evict(device);
                    report.evicted.push(device.path().to_string());
                    self.errors
                        .report(GatewayError::Evicted {
                            path: device.path().to_string(),
                            role: device.role().to_string(),
                            error,
                        })
                        .await;
                }
            }
        }

        info!(location = %location, frame = %frame, sent = ?report.sent, "dispatched");
        report
    }
}
