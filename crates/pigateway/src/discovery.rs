//! Finding candidate controllers on the host.

use serialport::SerialPortType;
use tracing::trace;

use crate::error::DiscoveryError;

/// Produces the device paths worth trying a handshake on.
///
/// Implementations may block; the supervisor calls them off the runtime.
pub trait DeviceDiscovery: Send + Sync {
    fn candidates(&self) -> Result<Vec<String>, DiscoveryError>;
}

/// Serial ports that look like USB-attached microcontrollers.
#[derive(Debug, Default, Clone)]
pub struct UsbSerialDiscovery;

impl UsbSerialDiscovery {
    pub fn new() -> Self {
        Self
    }
}

/// Does this port look like one of ours?
///
/// Anything calling itself an Arduino qualifies. Otherwise it must be a USB
/// tty whose product is a USB-UART bridge, which is what the clone boards
/// report.
pub fn is_controller(path: &str, manufacturer: Option<&str>, product: Option<&str>) -> bool {
    let mentions = |field: Option<&str>, needle: &str| {
        field
            .map(|s| s.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    };

    if mentions(manufacturer, "arduino") || mentions(product, "arduino") {
        return true;
    }

    let usb_tty = path.contains("ttyUSB") || path.contains("tty.usbserial");
    let uart_bridge = mentions(product, "usb_uart")
        || mentions(product, "usb-uart")
        || mentions(product, "usb uart")
        || mentions(product, "uart bridge");
    usb_tty && uart_bridge
}

impl DeviceDiscovery for UsbSerialDiscovery {
    fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        let ports =
            serialport::available_ports().map_err(|e| DiscoveryError::Enumerate(e.to_string()))?;

        let mut found = Vec::new();
        for port in ports {
            if let SerialPortType::UsbPort(usb) = &port.port_type {
                let keep = is_controller(
                    &port.port_name,
                    usb.manufacturer.as_deref(),
                    usb.product.as_deref(),
                );
                trace!(
                    port = %port.port_name,
                    vid = usb.vid,
                    pid = usb.pid,
                    keep,
                    "usb serial port"
                );
                if keep {
                    found.push(port.port_name);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

/// A fixed, configured list of device paths.
#[derive(Debug, Clone)]
pub struct FixedDevices {
    paths: Vec<String>,
}

impl FixedDevices {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

impl DeviceDiscovery for FixedDevices {
    fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.paths.clone())
    }
}

/// Pick the discovery strategy for a configured device list.
pub fn from_config(fixed: &[String]) -> Box<dyn DeviceDiscovery> {
    if fixed.is_empty() {
        Box::new(UsbSerialDiscovery::new())
    } else {
        Box::new(FixedDevices::new(fixed.to_vec()))
    }
}
