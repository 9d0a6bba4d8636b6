//! pigateway - drives portal display controllers from a live status feed
//!
//! ```text
//! status feeds ──poll──▶ gateway loop ──diff──▶ dispatcher ──frame──▶ devices
//!                              │                     ▲
//!                              └──cues──▶ audio      └── registry ◀── hotplug
//! ```
//!
//! - `source`: status feeds and their pollers
//! - `diff`: last-known state and transition detection
//! - `gateway`: the single consumer of status updates
//! - `dispatch`: fan a frame out to every device of a location
//! - `registry`: open devices by (location, path)
//! - `hotplug`: discovers, handshakes and retires devices
//! - `device` / `discovery`: serial transport and enumeration
//! - `audio`: cue queues and the cue catalog
//!
//! Wire encoding and the status model live in `portalproto`; configuration
//! lives in `gateconf`.

pub mod audio;
pub mod device;
pub mod diff;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod hotplug;
pub mod registry;
pub mod serve;
pub mod shutdown;
pub mod source;
pub mod telemetry;

pub use audio::{AudioPlayer, CueCatalog, CueQueues, CueSender};
pub use device::{
    DeviceHandle, DeviceLink, DeviceOpener, DeviceRole, HandshakeSettings, SerialOpener,
};
pub use diff::{diff, StateStore, Transition};
pub use discovery::{DeviceDiscovery, FixedDevices, UsbSerialDiscovery};
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{DeviceError, DiscoveryError, ErrorReporter, GatewayError, SourceError};
pub use gateway::Gateway;
pub use hotplug::{HotplugSupervisor, ScanReport};
pub use registry::DeviceRegistry;
pub use serve::Collaborators;
pub use source::{HttpStatusSource, PollSettings, StatusSource};
