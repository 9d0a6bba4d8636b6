//! Serial controller handles
//!
//! A `DeviceHandle` owns one open connection to an attached controller. The
//! underlying port is blocking, so every read and write runs on the blocking
//! pool behind a tokio timeout; a wedged port can stall a blocking thread but
//! never the gateway.
//!
//! ## Handshake
//!
//! ```text
//! open port → wait `settle` (board resets on open) → clear input
//!           → write "*\n" → read one line within `handshake_timeout`
//! ```
//!
//! The reply line names the controller's role.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use gateconf::DevicesConfig;
use portalproto::CommandFrame;
use tracing::debug;

use crate::error::DeviceError;

/// Probe written to a freshly opened controller.
pub const HANDSHAKE_PROBE: &[u8] = b"*\n";

/// Longest handshake reply we'll accept.
const MAX_LINE: usize = 256;

/// What a controller told us it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRole {
    /// The portal core: faction lighting and overall health
    Core,
    /// A ring of resonator displays
    ResonatorCluster,
    /// Answered the handshake with something we don't know
    Unknown(String),
}

impl DeviceRole {
    /// Classify a handshake reply. An empty line is not a valid reply.
    pub fn classify(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let lower = line.to_ascii_lowercase();
        if lower == "core" {
            Some(DeviceRole::Core)
        } else if lower.starts_with("res") || lower.starts_with("cluster") {
            Some(DeviceRole::ResonatorCluster)
        } else {
            Some(DeviceRole::Unknown(line.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceRole::Core => "core",
            DeviceRole::ResonatorCluster => "resonator-cluster",
            DeviceRole::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Line-oriented byte transport to one controller.
///
/// Implementations block; callers run them on the blocking pool.
pub trait DeviceLink: Send {
    /// Discard anything the controller sent before we asked.
    fn clear_input(&mut self) -> io::Result<()>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to and including the next `\n`.
    fn read_line(&mut self) -> io::Result<String>;
}

/// Opens links by device path.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn DeviceLink>, DeviceError>;
}

/// `DeviceLink` over a real serial port.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl DeviceLink for SerialLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        while line.len() < MAX_LINE {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Opens serial ports at a fixed baud rate.
pub struct SerialOpener {
    baud_rate: u32,
    timeout: Duration,
}

impl SerialOpener {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }

    pub fn from_config(config: &DevicesConfig) -> Self {
        Self::new(config.baud_rate, config.handshake_timeout())
    }
}

impl DeviceOpener for SerialOpener {
    fn open(&self, path: &str) -> Result<Box<dyn DeviceLink>, DeviceError> {
        let port = serialport::new(path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DeviceError::Open(e.to_string()))?;
        Ok(Box::new(SerialLink { port }))
    }
}

/// Timing for bringing a device up and talking to it.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    pub settle: Duration,
    pub timeout: Duration,
    pub write_timeout: Duration,
}

impl HandshakeSettings {
    pub fn from_config(config: &DevicesConfig) -> Self {
        Self {
            settle: config.settle(),
            timeout: config.handshake_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self::from_config(&DevicesConfig::default())
    }
}

type SharedLink = Arc<Mutex<Option<Box<dyn DeviceLink>>>>;

fn close_link(link: &SharedLink) {
    let taken = match link.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    drop(taken);
}

fn ping(link: &mut dyn DeviceLink) -> Result<DeviceRole, DeviceError> {
    // Stale bytes from the bootloader are common, losing them is fine
    if let Err(e) = link.clear_input() {
        debug!("could not clear input before handshake: {}", e);
    }
    link.write_all(HANDSHAKE_PROBE).map_err(DeviceError::Write)?;
    let line = link.read_line().map_err(DeviceError::Read)?;
    DeviceRole::classify(&line).ok_or(DeviceError::Handshake(line))
}

/// One open, classified controller.
pub struct DeviceHandle {
    path: String,
    location: String,
    role: DeviceRole,
    link: SharedLink,
    write_timeout: Duration,
}

impl DeviceHandle {
    /// Open `path`, let it settle, and classify it by handshake.
    ///
    /// On any failure the connection is closed before returning.
    pub async fn connect(
        opener: Arc<dyn DeviceOpener>,
        location: &str,
        path: &str,
        settings: &HandshakeSettings,
    ) -> Result<Self, DeviceError> {
        let open_path = path.to_string();
        let mut link = tokio::task::spawn_blocking(move || opener.open(&open_path))
            .await
            .map_err(|e| DeviceError::Aborted(e.to_string()))??;

        tokio::time::sleep(settings.settle).await;

        // The blocking task owns the link until it answers; if we give up
        // waiting, the link is dropped (and closed) when the read returns.
        let handshake = tokio::task::spawn_blocking(move || {
            let result = ping(link.as_mut());
            (link, result)
        });

        let (link, role) = match tokio::time::timeout(settings.timeout, handshake).await {
            Ok(Ok((link, Ok(role)))) => (link, role),
            Ok(Ok((_link, Err(e)))) => return Err(e),
            Ok(Err(join)) => return Err(DeviceError::Aborted(join.to_string())),
            Err(_) => return Err(DeviceError::Timeout("handshake", settings.timeout)),
        };

        Ok(Self {
            path: path.to_string(),
            location: location.to_string(),
            role,
            link: Arc::new(Mutex::new(Some(link))),
            write_timeout: settings.write_timeout,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn role(&self) -> &DeviceRole {
        &self.role
    }

    pub fn is_open(&self) -> bool {
        match self.link.try_lock() {
            Ok(guard) => guard.is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
            // Busy means a write holds it, so it's still open
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Write one frame. Any error, timeout or panic on the write path is
    /// returned as a `DeviceError`.
    pub async fn send(&self, frame: &CommandFrame) -> Result<(), DeviceError> {
        let link = Arc::clone(&self.link);
        let bytes = frame.as_bytes().to_vec();

        let write = tokio::task::spawn_blocking(move || {
            let mut guard = link
                .lock()
                .map_err(|_| DeviceError::Aborted("connection lock poisoned".to_string()))?;
            match guard.as_mut() {
                Some(link) => link.write_all(&bytes).map_err(DeviceError::Write),
                None => Err(DeviceError::Closed),
            }
        });

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(DeviceError::Aborted(join.to_string())),
            Err(_) => Err(DeviceError::Timeout("write", self.write_timeout)),
        }
    }

    /// Close the connection. Safe to call more than once; only the first call
    /// closes anything. Never blocks on an in-flight write.
    pub fn close(&self) {
        match self.link.try_lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(TryLockError::Poisoned(poisoned)) => drop(poisoned.into_inner().take()),
            Err(TryLockError::WouldBlock) => {
                let link = Arc::clone(&self.link);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn_blocking(move || close_link(&link));
                    }
                    Err(_) => {
                        close_link(&link);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("location", &self.location)
            .field("role", &self.role)
            .finish()
    }
}

/// In-memory links for exercising device handling without hardware.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// Shared view of a mock link, kept by the test after the link is handed out.
    #[derive(Debug, Default)]
    pub struct MockPort {
        pub written: Mutex<Vec<Vec<u8>>>,
        pub fail_writes: AtomicBool,
        pub panic_on_write: AtomicBool,
        pub closed: AtomicBool,
        pub opens: AtomicUsize,
        /// Links closed so far, across every open of this path
        pub closes: AtomicUsize,
        /// Milliseconds `read_line` sleeps before answering
        pub read_delay_ms: AtomicU64,
        /// Milliseconds `write_all` sleeps before writing
        pub write_delay_ms: AtomicU64,
        /// Milliseconds a link takes to close, like a tty draining output
        pub close_delay_ms: AtomicU64,
    }

    fn pause(delay_ms: &AtomicU64) {
        let ms = delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }

    impl MockPort {
        pub fn frames(&self) -> Vec<Vec<u8>> {
            self.written
                .lock()
                .map(|w| w.iter().filter(|b| b.as_slice() != HANDSHAKE_PROBE).cloned().collect())
                .unwrap_or_default()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct MockLink {
        port: Arc<MockPort>,
        reply: Option<String>,
    }

    impl DeviceLink for MockLink {
        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            pause(&self.port.write_delay_ms);
            if self.port.panic_on_write.load(Ordering::SeqCst) {
                panic!("mock write path blew up");
            }
            if self.port.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            if let Ok(mut written) = self.port.written.lock() {
                written.push(bytes.to_vec());
            }
            Ok(())
        }

        fn read_line(&mut self) -> io::Result<String> {
            pause(&self.port.read_delay_ms);
            match self.reply.take() {
                Some(line) => Ok(line),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
            }
        }
    }

    impl Drop for MockLink {
        fn drop(&mut self) {
            pause(&self.port.close_delay_ms);
            self.port.closes.fetch_add(1, Ordering::SeqCst);
            self.port.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Opener backed by a table of fake devices and their handshake replies.
    #[derive(Default)]
    pub struct MockOpener {
        devices: Mutex<HashMap<String, (String, Arc<MockPort>)>>,
    }

    impl MockOpener {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a device that answers the handshake with `reply`.
        pub fn add(&self, path: &str, reply: &str) -> Arc<MockPort> {
            let port = Arc::new(MockPort::default());
            if let Ok(mut devices) = self.devices.lock() {
                devices.insert(path.to_string(), (reply.to_string(), Arc::clone(&port)));
            }
            port
        }

        pub fn port_for(&self, path: &str) -> Option<Arc<MockPort>> {
            self.devices
                .lock()
                .ok()
                .and_then(|d| d.get(path).map(|(_, port)| Arc::clone(port)))
        }
    }

    impl DeviceOpener for MockOpener {
        fn open(&self, path: &str) -> Result<Box<dyn DeviceLink>, DeviceError> {
            let devices = self
                .devices
                .lock()
                .map_err(|_| DeviceError::Open("mock table poisoned".to_string()))?;
            let (reply, port) = devices
                .get(path)
                .ok_or_else(|| DeviceError::Open(format!("no such device {}", path)))?;
            port.opens.fetch_add(1, Ordering::SeqCst);
            port.closed.store(false, Ordering::SeqCst);
            Ok(Box::new(MockLink {
                port: Arc::clone(port),
                reply: Some(reply.clone()),
            }))
        }
    }
}
