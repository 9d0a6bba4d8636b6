//! Registry of open controllers, keyed by (location, device path).
//!
//! The registry is the only long-lived owner of a `DeviceHandle`. Snapshots
//! hand out `Arc` clones for the duration of one dispatch; removing an entry
//! closes its connection even while a snapshot still holds it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::device::DeviceHandle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    location: String,
    path: String,
}

impl DeviceKey {
    fn new(location: &str, path: &str) -> Self {
        Self {
            location: location.to_string(),
            path: path.to_string(),
        }
    }
}

/// Concurrent device registry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<DeviceKey, Arc<DeviceHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Copy of every device registered for `location`, sorted by path.
    pub fn snapshot(&self, location: &str) -> Vec<Arc<DeviceHandle>> {
        let mut devices: Vec<Arc<DeviceHandle>> = self
            .devices
            .iter()
            .filter(|entry| entry.key().location == location)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        devices.sort_by(|a, b| a.path().cmp(b.path()));
        devices
    }

    /// Paths registered for `location`.
    pub fn ids(&self, location: &str) -> Vec<String> {
        self.snapshot(location)
            .iter()
            .map(|d| d.path().to_string())
            .collect()
    }

    pub fn contains(&self, location: &str, path: &str) -> bool {
        self.devices.contains_key(&DeviceKey::new(location, path))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Insert `handle` unless its (location, path) is already taken.
    ///
    /// Returns true if inserted. A losing handle is closed here, after the
    /// shard lock is released.
    pub fn register_if_absent(&self, handle: DeviceHandle) -> bool {
        let key = DeviceKey::new(handle.location(), handle.path());
        let loser = match self.devices.entry(key) {
            Entry::Occupied(_) => Some(handle),
            Entry::Vacant(slot) => {
                info!(
                    device = %handle.path(),
                    location = %handle.location(),
                    role = %handle.role(),
                    "device registered"
                );
                slot.insert(Arc::new(handle));
                None
            }
        };

        match loser {
            Some(handle) => {
                debug!(
                    device = %handle.path(),
                    location = %handle.location(),
                    "device already registered, closing duplicate"
                );
                handle.close();
                false
            }
            None => true,
        }
    }

    /// Remove and close a device. Removing an absent device does nothing.
    pub fn remove(&self, location: &str, path: &str) -> Option<Arc<DeviceHandle>> {
        let (_, handle) = self.devices.remove(&DeviceKey::new(location, path))?;
        handle.close();
        Some(handle)
    }

    /// Remove `handle` only if it is still the registered instance for its
    /// path, so a stale failure can't evict a reconnected device.
    pub fn evict(&self, handle: &Arc<DeviceHandle>) -> bool {
        let key = DeviceKey::new(handle.location(), handle.path());
        let removed = self
            .devices
            .remove_if(&key, |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        handle.close();
        removed
    }

    /// Remove and close every device for `location`, returning what was closed.
    pub fn close_all(&self, location: &str) -> Vec<Arc<DeviceHandle>> {
        self.ids(location)
            .iter()
            .filter_map(|path| self.remove(location, path))
            .collect()
    }
}
