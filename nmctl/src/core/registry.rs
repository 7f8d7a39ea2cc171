//! Device registry.
//!
//! Tracks the managed Wi-Fi and Ethernet adapters by interface name, each
//! with its typed handle and cached hardware address. One device per domain
//! is the primary; operations without an explicit device use it.
//!
//! When the primary is removed, the remaining device whose interface name
//! sorts first takes over, so the choice does not depend on hash order.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dbus::bus::{DeviceHandle, WiredDevice, WirelessDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Domain {
    Wifi,
    Ethernet,
}

/// A registered adapter.
#[derive(Debug)]
pub(crate) struct Entry<D: ?Sized> {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) hw_address: String,
    pub(crate) device: Arc<D>,
}

impl<D: ?Sized> Clone for Entry<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            hw_address: self.hw_address.clone(),
            device: Arc::clone(&self.device),
        }
    }
}

pub(crate) type WifiEntry = Entry<dyn WirelessDevice>;
pub(crate) type WiredEntry = Entry<dyn WiredDevice>;

#[derive(Debug)]
struct Devices<D: ?Sized> {
    entries: BTreeMap<String, Entry<D>>,
    primary: Option<String>,
}

impl<D: ?Sized> Default for Devices<D> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            primary: None,
        }
    }
}

impl<D: ?Sized> Devices<D> {
    fn insert(&mut self, entry: Entry<D>) {
        if self.primary.is_none() {
            self.primary = Some(entry.name.clone());
        }
        self.entries.insert(entry.name.clone(), entry);
    }

    fn remove_path(&mut self, path: &str) -> Option<Entry<D>> {
        let name = self
            .entries
            .values()
            .find(|e| e.path == path)
            .map(|e| e.name.clone())?;
        let removed = self.entries.remove(&name)?;
        if self.primary.as_deref() == Some(name.as_str()) {
            self.primary = self.entries.keys().next().cloned();
        }
        Some(removed)
    }

    fn primary(&self) -> Option<Entry<D>> {
        self.primary
            .as_ref()
            .and_then(|name| self.entries.get(name))
            .cloned()
    }

    fn contains_path(&self, path: &str) -> bool {
        self.entries.values().any(|e| e.path == path)
    }
}

/// The Wi-Fi and Ethernet device maps.
#[derive(Debug, Default)]
pub(crate) struct DeviceRegistry {
    wifi: RwLock<Devices<dyn WirelessDevice>>,
    ethernet: RwLock<Devices<dyn WiredDevice>>,
}

impl DeviceRegistry {
    /// Adds (or replaces) a device. The first device of a domain becomes
    /// its primary.
    pub(crate) fn register(&self, handle: DeviceHandle, hw_address: String) -> Domain {
        let name = handle.interface().to_string();
        let path = handle.path().to_string();
        match handle {
            DeviceHandle::Wireless(device) => {
                let mut wifi = self.wifi.write().unwrap_or_else(PoisonError::into_inner);
                wifi.insert(Entry {
                    name,
                    path,
                    hw_address,
                    device,
                });
                Domain::Wifi
            }
            DeviceHandle::Wired(device) => {
                let mut eth = self.ethernet.write().unwrap_or_else(PoisonError::into_inner);
                eth.insert(Entry {
                    name,
                    path,
                    hw_address,
                    device,
                });
                Domain::Ethernet
            }
        }
    }

    /// Removes the device at `path`, promoting a new primary if needed.
    pub(crate) fn remove(&self, path: &str) -> Option<(Domain, String)> {
        if let Some(e) = self
            .wifi
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_path(path)
        {
            return Some((Domain::Wifi, e.name));
        }
        self.ethernet
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_path(path)
            .map(|e| (Domain::Ethernet, e.name))
    }

    pub(crate) fn domain_of(&self, path: &str) -> Option<Domain> {
        if self
            .wifi
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_path(path)
        {
            return Some(Domain::Wifi);
        }
        self.ethernet
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_path(path)
            .then_some(Domain::Ethernet)
    }

    pub(crate) fn primary_wifi(&self) -> Option<WifiEntry> {
        self.wifi.read().unwrap_or_else(PoisonError::into_inner).primary()
    }

    pub(crate) fn wifi(&self, name: &str) -> Option<WifiEntry> {
        self.wifi
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(name)
            .cloned()
    }

    /// All Wi-Fi devices, sorted by interface name.
    pub(crate) fn wifi_devices(&self) -> Vec<WifiEntry> {
        self.wifi
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn primary_wired(&self) -> Option<WiredEntry> {
        self.ethernet
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .primary()
    }

    pub(crate) fn wired(&self, name: &str) -> Option<WiredEntry> {
        self.ethernet
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(name)
            .cloned()
    }

    /// All Ethernet devices, sorted by interface name.
    pub(crate) fn wired_devices(&self) -> Vec<WiredEntry> {
        self.ethernet
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::dbus::bus::{AccessPoint, DeviceControl, IpInfo};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Stub {
        path: String,
        iface: String,
    }

    #[async_trait]
    impl DeviceControl for Stub {
        fn path(&self) -> &str {
            &self.path
        }
        fn interface(&self) -> &str {
            &self.iface
        }
        async fn state(&self) -> Result<u32> {
            Ok(30)
        }
        async fn hw_address(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn driver(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn ip4(&self) -> Result<Option<IpInfo>> {
            Ok(None)
        }
        async fn ip6(&self) -> Result<Option<IpInfo>> {
            Ok(None)
        }
        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl WirelessDevice for Stub {
        async fn request_scan(&self) -> Result<()> {
            Ok(())
        }
        async fn access_points(&self) -> Result<Vec<AccessPoint>> {
            Ok(Vec::new())
        }
        async fn active_access_point(&self) -> Result<Option<AccessPoint>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl WiredDevice for Stub {
        async fn carrier(&self) -> Result<bool> {
            Ok(false)
        }
        async fn speed(&self) -> Result<u32> {
            Ok(0)
        }
    }

    fn wifi(path: &str, iface: &str) -> DeviceHandle {
        DeviceHandle::Wireless(Arc::new(Stub {
            path: path.into(),
            iface: iface.into(),
        }))
    }

    fn wired(path: &str, iface: &str) -> DeviceHandle {
        DeviceHandle::Wired(Arc::new(Stub {
            path: path.into(),
            iface: iface.into(),
        }))
    }

    #[test]
    fn first_device_of_each_domain_is_primary() {
        let reg = DeviceRegistry::default();
        assert_eq!(reg.register(wifi("/d/2", "wlp2s0"), "aa".into()), Domain::Wifi);
        reg.register(wifi("/d/1", "wlan0"), "bb".into());
        assert_eq!(reg.register(wired("/d/3", "eth0"), "cc".into()), Domain::Ethernet);

        assert_eq!(reg.primary_wifi().map(|e| e.name), Some("wlp2s0".into()));
        assert_eq!(reg.primary_wired().map(|e| e.name), Some("eth0".into()));
        assert_eq!(reg.domain_of("/d/1"), Some(Domain::Wifi));
        assert_eq!(reg.domain_of("/d/9"), None);
    }

    #[test]
    fn removing_primary_promotes_first_by_name() {
        let reg = DeviceRegistry::default();
        reg.register(wifi("/d/1", "wlp3s0"), String::new());
        reg.register(wifi("/d/2", "wlan1"), String::new());
        reg.register(wifi("/d/3", "wlan0"), String::new());

        assert_eq!(reg.remove("/d/1"), Some((Domain::Wifi, "wlp3s0".into())));
        assert_eq!(reg.primary_wifi().map(|e| e.name), Some("wlan0".into()));
    }

    #[test]
    fn removing_last_device_clears_primary() {
        let reg = DeviceRegistry::default();
        reg.register(wired("/d/1", "eth0"), String::new());
        assert!(reg.remove("/d/1").is_some());
        assert!(reg.primary_wired().is_none());
        assert!(reg.wired_devices().is_empty());
        assert!(reg.remove("/d/1").is_none());
    }

    #[test]
    fn removing_secondary_keeps_primary() {
        let reg = DeviceRegistry::default();
        reg.register(wired("/d/1", "eth1"), String::new());
        reg.register(wired("/d/2", "eth0"), String::new());
        reg.remove("/d/2");
        assert_eq!(reg.primary_wired().map(|e| e.name), Some("eth1".into()));
    }
}
