//! Bus-client capability.
//!
//! Controllers never touch zbus proxies directly. They talk to a
//! [`NetworkBus`] and to typed device handles, so which operations are valid
//! on which device is decided by the compiler: only a [`WirelessDevice`] can
//! scan, only a [`WiredDevice`] reports carrier.
//!
//! [`SystemBus`](crate::dbus::SystemBus) implements these traits over the
//! system D-Bus. Tests provide in-memory implementations.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::core::reconciler::WorkItem;
use crate::dbus::values::{SettingValue, Settings};

/// What a device path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProbe {
    pub path: String,
    pub interface: String,
    pub device_type: u32,
    pub managed: bool,
}

/// First address and gateway of an IP configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub address: String,
    pub prefix: u32,
    pub gateway: String,
}

/// Properties of one access point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPoint {
    pub path: String,
    pub ssid: Vec<u8>,
    pub bssid: String,
    pub strength: u8,
    pub flags: u32,
    pub wpa_flags: u32,
    pub rsn_flags: u32,
    pub frequency: u32,
    /// Kbit/s.
    pub max_bitrate: u32,
    pub mode: u32,
}

/// A live (activating or active) connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveConnection {
    pub path: String,
    pub id: String,
    pub uuid: String,
    pub connection_type: String,
    pub state: u32,
    /// Settings object path of the profile behind this connection.
    pub connection: String,
    /// Interface name of the first device carrying the connection.
    pub device: String,
    pub mtu: u32,
    pub ip4: Option<IpInfo>,
}

/// A saved profile and its object path.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedConnection {
    pub path: String,
    pub settings: Settings,
}

/// Operations every device supports.
#[async_trait]
pub trait DeviceControl: Send + Sync + Debug {
    fn path(&self) -> &str;
    fn interface(&self) -> &str;
    async fn state(&self) -> Result<u32>;
    async fn hw_address(&self) -> Result<String>;
    async fn driver(&self) -> Result<String>;
    async fn ip4(&self) -> Result<Option<IpInfo>>;
    async fn ip6(&self) -> Result<Option<IpInfo>>;
    async fn disconnect(&self) -> Result<()>;
}

/// A Wi-Fi adapter.
#[async_trait]
pub trait WirelessDevice: DeviceControl {
    async fn request_scan(&self) -> Result<()>;
    async fn access_points(&self) -> Result<Vec<AccessPoint>>;
    /// The associated access point, if any.
    async fn active_access_point(&self) -> Result<Option<AccessPoint>>;
}

/// An Ethernet adapter.
#[async_trait]
pub trait WiredDevice: DeviceControl {
    async fn carrier(&self) -> Result<bool>;
    /// Mb/s.
    async fn speed(&self) -> Result<u32>;
}

/// A registered device, tagged by capability.
#[derive(Debug, Clone)]
pub enum DeviceHandle {
    Wireless(Arc<dyn WirelessDevice>),
    Wired(Arc<dyn WiredDevice>),
}

impl DeviceHandle {
    pub fn control(&self) -> &dyn DeviceControl {
        match self {
            Self::Wireless(d) => d.as_ref(),
            Self::Wired(d) => d.as_ref(),
        }
    }

    pub fn path(&self) -> &str {
        self.control().path()
    }

    pub fn interface(&self) -> &str {
        self.control().interface()
    }
}

/// A signal as delivered to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum BusSignal {
    PropertiesChanged {
        path: String,
        interface: String,
        changed: HashMap<String, SettingValue>,
    },
    DeviceAdded(String),
    DeviceRemoved(String),
    ConnectionAdded(String),
    ConnectionRemoved(String),
}

/// Where subscriptions push their signals. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl SignalSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WorkItem>) -> Self {
        Self { tx }
    }

    /// Queues a signal. Returns `false` once the worker has stopped.
    pub fn send(&self, signal: BusSignal) -> bool {
        self.tx.send(WorkItem::Signal(signal)).is_ok()
    }
}

/// A live signal subscription. Dropping it unsubscribes.
#[derive(Debug, Default)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A subscription with nothing to tear down.
    pub fn detached() -> Self {
        Self { task: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The calls the controllers make against NetworkManager.
///
/// Object paths travel as plain strings; `"/"` is never returned, absent
/// objects are `None`.
#[async_trait]
pub trait NetworkBus: Send + Sync {
    async fn device_paths(&self) -> Result<Vec<String>>;
    async fn probe_device(&self, path: &str) -> Result<DeviceProbe>;
    async fn open_device(&self, probe: &DeviceProbe) -> Result<DeviceHandle>;

    async fn wireless_enabled(&self) -> Result<bool>;
    async fn set_wireless_enabled(&self, enabled: bool) -> Result<()>;

    async fn primary_connection(&self) -> Result<Option<ActiveConnection>>;
    async fn active_connections(&self) -> Result<Vec<ActiveConnection>>;

    /// Activates a saved profile. Returns the active connection path.
    async fn activate(
        &self,
        connection: &str,
        device: Option<&str>,
        specific_object: Option<&str>,
    ) -> Result<String>;
    /// Saves and activates a new profile. Returns the active connection path.
    async fn add_and_activate(
        &self,
        settings: &Settings,
        device: &str,
        specific_object: Option<&str>,
    ) -> Result<String>;
    async fn deactivate(&self, active_connection: &str) -> Result<()>;

    async fn list_connections(&self) -> Result<Vec<SavedConnection>>;
    /// Saves a profile without activating it. Returns its path.
    async fn add_connection(&self, settings: &Settings) -> Result<String>;
    async fn update_connection(&self, path: &str, settings: &Settings) -> Result<()>;
    /// Updates a profile and writes it to disk.
    async fn save_connection(&self, path: &str, settings: &Settings) -> Result<()>;
    async fn delete_connection(&self, path: &str) -> Result<()>;
    async fn clear_secrets(&self, path: &str) -> Result<()>;

    /// Manager, settings and access point signals.
    async fn subscribe_global(&self, sink: SignalSink) -> Result<Subscription>;
    /// Property changes of one device.
    async fn subscribe_device(&self, probe: &DeviceProbe, sink: SignalSink)
    -> Result<Subscription>;
}
