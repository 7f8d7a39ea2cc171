//! D-Bus access to NetworkManager.
//!
//! The zbus proxy definitions are private to this module. The rest of the
//! crate goes through the [`NetworkBus`] capability in [`bus`], implemented
//! over the system bus by [`SystemBus`].

mod access_point;
mod active_connection;
pub mod bus;
mod device;
mod ip_config;
mod main_nm;
mod settings;
mod system;
pub mod values;
mod wired;
mod wireless;

pub(crate) use access_point::NMAccessPointProxy;
pub(crate) use active_connection::NMActiveConnectionProxy;
pub(crate) use device::NMDeviceProxy;
pub(crate) use ip_config::{NMIP4ConfigProxy, NMIP6ConfigProxy};
pub(crate) use main_nm::NMProxy;
pub(crate) use settings::{NMSettingsConnectionProxy, NMSettingsProxy};
pub(crate) use wired::NMWiredProxy;
pub(crate) use wireless::NMWirelessProxy;

pub use bus::{
    AccessPoint, ActiveConnection, BusSignal, DeviceControl, DeviceHandle, DeviceProbe, IpInfo,
    NetworkBus, SavedConnection, SignalSink, Subscription, WiredDevice, WirelessDevice,
};
pub use system::{SystemBus, SystemDevice};
pub use values::{SettingValue, Settings};
