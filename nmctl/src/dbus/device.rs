//! `org.freedesktop.NetworkManager.Device`, shared by every device type.

use zbus::{Result, proxy};
use zvariant::OwnedObjectPath;

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMDevice {
    #[zbus(property)]
    fn interface(&self) -> Result<String>;

    /// See [`device_type`](crate::types::constants::device_type).
    #[zbus(property)]
    fn device_type(&self) -> Result<u32>;

    /// See [`device_state`](crate::types::constants::device_state).
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    #[zbus(property)]
    fn managed(&self) -> Result<bool>;

    #[zbus(property)]
    fn driver(&self) -> Result<String>;

    #[zbus(property)]
    fn hw_address(&self) -> Result<String>;

    /// `/` without an address.
    #[zbus(property)]
    fn ip4_config(&self) -> Result<OwnedObjectPath>;

    #[zbus(property)]
    fn ip6_config(&self) -> Result<OwnedObjectPath>;

    #[zbus(property)]
    fn mtu(&self) -> Result<u32>;

    /// Also blocks autoconnect until the next manual activation.
    fn disconnect(&self) -> Result<()>;
}
