//! `org.freedesktop.NetworkManager.Device.Wireless`.

use std::collections::HashMap;

use zbus::{Result, proxy};
use zvariant::OwnedObjectPath;

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMWireless {
    /// Starts a scan. Results arrive as `AccessPoints` changes.
    fn request_scan(&self, options: HashMap<String, zvariant::Value<'_>>) -> Result<()>;

    #[zbus(property)]
    fn access_points(&self) -> Result<Vec<OwnedObjectPath>>;

    /// `/` while not associated.
    #[zbus(property)]
    fn active_access_point(&self) -> Result<OwnedObjectPath>;
}
