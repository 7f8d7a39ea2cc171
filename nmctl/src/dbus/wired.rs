//! `org.freedesktop.NetworkManager.Device.Wired`.

use zbus::{Result, proxy};

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wired",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMWired {
    /// Link speed in Mb/s, 0 when unknown.
    #[zbus(property)]
    fn speed(&self) -> Result<u32>;

    /// Cable plugged in.
    #[zbus(property)]
    fn carrier(&self) -> Result<bool>;
}
