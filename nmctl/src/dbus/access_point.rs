//! `org.freedesktop.NetworkManager.AccessPoint`.

use zbus::{Result, proxy};

/// The properties read into an [`AccessPoint`](super::AccessPoint) snapshot.
#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMAccessPoint {
    /// Raw bytes, not necessarily UTF-8.
    #[zbus(property)]
    fn ssid(&self) -> Result<Vec<u8>>;

    /// Percent.
    #[zbus(property)]
    fn strength(&self) -> Result<u8>;

    /// The BSSID.
    #[zbus(property)]
    fn hw_address(&self) -> Result<String>;

    #[zbus(property)]
    fn flags(&self) -> Result<u32>;

    #[zbus(property)]
    fn wpa_flags(&self) -> Result<u32>;

    #[zbus(property)]
    fn rsn_flags(&self) -> Result<u32>;

    /// MHz.
    #[zbus(property)]
    fn frequency(&self) -> Result<u32>;

    /// Kbit/s.
    #[zbus(property)]
    fn max_bitrate(&self) -> Result<u32>;

    #[zbus(property)]
    fn mode(&self) -> Result<u32>;
}
