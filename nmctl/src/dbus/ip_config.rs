//! `IP4Config` and `IP6Config` objects.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::OwnedValue;

#[proxy(
    interface = "org.freedesktop.NetworkManager.IP4Config",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMIP4Config {
    /// Addresses as dictionaries with `address` and `prefix` keys.
    #[zbus(property)]
    fn address_data(&self) -> Result<Vec<HashMap<String, OwnedValue>>>;

    #[zbus(property)]
    fn gateway(&self) -> Result<String>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.IP6Config",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMIP6Config {
    #[zbus(property)]
    fn address_data(&self) -> Result<Vec<HashMap<String, OwnedValue>>>;

    #[zbus(property)]
    fn gateway(&self) -> Result<String>;
}
