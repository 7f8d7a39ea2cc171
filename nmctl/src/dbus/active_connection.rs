//! `org.freedesktop.NetworkManager.Connection.Active`.

use zbus::{Result, proxy};
use zvariant::OwnedObjectPath;

/// A connection that is activating, up or going down.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMActiveConnection {
    /// See [`active_state`](crate::types::constants::active_state).
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    /// The saved profile this was activated from.
    #[zbus(property)]
    fn connection(&self) -> Result<OwnedObjectPath>;

    #[zbus(property)]
    fn id(&self) -> Result<String>;

    #[zbus(property)]
    fn uuid(&self) -> Result<String>;

    #[zbus(property, name = "Type")]
    fn connection_type(&self) -> Result<String>;

    #[zbus(property)]
    fn devices(&self) -> Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn ip4_config(&self) -> Result<OwnedObjectPath>;
}
