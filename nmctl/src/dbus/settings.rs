//! NetworkManager Settings and Settings.Connection proxies.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedObjectPath, OwnedValue};

/// Proxy for the settings service that stores connection profiles.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
pub trait NMSettings {
    /// Paths of every saved connection profile.
    fn list_connections(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Saves a new connection profile without activating it.
    fn add_connection(
        &self,
        connection: HashMap<String, HashMap<String, OwnedValue>>,
    ) -> Result<OwnedObjectPath>;

    #[zbus(signal)]
    fn new_connection(&self, connection: OwnedObjectPath);

    #[zbus(signal)]
    fn connection_removed(&self, connection: OwnedObjectPath);
}

/// Proxy for a single saved connection profile.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMSettingsConnection {
    /// Returns the profile's settings, without secrets.
    fn get_settings(&self) -> Result<HashMap<String, HashMap<String, OwnedValue>>>;

    /// Replaces the profile's settings.
    fn update(&self, properties: HashMap<String, HashMap<String, OwnedValue>>) -> Result<()>;

    /// Replaces the profile's settings with extra flags (0x1 = persist to disk).
    fn update2(
        &self,
        settings: HashMap<String, HashMap<String, OwnedValue>>,
        flags: u32,
        args: HashMap<String, OwnedValue>,
    ) -> Result<HashMap<String, OwnedValue>>;

    /// Deletes the profile.
    fn delete(&self) -> Result<()>;

    /// Clears the secrets stored for this profile.
    fn clear_secrets(&self) -> Result<()>;
}
