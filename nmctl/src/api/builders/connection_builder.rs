//! Core connection builder for NetworkManager settings.
//!
//! The `ConnectionBuilder` handles the sections every profile shares
//! (connection metadata, IPv4/IPv6 configuration). Type-specific builders
//! such as [`WifiConnectionBuilder`](super::WifiConnectionBuilder) add their
//! own sections on top.
//!
//! # Example
//!
//! ```rust
//! use nmctl::builders::ConnectionBuilder;
//!
//! let settings = ConnectionBuilder::new("802-3-ethernet", "Wired connection 1")
//!     .autoconnect(true)
//!     .ipv4_auto()
//!     .ipv6_auto()
//!     .build();
//! assert!(settings.contains_key("ipv4"));
//! ```

use std::collections::HashMap;
use uuid::Uuid;

use crate::dbus::values::{SettingValue, Settings};

/// Core connection settings builder.
///
/// # Sections Managed
///
/// - `connection`: Metadata (type, id, uuid, autoconnect settings)
/// - `ipv4`: IPv4 configuration
/// - `ipv6`: IPv6 configuration
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    settings: Settings,
}

impl ConnectionBuilder {
    /// Creates a new connection builder with the specified type and ID.
    ///
    /// A random UUID is generated for the profile.
    pub fn new(connection_type: &str, id: impl Into<String>) -> Self {
        let mut connection = HashMap::new();
        connection.insert("type".to_string(), SettingValue::from(connection_type));
        connection.insert("id".to_string(), SettingValue::from(id.into()));
        connection.insert(
            "uuid".to_string(),
            SettingValue::from(Uuid::new_v4().to_string()),
        );

        let mut settings = Settings::new();
        settings.insert("connection".to_string(), connection);
        Self { settings }
    }

    /// Enables or disables automatic connection on boot/availability.
    pub fn autoconnect(self, enabled: bool) -> Self {
        self.set("connection", "autoconnect", enabled)
    }

    /// Restricts the profile to one interface.
    pub fn interface_name(self, name: impl Into<String>) -> Self {
        self.set("connection", "interface-name", name.into())
    }

    /// Configures IPv4 to use automatic configuration (DHCP).
    pub fn ipv4_auto(self) -> Self {
        self.set("ipv4", "method", "auto")
    }

    /// Configures IPv6 to use automatic configuration (SLAAC/DHCPv6).
    pub fn ipv6_auto(self) -> Self {
        self.set("ipv6", "method", "auto")
    }

    /// Sets a single key, creating the section when needed.
    pub fn set(mut self, section: &str, key: &str, value: impl Into<SettingValue>) -> Self {
        self.settings
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Replaces a whole section.
    pub fn with_section(mut self, name: &str, section: HashMap<String, SettingValue>) -> Self {
        self.settings.insert(name.to_string(), section);
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbus::values::setting_str;

    #[test]
    fn new_sets_connection_metadata() {
        let settings = ConnectionBuilder::new("802-11-wireless", "Cafe").build();
        assert_eq!(setting_str(&settings, "connection", "type"), "802-11-wireless");
        assert_eq!(setting_str(&settings, "connection", "id"), "Cafe");
        assert!(Uuid::parse_str(setting_str(&settings, "connection", "uuid")).is_ok());
    }

    #[test]
    fn uuids_differ_between_builders() {
        let a = ConnectionBuilder::new("vpn", "a").build();
        let b = ConnectionBuilder::new("vpn", "a").build();
        assert_ne!(
            setting_str(&a, "connection", "uuid"),
            setting_str(&b, "connection", "uuid")
        );
    }

    #[test]
    fn ip_methods_and_autoconnect() {
        let settings = ConnectionBuilder::new("802-3-ethernet", "eth")
            .autoconnect(false)
            .ipv4_auto()
            .ipv6_auto()
            .build();
        assert_eq!(setting_str(&settings, "ipv4", "method"), "auto");
        assert_eq!(setting_str(&settings, "ipv6", "method"), "auto");
        assert_eq!(
            settings["connection"]["autoconnect"],
            SettingValue::Bool(false)
        );
    }
}
