//! Wired connection settings.

use std::collections::HashMap;

use super::connection_builder::ConnectionBuilder;
use crate::dbus::values::Settings;
use crate::types::constants::connection_type;

/// Builds a DHCP Ethernet profile bound to `interface`.
///
/// # Sections Created
///
/// - `connection`: type `802-3-ethernet`, autoconnect on, interface-name
/// - `802-3-ethernet`: empty
/// - `ipv4` / `ipv6`: "auto"
pub fn build_ethernet_connection(connection_id: &str, interface: &str) -> Settings {
    ConnectionBuilder::new(connection_type::ETHERNET, connection_id)
        .autoconnect(true)
        .interface_name(interface)
        .with_section(connection_type::ETHERNET, HashMap::new())
        .ipv4_auto()
        .ipv6_auto()
        .build()
}
