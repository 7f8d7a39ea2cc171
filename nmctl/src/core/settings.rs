//! Lookups over saved connection profiles.

use std::collections::HashMap;

use crate::dbus::bus::SavedConnection;
use crate::dbus::values::{SettingValue, Settings, setting, setting_str};
use crate::types::constants::connection_type;

/// Keys NetworkManager rejects on `Update` when echoed back verbatim.
const IP_KEYS_TO_STRIP: [&str; 3] = ["addresses", "routes", "dns"];

pub(crate) fn conn_type(settings: &Settings) -> &str {
    setting_str(settings, "connection", "type")
}

pub(crate) fn conn_id(settings: &Settings) -> &str {
    setting_str(settings, "connection", "id")
}

pub(crate) fn conn_uuid(settings: &Settings) -> &str {
    setting_str(settings, "connection", "uuid")
}

/// `connection.autoconnect`, which NetworkManager treats as true when unset.
pub(crate) fn autoconnect(settings: &Settings) -> bool {
    setting(settings, "connection", "autoconnect")
        .and_then(SettingValue::as_bool)
        .unwrap_or(true)
}

pub(crate) fn is_vpn(settings: &Settings) -> bool {
    matches!(
        conn_type(settings),
        connection_type::VPN | connection_type::WIREGUARD
    )
}

pub(crate) fn wifi_ssid(settings: &Settings) -> Option<&[u8]> {
    if conn_type(settings) != connection_type::WIRELESS {
        return None;
    }
    setting(settings, connection_type::WIRELESS, "ssid").and_then(SettingValue::as_bytes)
}

pub(crate) fn vpn_service_type(settings: &Settings) -> &str {
    setting_str(settings, "vpn", "service-type")
}

/// A copy of `vpn.data`, empty when absent.
pub(crate) fn vpn_data(settings: &Settings) -> HashMap<String, String> {
    setting(settings, "vpn", "data")
        .and_then(SettingValue::as_str_map)
        .cloned()
        .unwrap_or_default()
}

/// The saved Wi-Fi profile whose SSID bytes equal `ssid`.
pub(crate) fn find_wifi<'a>(
    connections: &'a [SavedConnection],
    ssid: &str,
) -> Option<&'a SavedConnection> {
    connections
        .iter()
        .find(|c| wifi_ssid(&c.settings) == Some(ssid.as_bytes()))
}

/// The VPN or WireGuard profile with this UUID or name.
pub(crate) fn find_vpn<'a>(
    connections: &'a [SavedConnection],
    uuid_or_name: &str,
) -> Option<&'a SavedConnection> {
    connections.iter().find(|c| {
        is_vpn(&c.settings)
            && (conn_uuid(&c.settings) == uuid_or_name || conn_id(&c.settings) == uuid_or_name)
    })
}

pub(crate) fn find_uuid<'a>(
    connections: &'a [SavedConnection],
    uuid: &str,
) -> Option<&'a SavedConnection> {
    connections.iter().find(|c| conn_uuid(&c.settings) == uuid)
}

/// Drops the IP keys that make `Update` fail when sent back unchanged.
pub(crate) fn strip_ip_keys(settings: &mut Settings) {
    for family in ["ipv4", "ipv6"] {
        if let Some(section) = settings.get_mut(family) {
            for key in IP_KEYS_TO_STRIP {
                section.remove(key);
            }
        }
    }
}

pub(crate) fn set(settings: &mut Settings, section: &str, key: &str, value: impl Into<SettingValue>) {
    settings
        .entry(section.to_string())
        .or_default()
        .insert(key.to_string(), value.into());
}

/// What the network list needs to know about a saved Wi-Fi profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SavedWifi {
    pub(crate) autoconnect: bool,
    pub(crate) hidden: bool,
}

/// Saved Wi-Fi profiles by SSID.
pub(crate) fn saved_wifi(connections: &[SavedConnection]) -> HashMap<String, SavedWifi> {
    connections
        .iter()
        .filter_map(|c| {
            let ssid = wifi_ssid(&c.settings)?;
            let hidden = setting(&c.settings, connection_type::WIRELESS, "hidden")
                .and_then(SettingValue::as_bool)
                .unwrap_or(false);
            Some((
                String::from_utf8_lossy(ssid).into_owned(),
                SavedWifi {
                    autoconnect: autoconnect(&c.settings),
                    hidden,
                },
            ))
        })
        .collect()
}
