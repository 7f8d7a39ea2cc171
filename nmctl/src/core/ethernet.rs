//! Ethernet controller.

use log::{debug, info, warn};

use crate::Result;
use crate::api::builders::build_ethernet_connection;
use crate::api::models::{
    ConnectionError, DeviceState, EthernetDevice, WiredConnection, WiredIpConfig,
    WiredNetworkDetails,
};
use crate::core::Context;
use crate::core::connectivity;
use crate::core::registry::WiredEntry;
use crate::core::settings;
use crate::dbus::bus::IpInfo;
use crate::dbus::values::setting_str;
use crate::types::constants::{connection_type, device_state};

const DEFAULT_PROFILE_NAME: &str = "Wired connection";

fn ip_list(ip: Option<&IpInfo>) -> WiredIpConfig {
    match ip {
        Some(ip) if !ip.address.is_empty() => WiredIpConfig {
            ips: vec![format!("{}/{}", ip.address, ip.prefix)],
            gateway: ip.gateway.clone(),
        },
        Some(ip) => WiredIpConfig {
            ips: Vec::new(),
            gateway: ip.gateway.clone(),
        },
        None => WiredIpConfig::default(),
    }
}

async fn ip_address(entry: &WiredEntry) -> String {
    match entry.device.ip4().await {
        Ok(ip) => ip.map(|i| i.address).unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read IP of {}: {e}", entry.name);
            String::new()
        }
    }
}

/// Recomputes the live Ethernet fields from the primary wired device.
pub(crate) async fn refresh_state(ctx: &Context) {
    let Some(entry) = ctx.registry.primary_wired() else {
        ctx.store.update(|s| {
            s.ethernet_device.clear();
            s.ethernet_connected = false;
            s.ethernet_ip.clear();
            s.ethernet_connection_uuid.clear();
        });
        return;
    };

    let state = entry.device.state().await.unwrap_or_else(|e| {
        warn!("Failed to read state of {}: {e}", entry.name);
        device_state::UNAVAILABLE
    });
    let connected = state == device_state::ACTIVATED;
    let ip = if connected {
        ip_address(&entry).await
    } else {
        String::new()
    };

    let uuid = match ctx.bus.active_connections().await {
        Ok(active) => active
            .into_iter()
            .find(|c| c.device == entry.name && c.connection_type == connection_type::ETHERNET)
            .map(|c| c.uuid)
            .unwrap_or_default(),
        Err(e) => {
            warn!("Failed to list active connections: {e}");
            String::new()
        }
    };

    ctx.store.update(|s| {
        s.ethernet_device = entry.name.clone();
        s.ethernet_connected = connected;
        s.ethernet_ip = ip;
        s.ethernet_connection_uuid = uuid;
    });
}

pub(crate) async fn refresh_devices(ctx: &Context) {
    let mut devices = Vec::new();
    for entry in ctx.registry.wired_devices() {
        let state = entry.device.state().await.unwrap_or(device_state::UNAVAILABLE);
        let connected = state == device_state::ACTIVATED;
        let ip = if connected {
            ip_address(&entry).await
        } else {
            String::new()
        };

        devices.push(EthernetDevice {
            name: entry.name.clone(),
            hw_address: entry.hw_address.clone(),
            state: DeviceState::from(state).link_state().to_string(),
            connected,
            ip,
            speed: entry.device.speed().await.unwrap_or(0),
            driver: entry.device.driver().await.unwrap_or_default(),
        });
    }
    ctx.store.update(|s| s.ethernet_devices = devices);
}

/// Rebuilds the list of saved wired profiles.
pub(crate) async fn refresh_connections(ctx: &Context) {
    let connections = match ctx.bus.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to list saved connections: {e}");
            return;
        }
    };
    let active: Vec<String> = ctx
        .bus
        .active_connections()
        .await
        .map(|a| a.into_iter().map(|c| c.uuid).collect())
        .unwrap_or_default();

    let mut wired: Vec<WiredConnection> = connections
        .iter()
        .filter(|c| settings::conn_type(&c.settings) == connection_type::ETHERNET)
        .map(|c| {
            let uuid = settings::conn_uuid(&c.settings).to_string();
            WiredConnection {
                path: c.path.clone(),
                id: settings::conn_id(&c.settings).to_string(),
                autoconnect: settings::autoconnect(&c.settings),
                is_active: active.contains(&uuid),
                uuid,
                connection_type: connection_type::ETHERNET.to_string(),
            }
        })
        .collect();
    wired.sort_by(|a, b| a.id.cmp(&b.id));

    ctx.store.update(|s| s.wired_connections = wired);
}

fn primary(ctx: &Context) -> Result<WiredEntry> {
    ctx.registry.primary_wired().ok_or(ConnectionError::NoWiredDevice)
}

/// Brings up the primary wired device, with its first saved profile or a
/// new DHCP one.
pub(crate) async fn connect(ctx: &Context) -> Result<()> {
    let entry = primary(ctx)?;
    let connections = ctx.bus.list_connections().await?;

    let existing = connections
        .iter()
        .find(|c| settings::conn_type(&c.settings) == connection_type::ETHERNET);

    match existing {
        Some(profile) => {
            debug!(
                "Activating wired profile {} on {}",
                settings::conn_id(&profile.settings),
                entry.name
            );
            ctx.bus
                .activate(&profile.path, Some(entry.path.as_str()), None)
                .await
                .map_err(|e| ConnectionError::ActivationFailed(e.to_string()))?;
        }
        None => {
            info!("No wired profile saved, creating one for {}", entry.name);
            let settings = build_ethernet_connection(DEFAULT_PROFILE_NAME, &entry.name);
            ctx.bus.add_and_activate(&settings, &entry.path, None).await?;
        }
    }

    after_change(ctx).await;
    Ok(())
}

/// Activates the wired profile `uuid` on the primary wired device.
pub(crate) async fn connect_profile(ctx: &Context, uuid: &str) -> Result<()> {
    let entry = primary(ctx)?;
    let connections = ctx.bus.list_connections().await?;
    let profile = settings::find_uuid(&connections, uuid)
        .filter(|c| settings::conn_type(&c.settings) == connection_type::ETHERNET)
        .ok_or_else(|| ConnectionError::ConnectionNotFound(uuid.to_string()))?;

    ctx.bus
        .activate(&profile.path, Some(entry.path.as_str()), None)
        .await
        .map_err(|e| ConnectionError::ActivationFailed(e.to_string()))?;

    after_change(ctx).await;
    Ok(())
}

pub(crate) async fn disconnect(ctx: &Context) -> Result<()> {
    let entry = primary(ctx)?;
    entry.device.disconnect().await?;
    after_change(ctx).await;
    Ok(())
}

async fn after_change(ctx: &Context) {
    refresh_state(ctx).await;
    refresh_devices(ctx).await;
    refresh_connections(ctx).await;
    connectivity::refresh_primary(ctx).await;
    ctx.notify();
}

/// Live details of the device a wired profile is bound to.
///
/// The device is the profile's `interface-name`, else the one carrying it
/// right now, else the primary wired device.
pub(crate) async fn details(ctx: &Context, uuid: &str) -> Result<WiredNetworkDetails> {
    let connections = ctx.bus.list_connections().await?;
    let profile = settings::find_uuid(&connections, uuid)
        .ok_or_else(|| ConnectionError::ConnectionNotFound(uuid.to_string()))?;

    let bound = setting_str(&profile.settings, "connection", "interface-name");
    let carrying = ctx
        .bus
        .active_connections()
        .await?
        .into_iter()
        .find(|c| c.uuid == uuid)
        .map(|c| c.device);

    let entry = if !bound.is_empty() {
        ctx.registry.wired(bound)
    } else {
        carrying
            .as_deref()
            .and_then(|name| ctx.registry.wired(name))
    }
    .or_else(|| ctx.registry.primary_wired())
    .ok_or(ConnectionError::NoWiredDevice)?;

    let device = &entry.device;
    Ok(WiredNetworkDetails {
        uuid: uuid.to_string(),
        iface: entry.name.clone(),
        driver: device.driver().await.unwrap_or_default(),
        hw_addr: entry.hw_address.clone(),
        carrier: device.carrier().await.unwrap_or(false),
        speed: format!("{} Mb/s", device.speed().await.unwrap_or(0)),
        ipv4: ip_list(device.ip4().await?.as_ref()),
        ipv6: ip_list(device.ip6().await?.as_ref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_list_formats_address_with_prefix() {
        let cfg = ip_list(Some(&IpInfo {
            address: "192.168.1.20".into(),
            prefix: 24,
            gateway: "192.168.1.1".into(),
        }));
        assert_eq!(cfg.ips, ["192.168.1.20/24"]);
        assert_eq!(cfg.gateway, "192.168.1.1");
    }

    #[test]
    fn ip_list_without_config_is_empty() {
        assert_eq!(ip_list(None), WiredIpConfig::default());
    }
}
