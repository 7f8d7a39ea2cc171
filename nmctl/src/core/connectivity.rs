//! Overall connectivity status and whole-state refresh.

use log::warn;

use crate::api::models::{NetworkState, NetworkStatus};
use crate::core::Context;
use crate::core::{ethernet, vpn, wifi};
use crate::types::constants::{active_state, connection_type};

/// Derives the status. An active VPN wins; otherwise the primary
/// connection's medium; otherwise whichever medium is connected, Ethernet
/// first.
pub(crate) fn status_for(
    vpn_up: bool,
    primary_type: Option<&str>,
    ethernet_connected: bool,
    wifi_connected: bool,
) -> NetworkStatus {
    if vpn_up {
        return NetworkStatus::Vpn;
    }
    match primary_type {
        Some(connection_type::ETHERNET) => return NetworkStatus::Ethernet,
        Some(connection_type::WIRELESS) => return NetworkStatus::Wifi,
        _ => {}
    }
    if ethernet_connected {
        NetworkStatus::Ethernet
    } else if wifi_connected {
        NetworkStatus::Wifi
    } else {
        NetworkStatus::Disconnected
    }
}

/// Status from the published state alone, for when the primary connection
/// is not at hand.
pub(crate) fn status_of(s: &NetworkState) -> NetworkStatus {
    let vpn_up = s.vpn_active.iter().any(|v| v.state == "activated");
    status_for(vpn_up, None, s.ethernet_connected, s.wifi_connected)
}

/// Recomputes the status from the primary and active connections.
pub(crate) async fn refresh_primary(ctx: &Context) {
    let primary = ctx.bus.primary_connection().await.unwrap_or_else(|e| {
        warn!("Failed to read primary connection: {e}");
        None
    });
    let vpn_up = match ctx.bus.active_connections().await {
        Ok(active) => active.iter().any(|c| {
            matches!(
                c.connection_type.as_str(),
                connection_type::VPN | connection_type::WIREGUARD
            ) && c.state == active_state::ACTIVATED
        }),
        Err(e) => {
            warn!("Failed to list active connections: {e}");
            false
        }
    };

    let primary_type = primary.map(|p| p.connection_type);
    ctx.store.update(|s| {
        s.status = status_for(
            vpn_up,
            primary_type.as_deref(),
            s.ethernet_connected,
            s.wifi_connected,
        );
    });
}

/// Rebuilds every published field from the bus.
pub(crate) async fn refresh_all(ctx: &Context) {
    match ctx.bus.wireless_enabled().await {
        Ok(enabled) => ctx.store.update(|s| s.wifi_enabled = enabled),
        Err(e) => warn!("Failed to read WirelessEnabled: {e}"),
    }

    wifi::refresh_state(ctx).await;
    if ctx.registry.primary_wifi().is_some() {
        if let Err(e) = wifi::refresh_networks(ctx).await {
            warn!("Failed to refresh networks: {e}");
        }
    }
    wifi::refresh_devices(ctx).await;

    ethernet::refresh_state(ctx).await;
    ethernet::refresh_devices(ctx).await;
    ethernet::refresh_connections(ctx).await;

    refresh_primary(ctx).await;

    vpn::refresh_profiles(ctx).await;
    vpn::refresh_active(ctx).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::VpnActive;

    #[test]
    fn active_vpn_wins_over_everything() {
        assert_eq!(
            status_for(true, Some(connection_type::ETHERNET), true, true),
            NetworkStatus::Vpn
        );
    }

    #[test]
    fn primary_connection_decides_between_media() {
        assert_eq!(
            status_for(false, Some(connection_type::WIRELESS), true, true),
            NetworkStatus::Wifi
        );
        assert_eq!(
            status_for(false, Some(connection_type::ETHERNET), false, true),
            NetworkStatus::Ethernet
        );
    }

    #[test]
    fn without_primary_ethernet_beats_wifi() {
        assert_eq!(status_for(false, None, true, true), NetworkStatus::Ethernet);
        assert_eq!(status_for(false, Some("vpn"), false, true), NetworkStatus::Wifi);
        assert_eq!(status_for(false, None, false, false), NetworkStatus::Disconnected);
    }

    #[test]
    fn status_of_ignores_activating_vpns() {
        let mut s = NetworkState {
            wifi_connected: true,
            vpn_active: vec![VpnActive {
                state: "activating".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(status_of(&s), NetworkStatus::Wifi);
        s.vpn_active[0].state = "activated".into();
        assert_eq!(status_of(&s), NetworkStatus::Vpn);
    }
}
