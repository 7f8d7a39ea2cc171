//! Text and JSON rendering.

use serde::Serialize;

use nmctl::{NetworkState, VpnProfile, WifiNetwork, WiredConnection};

pub(crate) fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

pub(crate) fn state(s: &NetworkState, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        return json(s);
    }

    println!("status: {} (preference {})", s.status, s.preference);

    if !s.wifi_enabled {
        println!("wifi: off");
    } else if s.wifi_device.is_empty() {
        println!("wifi: no device");
    } else if s.wifi_connected {
        println!(
            "wifi: {} connected to {} ({}%) {}",
            s.wifi_device, s.wifi_ssid, s.wifi_signal, s.wifi_ip
        );
    } else {
        println!("wifi: {} disconnected", s.wifi_device);
    }

    if s.ethernet_device.is_empty() {
        println!("ethernet: no device");
    } else if s.ethernet_connected {
        println!("ethernet: {} connected {}", s.ethernet_device, s.ethernet_ip);
    } else {
        println!("ethernet: {} disconnected", s.ethernet_device);
    }

    for vpn in &s.vpn_active {
        println!("vpn: {} ({}) {}", vpn.name, vpn.state, vpn.ip);
    }
    if s.is_connecting {
        println!("connecting to {}...", s.connecting_ssid);
    }
    if s.is_connecting_vpn {
        println!("connecting VPN {}...", s.connecting_vpn_uuid);
    }
    if !s.last_error.is_empty() {
        println!("last error: {}", s.last_error);
    }
    Ok(())
}

pub(crate) fn networks(networks: &[WifiNetwork], as_json: bool) -> anyhow::Result<()> {
    if as_json {
        return json(networks);
    }
    println!("{:<32} {:>6} {:>5} {:<8} {:<6}", "SSID", "SIGNAL", "CHAN", "SECURED", "SAVED");
    for n in networks {
        let marker = if n.connected { "*" } else { " " };
        println!(
            "{marker}{:<31} {:>5}% {:>5} {:<8} {:<6}",
            n.ssid,
            n.signal,
            n.channel,
            yes_no(n.secured),
            yes_no(n.saved)
        );
    }
    Ok(())
}

pub(crate) fn wired_connections(conns: &[WiredConnection], as_json: bool) -> anyhow::Result<()> {
    if as_json {
        return json(conns);
    }
    for c in conns {
        let marker = if c.is_active { "*" } else { " " };
        println!("{marker}{:<32} {}", c.id, c.uuid);
    }
    Ok(())
}

pub(crate) fn vpn_profiles(profiles: &[VpnProfile], as_json: bool) -> anyhow::Result<()> {
    if as_json {
        return json(profiles);
    }
    for p in profiles {
        let kind = p
            .service_type
            .rsplit('.')
            .next()
            .filter(|k| !k.is_empty())
            .unwrap_or(&p.connection_type);
        println!("{:<24} {:<12} {} {}", p.name, kind, p.uuid, p.remote_host);
    }
    Ok(())
}
