//! Wi-Fi controller.
//!
//! Scanning, connecting, forgetting and the network list. The list holds one
//! entry per SSID: access points broadcasting the same SSID are merged and
//! the strongest one supplies signal, frequency, channel and BSSID.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::Result;
use crate::api::builders::wifi::{WifiConnectionBuilder, classify_security};
use crate::api::models::{
    ConnectionError, ConnectionRequest, DeviceState, NetworkBand, NetworkDetails, NetworkState,
    WifiDevice, WifiNetwork,
};
use crate::core::Context;
use crate::core::connectivity;
use crate::core::registry::WifiEntry;
use crate::core::settings::{self, SavedWifi};
use crate::dbus::bus::AccessPoint;
use crate::types::constants::device_state;
use crate::types::security::ApSecurityFlags;
use crate::util::utils::{channel, mode_name, signal_bars, ssid_text};

/// SSIDs whose last connection attempt failed, and when.
#[derive(Debug, Default)]
pub(crate) struct RecentFailures {
    at: Mutex<HashMap<String, Instant>>,
}

impl RecentFailures {
    pub(crate) fn record(&self, ssid: &str) {
        self.at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ssid.to_string(), Instant::now());
    }

    pub(crate) fn was_recent(&self, ssid: &str, window: Duration) -> bool {
        self.at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ssid)
            .is_some_and(|t| t.elapsed() < window)
    }
}

/// Whether the in-flight attempt has been seen moving through activation.
///
/// A device that is `DISCONNECTED` or associated elsewhere right after
/// `connect` has not started yet. Once activation was observed, the same
/// states mean the attempt is over.
#[derive(Debug, Default)]
pub(crate) struct AttemptProgress {
    started: AtomicBool,
}

impl AttemptProgress {
    pub(crate) fn begin(&self) {
        self.started.store(false, Ordering::Relaxed);
    }

    /// Records `state` and returns whether activation has been observed.
    pub(crate) fn observe(&self, state: u32) -> bool {
        if is_activating(state) {
            self.started.store(true, Ordering::Relaxed);
        }
        self.started.load(Ordering::Relaxed)
    }
}

fn is_activating(state: u32) -> bool {
    (device_state::PREPARE..=device_state::SECONDARIES).contains(&state)
}

/// The access point a device is associated with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Association {
    pub(crate) ssid: String,
    pub(crate) bssid: String,
    pub(crate) signal: u8,
}

fn is_secured(ap: &AccessPoint) -> bool {
    ap.flags != 0 || ap.wpa_flags != 0 || ap.rsn_flags != 0
}

fn network_from_ap(
    ssid: String,
    ap: &AccessPoint,
    saved: Option<&SavedWifi>,
    connected: bool,
    device: &str,
) -> WifiNetwork {
    WifiNetwork {
        ssid,
        bssid: ap.bssid.clone(),
        signal: ap.strength,
        secured: is_secured(ap),
        enterprise: ApSecurityFlags::from_ap(ap.wpa_flags, ap.rsn_flags).enterprise(),
        connected,
        saved: saved.is_some(),
        autoconnect: saved.is_some_and(|s| s.autoconnect),
        hidden: saved.is_some_and(|s| s.hidden),
        frequency: ap.frequency,
        mode: mode_name(ap.mode).to_string(),
        rate: ap.max_bitrate / 1000,
        channel: channel(ap.frequency),
        device: device.to_string(),
    }
}

/// Builds the published network list from a scan.
///
/// Access points without an SSID are skipped. If `current` is not among the
/// scanned SSIDs a hidden entry is appended for it.
pub(crate) fn build_network_list(
    aps: &[AccessPoint],
    saved: &HashMap<String, SavedWifi>,
    current: Option<&Association>,
    device: &str,
) -> Vec<WifiNetwork> {
    let mut networks: Vec<WifiNetwork> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for ap in aps {
        let ssid = ssid_text(&ap.ssid);
        if ssid.is_empty() {
            continue;
        }

        if let Some(&i) = index.get(&*ssid) {
            let existing = &mut networks[i];
            if ap.strength > existing.signal {
                existing.signal = ap.strength;
                existing.frequency = ap.frequency;
                existing.channel = channel(ap.frequency);
                existing.bssid = ap.bssid.clone();
            }
            continue;
        }

        let ssid = ssid.into_owned();
        let connected = current.is_some_and(|c| c.ssid == ssid);
        let network = network_from_ap(ssid.clone(), ap, saved.get(&ssid), connected, device);
        index.insert(ssid, networks.len());
        networks.push(network);
    }

    if let Some(current) = current.filter(|c| !c.ssid.is_empty()) {
        if !index.contains_key(&current.ssid) {
            let entry = saved.get(&current.ssid);
            networks.push(WifiNetwork {
                ssid: current.ssid.clone(),
                bssid: current.bssid.clone(),
                signal: current.signal,
                secured: true,
                connected: true,
                saved: entry.is_some(),
                autoconnect: entry.is_some_and(|s| s.autoconnect),
                hidden: true,
                mode: "infrastructure".to_string(),
                device: device.to_string(),
                ..Default::default()
            });
        }
    }

    sort_networks(&mut networks);
    networks
}

/// Connected first, then saved, then strongest, then by SSID.
pub(crate) fn sort_networks(networks: &mut [WifiNetwork]) {
    networks.sort_by(|a, b| {
        b.connected
            .cmp(&a.connected)
            .then(b.saved.cmp(&a.saved))
            .then(b.signal.cmp(&a.signal))
            .then_with(|| a.ssid.cmp(&b.ssid))
    });
}

/// Settles an in-flight attempt on `device` given its new state. Returns
/// the SSID of an attempt that just failed.
///
/// `started` says whether activation of this attempt was observed; until
/// then `DISCONNECTED` and an association with another network are the
/// device's state from before the attempt.
fn settle_attempt(
    s: &mut NetworkState,
    device: &str,
    state: u32,
    associated: &str,
    started: bool,
) -> Option<String> {
    if !s.is_connecting {
        return None;
    }
    if !s.connecting_device.is_empty() && s.connecting_device != device {
        return None;
    }
    let failed = match state {
        device_state::ACTIVATED if associated == s.connecting_ssid => {
            debug!("Connected to {associated}");
            s.is_connecting = false;
            s.connecting_ssid.clear();
            s.connecting_device.clear();
            s.last_error.clear();
            return None;
        }
        device_state::FAILED => true,
        device_state::ACTIVATED => started && !associated.is_empty(),
        device_state::DISCONNECTED => started,
        _ => false,
    };
    if !failed {
        return None;
    }

    let ssid = std::mem::take(&mut s.connecting_ssid);
    warn!("Connection to {ssid} failed");
    s.is_connecting = false;
    s.connecting_device.clear();
    s.last_error = format!("failed to connect to {ssid}");
    Some(ssid)
}

/// Whether an attempt, if one is running, is on `device`. Attempts without
/// an explicit device run on the primary.
fn is_attempt_target(ctx: &Context, device: &str) -> bool {
    let requested = ctx.store.read(|s| s.connecting_device.clone());
    if requested.is_empty() {
        ctx.registry.primary_wifi().is_some_and(|p| p.name == device)
    } else {
        requested == device
    }
}

/// Settles the attempt from a `State` value carried by a device signal.
///
/// NetworkManager leaves `FAILED` for `DISCONNECTED` almost at once, so the
/// signalled value is used instead of a re-read. `ACTIVATED` still needs the
/// associated SSID and is left to [`refresh_state`].
pub(crate) fn on_device_state(ctx: &Context, path: &str, state: u32) {
    let Some(entry) = ctx.registry.wifi_devices().into_iter().find(|e| e.path == path) else {
        return;
    };
    if !is_attempt_target(ctx, &entry.name) {
        return;
    }
    let started = ctx.attempt.observe(state);
    if state == device_state::ACTIVATED {
        return;
    }

    let failed = ctx
        .store
        .update(|s| settle_attempt(s, &entry.name, state, "", started));
    if let Some(ssid) = failed {
        ctx.failures.record(&ssid);
        ctx.notify();
    }
}

async fn association(entry: &WifiEntry) -> Option<Association> {
    let ap = crate::try_log!(
        entry.device.active_access_point().await,
        "Failed to read active access point"
    )?;
    Some(Association {
        ssid: ssid_text(&ap.ssid).into_owned(),
        bssid: ap.bssid,
        signal: ap.strength,
    })
}

async fn device_state_of(entry: &WifiEntry) -> u32 {
    entry.device.state().await.unwrap_or_else(|e| {
        warn!("Failed to read state of {}: {e}", entry.name);
        device_state::UNAVAILABLE
    })
}

async fn ip_of(entry: &WifiEntry) -> String {
    match entry.device.ip4().await {
        Ok(ip) => ip.map(|i| i.address).unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read IP of {}: {e}", entry.name);
            String::new()
        }
    }
}

/// Recomputes the live Wi-Fi fields from the primary device.
pub(crate) async fn refresh_state(ctx: &Context) {
    let Some(entry) = ctx.registry.primary_wifi() else {
        ctx.store.update(|s| {
            s.wifi_device.clear();
            s.wifi_connected = false;
            s.wifi_ssid.clear();
            s.wifi_bssid.clear();
            s.wifi_signal = 0;
            s.wifi_ip.clear();
            s.wifi_networks.clear();
        });
        return;
    };

    let state = device_state_of(&entry).await;
    let connected = state == device_state::ACTIVATED;
    let (assoc, ip) = if connected {
        (association(&entry).await.unwrap_or_default(), ip_of(&entry).await)
    } else {
        (Association::default(), String::new())
    };
    let started = is_attempt_target(ctx, &entry.name) && ctx.attempt.observe(state);

    let failed = ctx.store.update(|s| {
        s.wifi_device = entry.name.clone();
        s.wifi_connected = connected;
        s.wifi_ssid = assoc.ssid.clone();
        s.wifi_bssid = assoc.bssid.clone();
        s.wifi_signal = assoc.signal;
        s.wifi_ip = ip;
        settle_attempt(s, &entry.name, state, &assoc.ssid, started)
    });
    if let Some(ssid) = failed {
        ctx.failures.record(&ssid);
    }
}

/// Rebuilds the primary device's network list.
pub(crate) async fn refresh_networks(ctx: &Context) -> Result<()> {
    let entry = ctx.registry.primary_wifi().ok_or(ConnectionError::NoWifiDevice)?;
    let aps = entry.device.access_points().await?;
    let saved = settings::saved_wifi(&ctx.bus.list_connections().await?);
    let current = ctx.store.read(|s| {
        s.wifi_connected.then(|| Association {
            ssid: s.wifi_ssid.clone(),
            bssid: s.wifi_bssid.clone(),
            signal: s.wifi_signal,
        })
    });

    let networks = build_network_list(&aps, &saved, current.as_ref(), "");
    ctx.store.update(|s| s.wifi_networks = networks);
    Ok(())
}

/// Rebuilds the per-device list.
pub(crate) async fn refresh_devices(ctx: &Context) {
    let saved = match ctx.bus.list_connections().await {
        Ok(conns) => settings::saved_wifi(&conns),
        Err(e) => {
            warn!("Failed to list saved connections: {e}");
            HashMap::new()
        }
    };

    let mut devices = Vec::new();
    let mut states = Vec::new();
    for entry in ctx.registry.wifi_devices() {
        let state = device_state_of(&entry).await;
        let connected = state == device_state::ACTIVATED;
        let (assoc, ip) = if connected {
            (association(&entry).await.unwrap_or_default(), ip_of(&entry).await)
        } else {
            (Association::default(), String::new())
        };

        let networks = match entry.device.access_points().await {
            Ok(aps) => {
                let current = connected.then_some(&assoc);
                build_network_list(&aps, &saved, current, &entry.name)
            }
            Err(e) => {
                warn!("Failed to list access points on {}: {e}", entry.name);
                Vec::new()
            }
        };

        states.push((entry.name.clone(), state, assoc.ssid.clone()));
        devices.push(WifiDevice {
            name: entry.name.clone(),
            hw_address: entry.hw_address.clone(),
            state: DeviceState::from(state).link_state().to_string(),
            connected,
            ssid: assoc.ssid,
            bssid: assoc.bssid,
            signal: assoc.signal,
            ip,
            networks,
        });
    }

    // Only explicit-device attempts settle here; the primary's is handled
    // by refresh_state.
    let target = ctx.store.read(|s| s.connecting_device.clone());
    let started = states
        .iter()
        .find(|(name, _, _)| *name == target)
        .is_some_and(|(_, state, _)| ctx.attempt.observe(*state));

    let failed = ctx.store.update(|s| {
        s.wifi_devices = devices;
        let mut failed = Vec::new();
        for (name, state, ssid) in &states {
            if *name == s.connecting_device {
                failed.extend(settle_attempt(s, name, *state, ssid, started));
            }
        }
        failed
    });
    for ssid in failed {
        ctx.failures.record(&ssid);
    }
}

fn resolve_device(ctx: &Context, name: Option<&str>) -> Result<WifiEntry> {
    match name.filter(|n| !n.is_empty()) {
        Some(name) => ctx
            .registry
            .wifi(name)
            .ok_or_else(|| ConnectionError::DeviceNotFound(name.to_string())),
        None => ctx.registry.primary_wifi().ok_or(ConnectionError::NoWifiDevice),
    }
}

/// Requests a scan on `device` (or the primary device) and refreshes the
/// network lists.
pub(crate) async fn scan(ctx: &Context, device: Option<&str>) -> Result<()> {
    let entry = resolve_device(ctx, device)?;
    if !ctx.store.read(|s| s.wifi_enabled) {
        return Err(ConnectionError::WifiDisabled);
    }

    entry.device.request_scan().await?;
    debug!("Scan requested on {}", entry.name);

    if ctx.registry.primary_wifi().is_some_and(|p| p.name == entry.name) {
        refresh_networks(ctx).await?;
    }
    refresh_devices(ctx).await;
    ctx.notify();
    Ok(())
}

/// Joins the network described by `req`.
pub(crate) async fn connect(ctx: &Context, req: &ConnectionRequest) -> Result<()> {
    let device = req.device.as_deref().filter(|d| !d.is_empty());
    let entry = resolve_device(ctx, device)?;

    let already = ctx
        .store
        .read(|s| s.wifi_connected && s.wifi_ssid == req.ssid);
    if already && !req.interactive && device.is_none() {
        debug!("Already connected to {}", req.ssid);
        return Ok(());
    }

    ctx.attempt.begin();
    ctx.store.update(|s| {
        s.is_connecting = true;
        s.connecting_ssid = req.ssid.clone();
        s.connecting_device = device.unwrap_or_default().to_string();
        s.last_error.clear();
    });
    ctx.notify();

    let connections = ctx.bus.list_connections().await.unwrap_or_else(|e| {
        warn!("Failed to list saved connections: {e}");
        Vec::new()
    });

    if let Some(existing) = settings::find_wifi(&connections, &req.ssid) {
        info!("Activating saved profile for {}", req.ssid);
        if let Err(e) = ctx.bus.activate(&existing.path, Some(entry.path.as_str()), None).await {
            warn!("Failed to activate existing connection: {e}");
            let err = ConnectionError::ActivationFailed(e.to_string());
            ctx.fail_wifi_attempt(&err.to_string());
            return Err(err);
        }
        return Ok(());
    }

    if let Err(e) = create_and_connect(ctx, req, &entry).await {
        warn!("Failed to create and connect: {e}");
        ctx.fail_wifi_attempt(&e.to_string());
        return Err(e);
    }
    Ok(())
}

async fn create_and_connect(ctx: &Context, req: &ConnectionRequest, entry: &WifiEntry) -> Result<()> {
    let ap = if req.hidden {
        None
    } else {
        let aps = entry.device.access_points().await?;
        let ap = aps
            .into_iter()
            .find(|ap| ap.ssid == req.ssid.as_bytes())
            .ok_or_else(|| ConnectionError::AccessPointNotFound(req.ssid.clone()))?;
        Some(ap)
    };

    let kind = classify_security(req, ap.as_ref())?;
    let settings = WifiConnectionBuilder::new(req).security(kind).build();
    let specific = ap.as_ref().map(|a| a.path.as_str());

    if req.interactive {
        // Secrets are left out; NetworkManager asks for them on activation.
        let path = ctx.bus.add_connection(&settings).await?;
        ctx.bus
            .activate(&path, Some(entry.path.as_str()), specific)
            .await
            .map_err(|e| ConnectionError::ActivationFailed(e.to_string()))?;
    } else {
        ctx.bus
            .add_and_activate(&settings, &entry.path, specific)
            .await?;
    }

    info!(
        "Activation of {} ({kind:?}) started on {}",
        req.ssid, entry.name
    );
    Ok(())
}

pub(crate) async fn disconnect(ctx: &Context, device: Option<&str>) -> Result<()> {
    let entry = resolve_device(ctx, device)?;
    entry.device.disconnect().await?;

    refresh_state(ctx).await;
    refresh_devices(ctx).await;
    connectivity::refresh_primary(ctx).await;
    ctx.notify();
    Ok(())
}

/// Deletes the saved profile for `ssid`.
pub(crate) async fn forget(ctx: &Context, ssid: &str) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let profile = settings::find_wifi(&connections, ssid)
        .ok_or_else(|| ConnectionError::ConnectionNotFound(ssid.to_string()))?;
    ctx.bus.delete_connection(&profile.path).await?;
    info!("Forgot {ssid}");

    ctx.store.update(|s| {
        if s.wifi_connected && s.wifi_ssid == ssid {
            s.wifi_connected = false;
            s.wifi_ssid.clear();
            s.wifi_bssid.clear();
            s.wifi_signal = 0;
            s.wifi_ip.clear();
            s.status = connectivity::status_of(s);
        }
    });

    if let Err(e) = refresh_networks(ctx).await {
        warn!("Failed to refresh networks: {e}");
    }
    ctx.notify();
    Ok(())
}

pub(crate) async fn set_autoconnect(ctx: &Context, ssid: &str, autoconnect: bool) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let profile = settings::find_wifi(&connections, ssid)
        .ok_or_else(|| ConnectionError::ConnectionNotFound(ssid.to_string()))?;

    let mut updated = profile.settings.clone();
    settings::set(&mut updated, "connection", "autoconnect", autoconnect);
    settings::strip_ip_keys(&mut updated);
    ctx.bus.update_connection(&profile.path, &updated).await?;

    if let Err(e) = refresh_networks(ctx).await {
        warn!("Failed to refresh networks: {e}");
    }
    ctx.notify();
    Ok(())
}

pub(crate) async fn set_enabled(ctx: &Context, enabled: bool) -> Result<()> {
    ctx.bus.set_wireless_enabled(enabled).await?;
    ctx.store.update(|s| s.wifi_enabled = enabled);
    ctx.notify();
    Ok(())
}

/// Every access point broadcasting `ssid`, connected first, then strongest.
pub(crate) async fn network_details(ctx: &Context, ssid: &str) -> Result<NetworkDetails> {
    let entry = ctx.registry.primary_wifi().ok_or(ConnectionError::NoWifiDevice)?;
    let aps = entry.device.access_points().await?;
    let saved = settings::saved_wifi(&ctx.bus.list_connections().await?);
    let (current_ssid, current_bssid) =
        ctx.store.read(|s| (s.wifi_ssid.clone(), s.wifi_bssid.clone()));

    let mut bands: Vec<NetworkBand> = aps
        .iter()
        .filter(|ap| ap.ssid == ssid.as_bytes())
        .map(|ap| NetworkBand {
            bssid: ap.bssid.clone(),
            signal: ap.strength,
            bars: signal_bars(ap.strength).to_string(),
            channel: channel(ap.frequency),
            frequency: ap.frequency,
            mode: mode_name(ap.mode).to_string(),
            rate: ap.max_bitrate / 1000,
            secured: is_secured(ap),
            enterprise: ApSecurityFlags::from_ap(ap.wpa_flags, ap.rsn_flags).enterprise(),
            saved: saved.contains_key(ssid),
            connected: ssid == current_ssid && ap.bssid == current_bssid,
            device: entry.name.clone(),
        })
        .collect();

    if bands.is_empty() {
        return Err(ConnectionError::NetworkNotFound(ssid.to_string()));
    }
    bands.sort_by(|a, b| b.connected.cmp(&a.connected).then(b.signal.cmp(&a.signal)));

    Ok(NetworkDetails {
        ssid: ssid.to_string(),
        bands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ap(ssid: &str, strength: u8, frequency: u32, bssid: &str) -> AccessPoint {
        AccessPoint {
            path: format!("/ap/{bssid}"),
            ssid: ssid.as_bytes().to_vec(),
            bssid: bssid.into(),
            strength,
            frequency,
            max_bitrate: 54_000,
            mode: 2,
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_ssids_keep_the_strongest_access_point() {
        let aps = [
            ap("X", 40, 2412, "aa:aa"),
            ap("X", 70, 5180, "bb:bb"),
            ap("Y", 55, 2437, "cc:cc"),
        ];
        let list = build_network_list(&aps, &HashMap::new(), None, "");

        let xs: Vec<_> = list.iter().filter(|n| n.ssid == "X").collect();
        assert_eq!(xs.len(), 1);
        assert_eq!(xs[0].signal, 70);
        assert_eq!(xs[0].bssid, "bb:bb");
        assert_eq!(xs[0].frequency, 5180);
        assert_eq!(xs[0].channel, 36);
        assert_eq!(xs[0].rate, 54);
    }

    #[test]
    fn empty_ssids_are_skipped() {
        let aps = [ap("", 90, 2412, "aa"), ap("Home", 30, 2412, "bb")];
        let list = build_network_list(&aps, &HashMap::new(), None, "");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ssid, "Home");
    }

    #[test]
    fn associated_ssid_missing_from_scan_gets_hidden_entry() {
        let current = Association {
            ssid: "Stealth".into(),
            bssid: "dd:dd".into(),
            signal: 61,
        };
        let list = build_network_list(&[ap("Other", 80, 2412, "aa")], &HashMap::new(), Some(&current), "wlan0");

        assert_eq!(list[0].ssid, "Stealth");
        assert!(list[0].hidden && list[0].connected && list[0].secured);
        assert_eq!(list[0].signal, 61);
        assert_eq!(list[0].device, "wlan0");
    }

    #[test]
    fn ordering_is_connected_saved_signal_then_name() {
        let mut saved = HashMap::new();
        saved.insert(
            "Saved".to_string(),
            SavedWifi {
                autoconnect: true,
                hidden: false,
            },
        );
        let current = Association {
            ssid: "Current".into(),
            ..Default::default()
        };
        let aps = [
            ap("Beta", 50, 2412, "1"),
            ap("Alpha", 50, 2412, "2"),
            ap("Strong", 99, 2412, "3"),
            ap("Saved", 10, 2412, "4"),
            ap("Current", 5, 2412, "5"),
        ];
        let list = build_network_list(&aps, &saved, Some(&current), "");
        let order: Vec<_> = list.iter().map(|n| n.ssid.as_str()).collect();
        assert_eq!(order, ["Current", "Saved", "Strong", "Alpha", "Beta"]);
        assert!(list[1].autoconnect);
        assert!(!list[2].autoconnect);
    }

    #[test]
    fn enterprise_flag_comes_from_key_management() {
        let mut eap = ap("Corp", 50, 2412, "1");
        eap.rsn_flags = 0x200;
        let list = build_network_list(&[eap], &HashMap::new(), None, "");
        assert!(list[0].secured);
        assert!(list[0].enterprise);
    }

    #[test]
    fn attempt_settles_on_activation_or_failure() {
        let mut s = NetworkState {
            is_connecting: true,
            connecting_ssid: "Home".into(),
            last_error: "old".into(),
            ..Default::default()
        };
        assert_eq!(settle_attempt(&mut s, "wlan0", device_state::CONFIG, "", false), None);
        assert!(s.is_connecting);
        assert_eq!(settle_attempt(&mut s, "wlan0", device_state::ACTIVATED, "Home", true), None);
        assert!(!s.is_connecting);
        assert!(s.last_error.is_empty());

        s.is_connecting = true;
        s.connecting_ssid = "Home".into();
        assert_eq!(
            settle_attempt(&mut s, "wlan0", device_state::FAILED, "", false),
            Some("Home".to_string())
        );
        assert!(!s.is_connecting);
        assert!(s.connecting_ssid.is_empty());
        assert!(!s.last_error.is_empty());
    }

    #[test]
    fn disconnect_or_other_network_ends_a_started_attempt() {
        let connecting = || NetworkState {
            is_connecting: true,
            connecting_ssid: "Home".into(),
            ..Default::default()
        };

        let mut s = connecting();
        assert_eq!(settle_attempt(&mut s, "wlan0", device_state::DISCONNECTED, "", false), None);
        assert_eq!(settle_attempt(&mut s, "wlan0", device_state::ACTIVATED, "Cafe", false), None);
        assert!(s.is_connecting);

        assert_eq!(
            settle_attempt(&mut s, "wlan0", device_state::DISCONNECTED, "", true),
            Some("Home".to_string())
        );
        assert!(!s.is_connecting);
        assert_eq!(s.last_error, "failed to connect to Home");

        let mut s = connecting();
        assert_eq!(
            settle_attempt(&mut s, "wlan0", device_state::ACTIVATED, "Cafe", true),
            Some("Home".to_string())
        );
        assert!(!s.is_connecting);
    }

    #[test]
    fn progress_starts_with_activation_states() {
        let progress = AttemptProgress::default();
        progress.begin();
        assert!(!progress.observe(device_state::DISCONNECTED));
        assert!(progress.observe(device_state::CONFIG));
        assert!(progress.observe(device_state::DISCONNECTED));
        progress.begin();
        assert!(!progress.observe(device_state::DEACTIVATING));
    }

    #[test]
    fn attempt_on_another_device_is_left_alone() {
        let mut s = NetworkState {
            is_connecting: true,
            connecting_ssid: "Home".into(),
            connecting_device: "wlan1".into(),
            ..Default::default()
        };
        assert_eq!(settle_attempt(&mut s, "wlan0", device_state::FAILED, "", false), None);
        assert!(s.is_connecting);
    }

    #[test]
    fn recent_failures_expire() {
        let failures = RecentFailures::default();
        failures.record("Home");
        assert!(failures.was_recent("Home", Duration::from_secs(10)));
        assert!(!failures.was_recent("Home", Duration::ZERO));
        assert!(!failures.was_recent("Cafe", Duration::from_secs(10)));
    }
}
