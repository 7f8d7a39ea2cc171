//! In-memory NetworkManager for driving a `Manager` end to end.
//!
//! `FakeBus` keeps devices, saved profiles and active connections in plain
//! collections and records every mutating call. `FakeRunner` records `nmcli`
//! invocations and answers with canned output.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nmctl::types::constants::{active_state, device_state, device_type};
use nmctl::{
    AccessPoint, ActiveConnection, BusSignal, CommandOutput, CommandRunner, ConnectionError,
    DeviceControl, DeviceHandle, DeviceProbe, IpInfo, Manager, ManagerConfig, NetworkBus,
    SavedConnection, SettingValue, Settings, SignalSink, Subscription, WiredDevice,
    WirelessDevice,
};

pub type Result<T> = nmctl::Result<T>;

pub fn settings(sections: &[(&str, Vec<(&str, SettingValue)>)]) -> Settings {
    sections
        .iter()
        .map(|(name, keys)| {
            let keys = keys
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>();
            (name.to_string(), keys)
        })
        .collect()
}

pub fn str_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn ap(ssid: &str, bssid: &str, strength: u8, frequency: u32) -> AccessPoint {
    AccessPoint {
        path: format!("/org/freedesktop/NetworkManager/AccessPoint/{bssid}"),
        ssid: ssid.as_bytes().to_vec(),
        bssid: bssid.to_string(),
        strength,
        frequency,
        max_bitrate: 54_000,
        mode: 2,
        ..Default::default()
    }
}

/// Test config: short debounce, fast VPN settle.
pub fn config() -> ManagerConfig {
    ManagerConfig::new()
        .with_debounce(Duration::from_millis(20))
        .with_vpn_settle(Duration::from_millis(500), Duration::from_millis(10))
        .with_prompt_timeout(Duration::from_secs(5))
        .with_plugin_dirs(Vec::<std::path::PathBuf>::new())
}

pub async fn manager(bus: &Arc<FakeBus>, runner: &Arc<FakeRunner>) -> Manager {
    manager_with(bus, runner, config()).await
}

pub async fn manager_with(
    bus: &Arc<FakeBus>,
    runner: &Arc<FakeRunner>,
    config: ManagerConfig,
) -> Manager {
    Manager::with_backend(bus.clone(), runner.clone(), config)
        .await
        .expect("manager starts over the fake bus")
}

/// Lets the signal worker and the notifier drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[derive(Debug)]
pub struct FakeWireless {
    path: String,
    iface: String,
    pub state: Mutex<u32>,
    pub access_points: Mutex<Vec<AccessPoint>>,
    pub active_bssid: Mutex<Option<String>>,
    pub ip: Mutex<Option<IpInfo>>,
    pub scans: Mutex<u32>,
}

impl FakeWireless {
    pub fn set_state(&self, state: u32) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_access_points(&self, aps: Vec<AccessPoint>) {
        *self.access_points.lock().unwrap() = aps;
    }

    pub fn associate(&self, bssid: &str) {
        *self.active_bssid.lock().unwrap() = Some(bssid.to_string());
        self.set_state(device_state::ACTIVATED);
    }

    pub fn set_strength(&self, bssid: &str, strength: u8) {
        for ap in self.access_points.lock().unwrap().iter_mut() {
            if ap.bssid == bssid {
                ap.strength = strength;
            }
        }
    }
}

#[async_trait]
impl DeviceControl for FakeWireless {
    fn path(&self) -> &str {
        &self.path
    }
    fn interface(&self) -> &str {
        &self.iface
    }
    async fn state(&self) -> Result<u32> {
        Ok(*self.state.lock().unwrap())
    }
    async fn hw_address(&self) -> Result<String> {
        Ok("AA:BB:CC:00:00:01".into())
    }
    async fn driver(&self) -> Result<String> {
        Ok("iwlwifi".into())
    }
    async fn ip4(&self) -> Result<Option<IpInfo>> {
        Ok(self.ip.lock().unwrap().clone())
    }
    async fn ip6(&self) -> Result<Option<IpInfo>> {
        Ok(None)
    }
    async fn disconnect(&self) -> Result<()> {
        *self.active_bssid.lock().unwrap() = None;
        self.set_state(device_state::DISCONNECTED);
        Ok(())
    }
}

#[async_trait]
impl WirelessDevice for FakeWireless {
    async fn request_scan(&self) -> Result<()> {
        *self.scans.lock().unwrap() += 1;
        Ok(())
    }
    async fn access_points(&self) -> Result<Vec<AccessPoint>> {
        Ok(self.access_points.lock().unwrap().clone())
    }
    async fn active_access_point(&self) -> Result<Option<AccessPoint>> {
        let bssid = self.active_bssid.lock().unwrap().clone();
        Ok(bssid.and_then(|b| {
            self.access_points
                .lock()
                .unwrap()
                .iter()
                .find(|ap| ap.bssid == b)
                .cloned()
        }))
    }
}

#[derive(Debug)]
pub struct FakeWired {
    path: String,
    iface: String,
    pub state: Mutex<u32>,
    pub carrier: Mutex<bool>,
    pub ip: Mutex<Option<IpInfo>>,
}

#[async_trait]
impl DeviceControl for FakeWired {
    fn path(&self) -> &str {
        &self.path
    }
    fn interface(&self) -> &str {
        &self.iface
    }
    async fn state(&self) -> Result<u32> {
        Ok(*self.state.lock().unwrap())
    }
    async fn hw_address(&self) -> Result<String> {
        Ok("AA:BB:CC:00:00:02".into())
    }
    async fn driver(&self) -> Result<String> {
        Ok("e1000e".into())
    }
    async fn ip4(&self) -> Result<Option<IpInfo>> {
        Ok(self.ip.lock().unwrap().clone())
    }
    async fn ip6(&self) -> Result<Option<IpInfo>> {
        Ok(None)
    }
    async fn disconnect(&self) -> Result<()> {
        *self.state.lock().unwrap() = device_state::DISCONNECTED;
        Ok(())
    }
}

#[async_trait]
impl WiredDevice for FakeWired {
    async fn carrier(&self) -> Result<bool> {
        Ok(*self.carrier.lock().unwrap())
    }
    async fn speed(&self) -> Result<u32> {
        Ok(1000)
    }
}

#[derive(Debug, Clone)]
struct FakeDevice {
    probe: DeviceProbe,
    handle: DeviceHandle,
}

#[derive(Debug, Default)]
struct BusState {
    devices: BTreeMap<String, FakeDevice>,
    wireless_enabled: bool,
    active: Vec<ActiveConnection>,
    connections: Vec<SavedConnection>,
    calls: Vec<String>,
    added: Vec<Settings>,
    updated: Vec<(String, Settings)>,
    sink: Option<SignalSink>,
    device_subscriptions: Vec<String>,
    next_id: u32,
    /// Deactivated connections stay listed for this many polls.
    linger_polls: u32,
    lingering: Vec<(ActiveConnection, u32)>,
}

#[derive(Debug, Default)]
pub struct FakeBus {
    state: Mutex<BusState>,
}

impl FakeBus {
    pub fn new() -> Arc<Self> {
        let bus = Self::default();
        bus.state.lock().unwrap().wireless_enabled = true;
        Arc::new(bus)
    }

    fn insert_device(&self, probe: DeviceProbe, handle: DeviceHandle) {
        self.state
            .lock()
            .unwrap()
            .devices
            .insert(probe.path.clone(), FakeDevice { probe, handle });
    }

    pub fn add_wifi(&self, path: &str, iface: &str) -> Arc<FakeWireless> {
        let dev = Arc::new(FakeWireless {
            path: path.into(),
            iface: iface.into(),
            state: Mutex::new(device_state::DISCONNECTED),
            access_points: Mutex::new(Vec::new()),
            active_bssid: Mutex::new(None),
            ip: Mutex::new(None),
            scans: Mutex::new(0),
        });
        let probe = DeviceProbe {
            path: path.into(),
            interface: iface.into(),
            device_type: device_type::WIFI,
            managed: true,
        };
        self.insert_device(probe, DeviceHandle::Wireless(dev.clone()));
        dev
    }

    pub fn add_wired(&self, path: &str, iface: &str) -> Arc<FakeWired> {
        let dev = Arc::new(FakeWired {
            path: path.into(),
            iface: iface.into(),
            state: Mutex::new(device_state::DISCONNECTED),
            carrier: Mutex::new(false),
            ip: Mutex::new(None),
        });
        let probe = DeviceProbe {
            path: path.into(),
            interface: iface.into(),
            device_type: device_type::ETHERNET,
            managed: true,
        };
        self.insert_device(probe, DeviceHandle::Wired(dev.clone()));
        dev
    }

    /// A device NetworkManager knows about but the manager must ignore.
    pub fn add_other(&self, path: &str, iface: &str, kind: u32) {
        let dev = Arc::new(FakeWired {
            path: path.into(),
            iface: iface.into(),
            state: Mutex::new(device_state::UNMANAGED),
            carrier: Mutex::new(false),
            ip: Mutex::new(None),
        });
        let probe = DeviceProbe {
            path: path.into(),
            interface: iface.into(),
            device_type: kind,
            managed: true,
        };
        self.insert_device(probe, DeviceHandle::Wired(dev));
    }

    pub fn set_managed(&self, path: &str, managed: bool) {
        if let Some(dev) = self.state.lock().unwrap().devices.get_mut(path) {
            dev.probe.managed = managed;
        }
    }

    pub fn remove_device(&self, path: &str) {
        self.state.lock().unwrap().devices.remove(path);
    }

    pub fn save(&self, settings: Settings) -> String {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let path = format!("/org/freedesktop/NetworkManager/Settings/{}", st.next_id);
        st.connections.push(SavedConnection {
            path: path.clone(),
            settings,
        });
        path
    }

    pub fn save_wifi(&self, ssid: &str) -> String {
        self.save(settings(&[
            (
                "connection",
                vec![
                    ("id", ssid.into()),
                    ("uuid", format!("wifi-{ssid}").into()),
                    ("type", "802-11-wireless".into()),
                ],
            ),
            ("802-11-wireless", vec![("ssid", ssid.as_bytes().to_vec().into())]),
        ]))
    }

    pub fn save_ethernet(&self, id: &str, uuid: &str) -> String {
        self.save(settings(&[(
            "connection",
            vec![
                ("id", id.into()),
                ("uuid", uuid.into()),
                ("type", "802-3-ethernet".into()),
            ],
        )]))
    }

    pub fn save_vpn(&self, id: &str, uuid: &str, data: &[(&str, &str)]) -> String {
        self.save(settings(&[
            (
                "connection",
                vec![("id", id.into()), ("uuid", uuid.into()), ("type", "vpn".into())],
            ),
            (
                "vpn",
                vec![
                    ("service-type", "org.freedesktop.NetworkManager.openvpn".into()),
                    ("data", str_map(data).into()),
                ],
            ),
        ]))
    }

    /// Marks a saved profile active.
    pub fn activate_saved(&self, uuid: &str, state: u32) -> String {
        let mut st = self.state.lock().unwrap();
        let conn = st
            .connections
            .iter()
            .find(|c| setting_str(&c.settings, "connection", "uuid") == uuid)
            .cloned()
            .expect("profile saved before activation");
        st.next_id += 1;
        let path = format!("/org/freedesktop/NetworkManager/ActiveConnection/{}", st.next_id);
        st.active.push(ActiveConnection {
            path: path.clone(),
            id: setting_str(&conn.settings, "connection", "id").to_string(),
            uuid: uuid.to_string(),
            connection_type: setting_str(&conn.settings, "connection", "type").to_string(),
            state,
            connection: conn.path,
            ..Default::default()
        });
        path
    }

    pub fn set_active_state(&self, uuid: &str, state: u32) {
        for c in self.state.lock().unwrap().active.iter_mut() {
            if c.uuid == uuid {
                c.state = state;
            }
        }
    }

    pub fn drop_active(&self, uuid: &str) {
        self.state.lock().unwrap().active.retain(|c| c.uuid != uuid);
    }

    /// Deactivated connections keep showing up for `polls` listings.
    pub fn linger_on_deactivate(&self, polls: u32) {
        self.state.lock().unwrap().linger_polls = polls;
    }

    pub fn connection(&self, uuid: &str) -> Option<SavedConnection> {
        self.state
            .lock()
            .unwrap()
            .connections
            .iter()
            .find(|c| setting_str(&c.settings, "connection", "uuid") == uuid)
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn added(&self) -> Vec<Settings> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn device_subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().device_subscriptions.clone()
    }

    /// Delivers a signal as if NetworkManager had emitted it.
    pub fn emit(&self, signal: BusSignal) {
        let sink = self.state.lock().unwrap().sink.clone();
        let sink = sink.expect("manager subscribed to global signals");
        assert!(sink.send(signal), "signal worker is running");
    }

    pub fn emit_properties(&self, path: &str, interface: &str, changed: &[(&str, SettingValue)]) {
        self.emit(BusSignal::PropertiesChanged {
            path: path.to_string(),
            interface: interface.to_string(),
            changed: changed
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }

    /// `vpn.data` of a saved profile.
    pub fn vpn_data(&self, uuid: &str) -> HashMap<String, String> {
        self.connection(uuid)
            .and_then(|c| {
                nmctl::dbus::values::setting(&c.settings, "vpn", "data")
                    .and_then(SettingValue::as_str_map)
                    .cloned()
            })
            .unwrap_or_default()
    }

    pub fn has_vpn_secrets(&self, uuid: &str) -> bool {
        self.connection(uuid)
            .is_some_and(|c| nmctl::dbus::values::setting(&c.settings, "vpn", "secrets").is_some())
    }

    /// A manager-level change of the active connection list.
    pub fn emit_active_connections_changed(&self) {
        self.emit_properties(
            "/org/freedesktop/NetworkManager",
            nmctl::types::constants::bus::MANAGER_IFACE,
            &[("ActiveConnections", SettingValue::StrList(Vec::new()))],
        );
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn setting_str<'a>(settings: &'a Settings, section: &str, key: &str) -> &'a str {
    nmctl::dbus::values::setting_str(settings, section, key)
}

#[async_trait]
impl NetworkBus for FakeBus {
    async fn device_paths(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().devices.keys().cloned().collect())
    }

    async fn probe_device(&self, path: &str) -> Result<DeviceProbe> {
        self.state
            .lock()
            .unwrap()
            .devices
            .get(path)
            .map(|d| d.probe.clone())
            .ok_or_else(|| ConnectionError::DeviceNotFound(path.to_string()))
    }

    async fn open_device(&self, probe: &DeviceProbe) -> Result<DeviceHandle> {
        self.state
            .lock()
            .unwrap()
            .devices
            .get(&probe.path)
            .map(|d| d.handle.clone())
            .ok_or_else(|| ConnectionError::DeviceNotFound(probe.path.clone()))
    }

    async fn wireless_enabled(&self) -> Result<bool> {
        Ok(self.state.lock().unwrap().wireless_enabled)
    }

    async fn set_wireless_enabled(&self, enabled: bool) -> Result<()> {
        self.record(format!("set_wireless_enabled {enabled}"));
        self.state.lock().unwrap().wireless_enabled = enabled;
        Ok(())
    }

    async fn primary_connection(&self) -> Result<Option<ActiveConnection>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .active
            .iter()
            .find(|c| c.state == active_state::ACTIVATED && c.connection_type != "vpn")
            .cloned())
    }

    async fn active_connections(&self) -> Result<Vec<ActiveConnection>> {
        let mut st = self.state.lock().unwrap();
        let mut out = st.active.clone();
        st.lingering.retain_mut(|(conn, polls)| {
            if *polls == 0 {
                return false;
            }
            *polls -= 1;
            out.push(conn.clone());
            true
        });
        Ok(out)
    }

    async fn activate(
        &self,
        connection: &str,
        device: Option<&str>,
        _specific_object: Option<&str>,
    ) -> Result<String> {
        self.record(format!("activate {connection} {}", device.unwrap_or("-")));
        let uuid = {
            let st = self.state.lock().unwrap();
            st.connections
                .iter()
                .find(|c| c.path == connection)
                .map(|c| setting_str(&c.settings, "connection", "uuid").to_string())
                .ok_or_else(|| ConnectionError::ConnectionNotFound(connection.to_string()))?
        };
        Ok(self.activate_saved(&uuid, active_state::ACTIVATING))
    }

    async fn add_and_activate(
        &self,
        settings: &Settings,
        device: &str,
        _specific_object: Option<&str>,
    ) -> Result<String> {
        self.record(format!("add_and_activate {device}"));
        self.state.lock().unwrap().added.push(settings.clone());
        let uuid = setting_str(settings, "connection", "uuid").to_string();
        self.save(settings.clone());
        Ok(self.activate_saved(&uuid, active_state::ACTIVATING))
    }

    async fn deactivate(&self, active_connection: &str) -> Result<()> {
        self.record(format!("deactivate {active_connection}"));
        let mut st = self.state.lock().unwrap();
        let polls = st.linger_polls;
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut st.active)
            .into_iter()
            .partition(|c| c.path == active_connection);
        st.active = kept;
        if polls > 0 {
            st.lingering
                .extend(gone.into_iter().map(|c| (c, polls)));
        }
        Ok(())
    }

    async fn list_connections(&self) -> Result<Vec<SavedConnection>> {
        Ok(self.state.lock().unwrap().connections.clone())
    }

    async fn add_connection(&self, settings: &Settings) -> Result<String> {
        self.record("add_connection".to_string());
        self.state.lock().unwrap().added.push(settings.clone());
        Ok(self.save(settings.clone()))
    }

    async fn update_connection(&self, path: &str, settings: &Settings) -> Result<()> {
        self.record(format!("update_connection {path}"));
        let mut st = self.state.lock().unwrap();
        st.updated.push((path.to_string(), settings.clone()));
        let conn = st
            .connections
            .iter_mut()
            .find(|c| c.path == path)
            .ok_or_else(|| ConnectionError::ConnectionNotFound(path.to_string()))?;
        conn.settings = settings.clone();
        Ok(())
    }

    async fn save_connection(&self, path: &str, settings: &Settings) -> Result<()> {
        self.update_connection(path, settings).await?;
        self.record(format!("save_connection {path}"));
        Ok(())
    }

    async fn delete_connection(&self, path: &str) -> Result<()> {
        self.record(format!("delete_connection {path}"));
        self.state
            .lock()
            .unwrap()
            .connections
            .retain(|c| c.path != path);
        Ok(())
    }

    async fn clear_secrets(&self, path: &str) -> Result<()> {
        self.record(format!("clear_secrets {path}"));
        Ok(())
    }

    async fn subscribe_global(&self, sink: SignalSink) -> Result<Subscription> {
        self.state.lock().unwrap().sink = Some(sink);
        Ok(Subscription::detached())
    }

    async fn subscribe_device(&self, probe: &DeviceProbe, _sink: SignalSink) -> Result<Subscription> {
        self.state
            .lock()
            .unwrap()
            .device_subscriptions
            .push(probe.path.clone());
        Ok(Subscription::detached())
    }
}

/// Records `nmcli` invocations. Every call succeeds unless a canned reply
/// matches its leading arguments.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    replies: Mutex<Vec<(Vec<String>, CommandOutput)>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, prefix: &[&str], output: CommandOutput) {
        self.replies
            .lock()
            .unwrap()
            .push((prefix.iter().map(|s| s.to_string()).collect(), output));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .iter()
            .find(|(prefix, _)| args.starts_with(prefix))
            .map(|(_, out)| out.clone());
        Ok(reply.unwrap_or(CommandOutput {
            success: true,
            ..Default::default()
        }))
    }
}
