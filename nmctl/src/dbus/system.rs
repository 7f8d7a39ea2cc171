//! [`NetworkBus`] over the system D-Bus.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use log::{debug, warn};
use zbus::fdo::{PropertiesChangedArgs, PropertiesProxy};
use zbus::{Connection, MatchRule, Message, MessageStream};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::dbus::bus::{
    AccessPoint, ActiveConnection, BusSignal, DeviceControl, DeviceHandle, DeviceProbe, IpInfo,
    NetworkBus, SavedConnection, SignalSink, Subscription, WiredDevice, WirelessDevice,
};
use crate::dbus::values::{SettingValue, Settings, settings_from_dbus, settings_to_dbus};
use crate::dbus::{
    NMAccessPointProxy, NMActiveConnectionProxy, NMDeviceProxy, NMIP4ConfigProxy,
    NMIP6ConfigProxy, NMProxy, NMSettingsConnectionProxy, NMSettingsProxy, NMWiredProxy,
    NMWirelessProxy,
};
use crate::types::constants::{bus, device_type};

const MANAGER_PATH: &str = "/org/freedesktop/NetworkManager";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";
/// `Update2` flag: persist the profile to disk.
const UPDATE2_TO_DISK: u32 = 0x1;

fn object_path(path: &str) -> Result<OwnedObjectPath> {
    Ok(OwnedObjectPath::try_from(path.to_string())?)
}

fn optional_path(path: Option<&str>) -> Result<OwnedObjectPath> {
    object_path(path.unwrap_or("/"))
}

fn present(path: &OwnedObjectPath) -> Option<String> {
    match path.as_str() {
        "/" | "" => None,
        p => Some(p.to_string()),
    }
}

/// The system bus connection to NetworkManager.
#[derive(Debug, Clone)]
pub struct SystemBus {
    conn: Connection,
}

impl SystemBus {
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    async fn settings_connection(&self, path: &str) -> Result<NMSettingsConnectionProxy<'static>> {
        Ok(NMSettingsConnectionProxy::builder(&self.conn)
            .path(object_path(path)?)?
            .build()
            .await?)
    }

    async fn read_active(&self, path: OwnedObjectPath) -> Result<ActiveConnection> {
        let ac = NMActiveConnectionProxy::builder(&self.conn)
            .path(path.clone())?
            .build()
            .await?;

        let mut active = ActiveConnection {
            path: path.to_string(),
            id: ac.id().await?,
            uuid: ac.uuid().await?,
            connection_type: ac.connection_type().await.unwrap_or_default(),
            state: ac.state().await?,
            connection: ac.connection().await.map(|p| p.to_string()).unwrap_or_default(),
            ..Default::default()
        };

        if let Some(dev_path) = ac.devices().await.unwrap_or_default().into_iter().next() {
            let dev = NMDeviceProxy::builder(&self.conn)
                .path(dev_path)?
                .build()
                .await?;
            active.device = dev.interface().await.unwrap_or_default();
            active.mtu = dev.mtu().await.unwrap_or_default();
        }

        if let Ok(ip4) = ac.ip4_config().await {
            active.ip4 = ip4_info(&self.conn, &ip4).await;
        }
        Ok(active)
    }
}

async fn ip4_info(conn: &Connection, config: &OwnedObjectPath) -> Option<IpInfo> {
    present(config)?;
    let proxy = crate::try_log!(
        NMIP4ConfigProxy::builder(conn).path(config.clone()),
        "Failed to create IP4Config proxy builder"
    );
    let proxy = crate::try_log!(proxy.build().await, "Failed to build IP4Config proxy");
    let data = crate::try_log!(proxy.address_data().await, "Failed to read AddressData");
    let gateway = proxy.gateway().await.unwrap_or_default();
    first_address(&data, gateway)
}

async fn ip6_info(conn: &Connection, config: &OwnedObjectPath) -> Option<IpInfo> {
    present(config)?;
    let proxy = crate::try_log!(
        NMIP6ConfigProxy::builder(conn).path(config.clone()),
        "Failed to create IP6Config proxy builder"
    );
    let proxy = crate::try_log!(proxy.build().await, "Failed to build IP6Config proxy");
    let data = crate::try_log!(proxy.address_data().await, "Failed to read AddressData");
    let gateway = proxy.gateway().await.unwrap_or_default();
    first_address(&data, gateway)
}

fn first_address(data: &[HashMap<String, OwnedValue>], gateway: String) -> Option<IpInfo> {
    let first = data.first()?;
    let address = match first.get("address").map(|v| &**v) {
        Some(Value::Str(s)) => s.to_string(),
        _ => return None,
    };
    let prefix = match first.get("prefix").map(|v| &**v) {
        Some(Value::U32(p)) => *p,
        _ => 0,
    };
    Some(IpInfo {
        address,
        prefix,
        gateway,
    })
}

async fn read_access_point(conn: &Connection, path: OwnedObjectPath) -> Result<AccessPoint> {
    let ap = NMAccessPointProxy::builder(conn)
        .path(path.clone())?
        .build()
        .await?;
    Ok(AccessPoint {
        path: path.to_string(),
        ssid: ap.ssid().await?,
        bssid: ap.hw_address().await.unwrap_or_default(),
        strength: ap.strength().await.unwrap_or_default(),
        flags: ap.flags().await.unwrap_or_default(),
        wpa_flags: ap.wpa_flags().await.unwrap_or_default(),
        rsn_flags: ap.rsn_flags().await.unwrap_or_default(),
        frequency: ap.frequency().await.unwrap_or_default(),
        max_bitrate: ap.max_bitrate().await.unwrap_or_default(),
        mode: ap.mode().await.unwrap_or_default(),
    })
}

/// A device on the system bus. Wrapped as wireless or wired depending on
/// what [`NetworkBus::probe_device`] reported.
#[derive(Debug, Clone)]
pub struct SystemDevice {
    conn: Connection,
    path: OwnedObjectPath,
    interface: String,
}

impl SystemDevice {
    async fn device(&self) -> Result<NMDeviceProxy<'static>> {
        Ok(NMDeviceProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn wireless(&self) -> Result<NMWirelessProxy<'static>> {
        Ok(NMWirelessProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn wired(&self) -> Result<NMWiredProxy<'static>> {
        Ok(NMWiredProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }
}

#[async_trait]
impl DeviceControl for SystemDevice {
    fn path(&self) -> &str {
        self.path.as_str()
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    async fn state(&self) -> Result<u32> {
        Ok(self.device().await?.state().await?)
    }

    async fn hw_address(&self) -> Result<String> {
        Ok(self.device().await?.hw_address().await?)
    }

    async fn driver(&self) -> Result<String> {
        Ok(self.device().await?.driver().await?)
    }

    async fn ip4(&self) -> Result<Option<IpInfo>> {
        let config = self.device().await?.ip4_config().await?;
        Ok(ip4_info(&self.conn, &config).await)
    }

    async fn ip6(&self) -> Result<Option<IpInfo>> {
        let config = self.device().await?.ip6_config().await?;
        Ok(ip6_info(&self.conn, &config).await)
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(self.device().await?.disconnect().await?)
    }
}

#[async_trait]
impl WirelessDevice for SystemDevice {
    async fn request_scan(&self) -> Result<()> {
        Ok(self.wireless().await?.request_scan(HashMap::new()).await?)
    }

    async fn access_points(&self) -> Result<Vec<AccessPoint>> {
        let paths = self.wireless().await?.access_points().await?;
        let mut aps = Vec::with_capacity(paths.len());
        for path in paths {
            // Access points vanish between listing and reading; skip those.
            match read_access_point(&self.conn, path).await {
                Ok(ap) => aps.push(ap),
                Err(e) => debug!("Skipping access point on {}: {e}", self.interface),
            }
        }
        Ok(aps)
    }

    async fn active_access_point(&self) -> Result<Option<AccessPoint>> {
        let path = self.wireless().await?.active_access_point().await?;
        if present(&path).is_none() {
            return Ok(None);
        }
        Ok(Some(read_access_point(&self.conn, path).await?))
    }
}

#[async_trait]
impl WiredDevice for SystemDevice {
    async fn carrier(&self) -> Result<bool> {
        Ok(self.wired().await?.carrier().await?)
    }

    async fn speed(&self) -> Result<u32> {
        Ok(self.wired().await?.speed().await?)
    }
}

fn properties_signal(path: String, args: PropertiesChangedArgs<'_>) -> BusSignal {
    let changed = args
        .changed_properties()
        .iter()
        .filter_map(|(k, v)| SettingValue::from_value(v).map(|v| (k.to_string(), v)))
        .collect();
    BusSignal::PropertiesChanged {
        path,
        interface: args.interface_name().to_string(),
        changed,
    }
}

fn access_point_signal(msg: Message) -> Option<BusSignal> {
    let path = msg.header().path()?.to_string();
    let signal = zbus::fdo::PropertiesChanged::from_message(msg)?;
    let args = signal.args().ok()?;
    Some(properties_signal(path, args))
}

type SignalStream = Pin<Box<dyn Stream<Item = Option<BusSignal>> + Send>>;

async fn pump(mut streams: futures::stream::SelectAll<SignalStream>, sink: SignalSink) {
    while let Some(item) = streams.next().await {
        if let Some(signal) = item {
            if !sink.send(signal) {
                debug!("Signal worker gone, dropping subscription");
                return;
            }
        }
    }
    warn!("Signal stream ended unexpectedly");
}

#[async_trait]
impl NetworkBus for SystemBus {
    async fn device_paths(&self) -> Result<Vec<String>> {
        let nm = NMProxy::new(&self.conn).await?;
        Ok(nm
            .get_devices()
            .await?
            .into_iter()
            .map(|p| p.to_string())
            .collect())
    }

    async fn probe_device(&self, path: &str) -> Result<DeviceProbe> {
        let dev = NMDeviceProxy::builder(&self.conn)
            .path(object_path(path)?)?
            .build()
            .await?;
        Ok(DeviceProbe {
            path: path.to_string(),
            interface: dev.interface().await?,
            device_type: dev.device_type().await?,
            managed: dev.managed().await.unwrap_or(false),
        })
    }

    async fn open_device(&self, probe: &DeviceProbe) -> Result<DeviceHandle> {
        let device = SystemDevice {
            conn: self.conn.clone(),
            path: object_path(&probe.path)?,
            interface: probe.interface.clone(),
        };
        match probe.device_type {
            device_type::WIFI => Ok(DeviceHandle::Wireless(std::sync::Arc::new(device))),
            device_type::ETHERNET => Ok(DeviceHandle::Wired(std::sync::Arc::new(device))),
            other => Err(crate::api::models::ConnectionError::DeviceNotFound(format!(
                "{} (unsupported device type {other})",
                probe.interface
            ))),
        }
    }

    async fn wireless_enabled(&self) -> Result<bool> {
        Ok(NMProxy::new(&self.conn).await?.wireless_enabled().await?)
    }

    async fn set_wireless_enabled(&self, enabled: bool) -> Result<()> {
        Ok(NMProxy::new(&self.conn)
            .await?
            .set_wireless_enabled(enabled)
            .await?)
    }

    async fn primary_connection(&self) -> Result<Option<ActiveConnection>> {
        let path = NMProxy::new(&self.conn).await?.primary_connection().await?;
        if present(&path).is_none() {
            return Ok(None);
        }
        Ok(Some(self.read_active(path).await?))
    }

    async fn active_connections(&self) -> Result<Vec<ActiveConnection>> {
        let paths = NMProxy::new(&self.conn).await?.active_connections().await?;
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read_active(path).await {
                Ok(ac) => out.push(ac),
                Err(e) => debug!("Skipping vanished active connection: {e}"),
            }
        }
        Ok(out)
    }

    async fn activate(
        &self,
        connection: &str,
        device: Option<&str>,
        specific_object: Option<&str>,
    ) -> Result<String> {
        let nm = NMProxy::new(&self.conn).await?;
        let active = nm
            .activate_connection(
                object_path(connection)?,
                optional_path(device)?,
                optional_path(specific_object)?,
            )
            .await?;
        Ok(active.to_string())
    }

    async fn add_and_activate(
        &self,
        settings: &Settings,
        device: &str,
        specific_object: Option<&str>,
    ) -> Result<String> {
        let nm = NMProxy::new(&self.conn).await?;
        let (_, active) = nm
            .add_and_activate_connection(
                settings_to_dbus(settings)?,
                object_path(device)?,
                optional_path(specific_object)?,
            )
            .await?;
        Ok(active.to_string())
    }

    async fn deactivate(&self, active_connection: &str) -> Result<()> {
        let nm = NMProxy::new(&self.conn).await?;
        Ok(nm
            .deactivate_connection(object_path(active_connection)?)
            .await?)
    }

    async fn list_connections(&self) -> Result<Vec<SavedConnection>> {
        let settings = NMSettingsProxy::new(&self.conn).await?;
        let mut out = Vec::new();
        for path in settings.list_connections().await? {
            let path = path.to_string();
            let conn = match self.settings_connection(&path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to open connection {path}: {e}");
                    continue;
                }
            };
            match conn.get_settings().await {
                Ok(raw) => out.push(SavedConnection {
                    path,
                    settings: settings_from_dbus(raw),
                }),
                Err(e) => debug!("Skipping connection {path}: {e}"),
            }
        }
        Ok(out)
    }

    async fn add_connection(&self, settings: &Settings) -> Result<String> {
        let proxy = NMSettingsProxy::new(&self.conn).await?;
        let path = proxy.add_connection(settings_to_dbus(settings)?).await?;
        Ok(path.to_string())
    }

    async fn update_connection(&self, path: &str, settings: &Settings) -> Result<()> {
        let conn = self.settings_connection(path).await?;
        Ok(conn.update(settings_to_dbus(settings)?).await?)
    }

    async fn save_connection(&self, path: &str, settings: &Settings) -> Result<()> {
        let conn = self.settings_connection(path).await?;
        conn.update2(settings_to_dbus(settings)?, UPDATE2_TO_DISK, HashMap::new())
            .await?;
        Ok(())
    }

    async fn delete_connection(&self, path: &str) -> Result<()> {
        Ok(self.settings_connection(path).await?.delete().await?)
    }

    async fn clear_secrets(&self, path: &str) -> Result<()> {
        Ok(self.settings_connection(path).await?.clear_secrets().await?)
    }

    async fn subscribe_global(&self, sink: SignalSink) -> Result<Subscription> {
        let nm = NMProxy::new(&self.conn).await?;
        let settings = NMSettingsProxy::new(&self.conn).await?;
        let manager_props = PropertiesProxy::builder(&self.conn)
            .destination(bus::SERVICE)?
            .path(MANAGER_PATH)?
            .build()
            .await?;
        let ap_rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(bus::SERVICE)?
            .interface(PROPERTIES_IFACE)?
            .member("PropertiesChanged")?
            .arg(0, bus::ACCESS_POINT_IFACE)?
            .build();
        let ap_stream = MessageStream::for_match_rule(ap_rule, &self.conn, None).await?;

        let streams: Vec<SignalStream> = vec![
            Box::pin(nm.receive_device_added().await?.map(|s| {
                s.args()
                    .ok()
                    .map(|a| BusSignal::DeviceAdded(a.device_path().to_string()))
            })),
            Box::pin(nm.receive_device_removed().await?.map(|s| {
                s.args()
                    .ok()
                    .map(|a| BusSignal::DeviceRemoved(a.device_path().to_string()))
            })),
            Box::pin(settings.receive_new_connection().await?.map(|s| {
                s.args()
                    .ok()
                    .map(|a| BusSignal::ConnectionAdded(a.connection().to_string()))
            })),
            Box::pin(settings.receive_connection_removed().await?.map(|s| {
                s.args()
                    .ok()
                    .map(|a| BusSignal::ConnectionRemoved(a.connection().to_string()))
            })),
            Box::pin(
                manager_props
                    .receive_properties_changed()
                    .await?
                    .map(|s| s.args().ok().map(|a| properties_signal(MANAGER_PATH.into(), a))),
            ),
            Box::pin(ap_stream.map(|m| m.ok().and_then(access_point_signal))),
        ];

        debug!("Subscribed to manager, settings and access point signals");
        let task = tokio::spawn(pump(futures::stream::select_all(streams), sink));
        Ok(Subscription::from_task(task))
    }

    async fn subscribe_device(
        &self,
        probe: &DeviceProbe,
        sink: SignalSink,
    ) -> Result<Subscription> {
        let props = PropertiesProxy::builder(&self.conn)
            .destination(bus::SERVICE)?
            .path(object_path(&probe.path)?)?
            .build()
            .await?;
        let path = probe.path.clone();
        let stream: SignalStream = Box::pin(
            props
                .receive_properties_changed()
                .await?
                .map(move |s| s.args().ok().map(|a| properties_signal(path.clone(), a))),
        );

        debug!("Subscribed to property changes on {}", probe.interface);
        let task = tokio::spawn(pump(futures::stream::select_all(vec![stream]), sink));
        Ok(Subscription::from_task(task))
    }
}
