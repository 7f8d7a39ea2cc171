use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// NetworkManager active connection state.
///
/// These values represent the lifecycle states of an active connection
/// as reported by the NM D-Bus API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveConnectionState {
    /// Connection state is unknown.
    Unknown,
    /// Connection is activating (connecting).
    Activating,
    /// Connection is fully activated (connected).
    Activated,
    /// Connection is deactivating (disconnecting).
    Deactivating,
    /// Connection is fully deactivated (disconnected).
    Deactivated,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl From<u32> for ActiveConnectionState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Activating,
            2 => Self::Activated,
            3 => Self::Deactivating,
            4 => Self::Deactivated,
            v => Self::Other(v),
        }
    }
}

impl Display for ActiveConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Deactivating => write!(f, "deactivating"),
            Self::Deactivated => write!(f, "deactivated"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager device states.
///
/// Represents the current operational state of a network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is not managed by NetworkManager.
    Unmanaged,
    /// Device is managed but not yet available (e.g., Wi-Fi disabled).
    Unavailable,
    /// Device is available but not connected.
    Disconnected,
    /// Device is preparing to connect.
    Prepare,
    /// Device is being configured.
    Config,
    /// Device is waiting for secrets.
    NeedAuth,
    /// Device is requesting IP addresses.
    IpConfig,
    /// Device is checking IP connectivity.
    IpCheck,
    /// Device is waiting for secondary connections.
    Secondaries,
    /// Device is fully connected and operational.
    Activated,
    /// Device is disconnecting.
    Deactivating,
    /// Device connection failed.
    Failed,
    /// Unknown or unsupported state with raw code.
    Other(u32),
}

impl From<u32> for DeviceState {
    fn from(value: u32) -> Self {
        match value {
            10 => DeviceState::Unmanaged,
            20 => DeviceState::Unavailable,
            30 => DeviceState::Disconnected,
            40 => DeviceState::Prepare,
            50 => DeviceState::Config,
            60 => DeviceState::NeedAuth,
            70 => DeviceState::IpConfig,
            80 => DeviceState::IpCheck,
            90 => DeviceState::Secondaries,
            100 => DeviceState::Activated,
            110 => DeviceState::Deactivating,
            120 => DeviceState::Failed,
            v => DeviceState::Other(v),
        }
    }
}

impl DeviceState {
    /// The link state string published for a device.
    pub fn link_state(self) -> &'static str {
        match self {
            DeviceState::Activated => "connected",
            DeviceState::Config | DeviceState::IpConfig => "connecting",
            DeviceState::Prepare => "preparing",
            DeviceState::Deactivating => "disconnecting",
            _ => "disconnected",
        }
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Unmanaged => write!(f, "Unmanaged"),
            DeviceState::Unavailable => write!(f, "Unavailable"),
            DeviceState::Disconnected => write!(f, "Disconnected"),
            DeviceState::Prepare => write!(f, "Preparing"),
            DeviceState::Config => write!(f, "Configuring"),
            DeviceState::NeedAuth => write!(f, "Waiting for secrets"),
            DeviceState::IpConfig => write!(f, "Requesting addresses"),
            DeviceState::IpCheck => write!(f, "Checking connectivity"),
            DeviceState::Secondaries => write!(f, "Waiting for secondaries"),
            DeviceState::Activated => write!(f, "Activated"),
            DeviceState::Deactivating => write!(f, "Deactivating"),
            DeviceState::Failed => write!(f, "Failed"),
            DeviceState::Other(v) => write!(f, "Other({v})"),
        }
    }
}

/// Which medium currently carries traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Disconnected,
    Ethernet,
    Wifi,
    Vpn,
}

impl Display for NetworkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Ethernet => write!(f, "ethernet"),
            Self::Wifi => write!(f, "wifi"),
            Self::Vpn => write!(f, "vpn"),
        }
    }
}

/// Which medium is preferred when both are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    #[default]
    Auto,
    Wifi,
    Ethernet,
}

impl FromStr for Preference {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "wifi" => Ok(Self::Wifi),
            "ethernet" => Ok(Self::Ethernet),
            other => Err(ConnectionError::InvalidPreference(other.to_string())),
        }
    }
}

impl Display for Preference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Wifi => write!(f, "wifi"),
            Self::Ethernet => write!(f, "ethernet"),
        }
    }
}

/// One logical Wi-Fi network, merged across the access points that
/// broadcast its SSID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiNetwork {
    pub ssid: String,
    /// BSSID of the strongest access point.
    pub bssid: String,
    /// Signal strength (0-100) of the strongest access point.
    pub signal: u8,
    pub secured: bool,
    /// Uses 802.1X authentication.
    pub enterprise: bool,
    pub connected: bool,
    /// A profile for this SSID exists.
    pub saved: bool,
    pub autoconnect: bool,
    pub hidden: bool,
    /// MHz.
    pub frequency: u32,
    pub mode: String,
    /// Mbit/s.
    pub rate: u32,
    pub channel: u32,
    /// Interface that sees the network, set in per-device lists.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,
}

/// A Wi-Fi adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiDevice {
    pub name: String,
    pub hw_address: String,
    /// One of `connected`, `connecting`, `preparing`, `disconnecting`, `disconnected`.
    pub state: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bssid: String,
    #[serde(default)]
    pub signal: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    pub networks: Vec<WifiNetwork>,
}

/// An Ethernet adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetDevice {
    pub name: String,
    pub hw_address: String,
    pub state: String,
    pub connected: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    /// Mb/s.
    #[serde(default)]
    pub speed: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub driver: String,
}

/// A saved Ethernet profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiredConnection {
    pub path: String,
    pub id: String,
    pub uuid: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub autoconnect: bool,
    pub is_active: bool,
}

/// A saved VPN or WireGuard profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnProfile {
    pub name: String,
    pub uuid: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    /// Plugin service type, e.g. `org.freedesktop.NetworkManager.openvpn`.
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    pub autoconnect: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}

/// A VPN connection that is activating or active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnActive {
    pub name: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,
    /// Active connection state as text, e.g. `activated`.
    pub state: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default)]
    pub mtu: u32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}

/// Point-in-time connectivity snapshot handed to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub backend: String,
    #[serde(rename = "networkStatus")]
    pub status: NetworkStatus,
    pub preference: Preference,

    #[serde(rename = "ethernetIP")]
    pub ethernet_ip: String,
    pub ethernet_device: String,
    pub ethernet_connected: bool,
    pub ethernet_connection_uuid: String,
    pub ethernet_devices: Vec<EthernetDevice>,
    pub wired_connections: Vec<WiredConnection>,

    #[serde(rename = "wifiIP")]
    pub wifi_ip: String,
    pub wifi_device: String,
    pub wifi_connected: bool,
    pub wifi_enabled: bool,
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: String,
    #[serde(rename = "wifiBSSID")]
    pub wifi_bssid: String,
    pub wifi_signal: u8,
    pub wifi_networks: Vec<WifiNetwork>,
    pub wifi_devices: Vec<WifiDevice>,

    pub vpn_profiles: Vec<VpnProfile>,
    pub vpn_active: Vec<VpnActive>,

    pub is_connecting: bool,
    #[serde(rename = "connectingSSID")]
    pub connecting_ssid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub connecting_device: String,
    #[serde(rename = "isConnectingVPN")]
    pub is_connecting_vpn: bool,
    #[serde(rename = "connectingVPNUUID")]
    pub connecting_vpn_uuid: String,
    pub last_error: String,
}

/// A request to join a Wi-Fi network.
///
/// Only `ssid` is required. Setting `username` (or `eap_method`) makes the
/// network enterprise; `interactive` leaves secrets out of the new profile so
/// NetworkManager asks for them through the credential prompt.
///
/// # Example
///
/// ```rust
/// use nmctl::ConnectionRequest;
///
/// let req = ConnectionRequest {
///     password: Some("hunter22".into()),
///     ..ConnectionRequest::new("HomeNet")
/// };
/// assert_eq!(req.ssid, "HomeNet");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub ssid: String,
    #[serde(default)]
    pub password: Option<String>,
    /// 802.1X identity.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub anonymous_identity: Option<String>,
    #[serde(default)]
    pub domain_suffix_match: Option<String>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Interface to use instead of the primary Wi-Fi device.
    #[serde(default)]
    pub device: Option<String>,
    /// `peap` (default), `ttls` or `tls`.
    #[serde(default)]
    pub eap_method: Option<String>,
    /// Defaults to `mschapv2`; ignored for `tls`.
    #[serde(default)]
    pub phase2_auth: Option<String>,
    #[serde(default, rename = "caCertPath")]
    pub ca_cert_path: Option<String>,
    #[serde(default)]
    pub client_cert_path: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_password: Option<String>,
    #[serde(default, rename = "useSystemCACerts")]
    pub use_system_ca_certs: Option<bool>,
}

impl ConnectionRequest {
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            ..Default::default()
        }
    }
}

/// Describes one field of a credential prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub label: String,
    pub is_secret: bool,
}

/// What a flow needs from the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub name: String,
    #[serde(default)]
    pub ssid: String,
    /// `802-11-wireless`, `vpn`, ...
    pub conn_type: String,
    #[serde(default)]
    pub vpn_service: String,
    /// Settings section the secrets belong to.
    pub setting: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub fields_info: Vec<FieldInfo>,
    #[serde(default)]
    pub hints: Vec<String>,
    /// Why the prompt was raised, e.g. `required` or `wrong-password`.
    pub reason: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub connection_uuid: String,
    #[serde(default)]
    pub connection_path: String,
}

/// A pending prompt as published to UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPrompt {
    pub token: String,
    #[serde(flatten)]
    pub request: PromptRequest,
}

/// The answer to a prompt. `cancel` means abort without applying anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptReply {
    pub secrets: HashMap<String, String>,
    pub save: bool,
    pub cancel: bool,
}

impl PromptReply {
    pub fn secrets(secrets: HashMap<String, String>, save: bool) -> Self {
        Self {
            secrets,
            save,
            cancel: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            cancel: true,
            ..Default::default()
        }
    }
}

/// One access point of a network, as returned by the detail query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBand {
    pub bssid: String,
    pub signal: u8,
    /// Signal as bars, e.g. `▂▄▆_`.
    pub bars: String,
    pub channel: u32,
    pub frequency: u32,
    pub mode: String,
    pub rate: u32,
    pub secured: bool,
    pub enterprise: bool,
    pub saved: bool,
    pub connected: bool,
    pub device: String,
}

/// Every access point broadcasting an SSID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDetails {
    pub ssid: String,
    pub bands: Vec<NetworkBand>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiredIpConfig {
    pub ips: Vec<String>,
    pub gateway: String,
}

/// Live details of a wired profile's device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiredNetworkDetails {
    pub uuid: String,
    pub iface: String,
    pub driver: String,
    pub hw_addr: String,
    pub carrier: bool,
    /// e.g. `1000 Mb/s`.
    pub speed: String,
    pub ipv4: WiredIpConfig,
    pub ipv6: WiredIpConfig,
}

/// An installed NetworkManager VPN plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnPlugin {
    pub name: String,
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<String>,
    pub file_extensions: Vec<String>,
}

/// Editable view of a VPN profile. Secret-bearing data keys are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnConfig {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    pub autoconnect: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, String>,
}

/// Fields to change on a VPN profile. `None` leaves a field untouched;
/// `data` entries are merged into the existing map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnConfigUpdate {
    pub name: Option<String>,
    pub autoconnect: Option<bool>,
    pub data: Option<HashMap<String, String>>,
}

/// Outcome of importing a provider file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnImportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Errors returned by the control plane.
///
/// Messages are meant for display; `last_error` in [`NetworkState`] carries
/// the same text for subscribers.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("D-Bus error: {0}")]
    DbusFdo(#[from] zbus::fdo::Error),

    /// A value could not be converted to or from its D-Bus form.
    #[error("D-Bus value error: {0}")]
    Variant(#[from] zvariant::Error),

    /// No Wi-Fi device was found on the system.
    #[error("no WiFi device available")]
    NoWifiDevice,

    /// No wired (ethernet) device was found on the system.
    #[error("no wired device was found")]
    NoWiredDevice,

    #[error("WiFi is disabled")]
    WifiDisabled,

    /// No Wi-Fi device has the requested interface name.
    #[error("WiFi device not found: {0}")]
    DeviceNotFound(String),

    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("access point not found: {0}")]
    AccessPointNotFound(String),

    #[error("VPN connection not found: {0}")]
    VpnNotFound(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// Activating a saved profile failed.
    #[error("failed to activate connection: {0}")]
    ActivationFailed(String),

    #[error("failed to activate VPN: {0}")]
    VpnActivationFailed(String),

    /// VPN connection failed
    #[error("VPN connection failed: {0}")]
    VpnFailed(String),

    /// The access point advertises security this crate cannot configure.
    #[error("secured network but not SAE/PSK/802.1X (rsn=0x{rsn:x} wpa=0x{wpa:x})")]
    UnsupportedSecurity { rsn: u32, wpa: u32 },

    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// The user answered a credential prompt with cancel.
    #[error("user cancelled authentication")]
    UserCancelled,

    /// Nobody answered a credential prompt in time.
    #[error("credential prompt timed out")]
    PromptTimeout,

    /// The token was never issued, already answered, or already abandoned.
    #[error("unknown or already resolved prompt token: {0}")]
    UnknownToken(String),

    #[error("credential broker is shut down")]
    BrokerClosed,

    #[error("invalid preference: {0}")]
    InvalidPreference(String),

    /// An external command could not be run or failed.
    #[error("command failed: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,
}
