//! A stateful control plane in front of NetworkManager.
//!
//! `nmctl` keeps one [`NetworkState`] current from D-Bus signals and exposes
//! the operations a network applet needs:
//!
//! - Wi-Fi scanning, joining (open, WPA-PSK, WPA3-SAE, WPA-EAP), forgetting
//!   and per-device control
//! - Ethernet activation and wired profile details
//! - VPN activation with single-active preemption, profile edits, provider
//!   file import and plugin discovery
//! - A Wi-Fi/Ethernet preference applied through route metrics
//! - Token-based credential prompts that any front end can answer
//!
//! # Example
//!
//! ```no_run
//! use nmctl::{ConnectionRequest, Manager};
//!
//! # async fn example() -> nmctl::Result<()> {
//! let manager = Manager::new().await?;
//!
//! manager.scan_wifi(None).await?;
//! for net in manager.state().wifi_networks {
//!     println!("{} ({}%)", net.ssid, net.signal);
//! }
//!
//! let mut request = ConnectionRequest::new("MyNetwork");
//! request.password = Some("password123".into());
//! manager.connect_wifi(&request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # State Updates
//!
//! A single worker applies bus signals one at a time. Changes are coalesced
//! over [`ManagerConfig::debounce`] and pushed to every
//! [`Manager::subscribe`] receiver; identical snapshots are not pushed twice.
//!
//! # Error Handling
//!
//! All operations return `Result<T, ConnectionError>`. Failed connection
//! attempts are also published as [`NetworkState::last_error`], so a
//! subscriber learns about them without holding the original call.
//!
//! # Testing
//!
//! Everything above the bus goes through the [`NetworkBus`] and
//! [`CommandRunner`] traits. [`Manager::with_backend`] accepts any
//! implementation, which is how the integration tests run without a
//! NetworkManager.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`.

pub mod api;
mod core;
pub mod dbus;
pub mod types;
pub mod util;

pub use api::builders;
pub use api::builders::{WifiConnectionBuilder, WifiSecurityKind, build_ethernet_connection};
pub use api::config::ManagerConfig;
pub use api::manager::{BACKEND_NAME, Manager};
pub use api::models::{
    ActiveConnectionState, ConnectionError, ConnectionRequest, CredentialPrompt, DeviceState,
    EthernetDevice, FieldInfo, NetworkBand, NetworkDetails, NetworkState, NetworkStatus,
    Preference, PromptReply, PromptRequest, VpnActive, VpnConfig, VpnConfigUpdate,
    VpnImportResult, VpnPlugin, VpnProfile, WifiDevice, WifiNetwork, WiredConnection,
    WiredIpConfig, WiredNetworkDetails,
};
pub use crate::core::prompt::PromptBroker;
pub use dbus::bus::{
    AccessPoint, ActiveConnection, BusSignal, DeviceControl, DeviceHandle, DeviceProbe, IpInfo,
    NetworkBus, SavedConnection, SignalSink, Subscription, WiredDevice, WirelessDevice,
};
pub use dbus::values::{SettingValue, Settings};
pub use util::command::{CommandOutput, CommandRunner, SystemCommandRunner};

/// A specialized `Result` type for network operations.
pub type Result<T> = std::result::Result<T, ConnectionError>;
