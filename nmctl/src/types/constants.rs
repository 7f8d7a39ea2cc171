//! Numeric codes from the NetworkManager D-Bus API, and the defaults the
//! controllers are tuned with.

/// Well-known bus names, object paths and interfaces.
pub mod bus {
    pub const SERVICE: &str = "org.freedesktop.NetworkManager";
    pub const SETTINGS_PATH: &str = "/org/freedesktop/NetworkManager/Settings";

    pub const MANAGER_IFACE: &str = "org.freedesktop.NetworkManager";
    pub const DEVICE_IFACE: &str = "org.freedesktop.NetworkManager.Device";
    pub const WIRED_IFACE: &str = "org.freedesktop.NetworkManager.Device.Wired";
    pub const WIRELESS_IFACE: &str = "org.freedesktop.NetworkManager.Device.Wireless";
    pub const ACCESS_POINT_IFACE: &str = "org.freedesktop.NetworkManager.AccessPoint";
}

/// `Device.DeviceType`. Other types are not tracked.
pub mod device_type {
    pub const ETHERNET: u32 = 1;
    pub const WIFI: u32 = 2;
}

/// `Device.State`.
pub mod device_state {
    pub const UNMANAGED: u32 = 10;
    pub const UNAVAILABLE: u32 = 20;
    pub const DISCONNECTED: u32 = 30;
    pub const PREPARE: u32 = 40;
    pub const CONFIG: u32 = 50;
    pub const NEED_AUTH: u32 = 60;
    pub const IP_CONFIG: u32 = 70;
    pub const IP_CHECK: u32 = 80;
    pub const SECONDARIES: u32 = 90;
    pub const ACTIVATED: u32 = 100;
    pub const DEACTIVATING: u32 = 110;
    pub const FAILED: u32 = 120;
}

/// `Connection.Active.State`.
pub mod active_state {
    pub const UNKNOWN: u32 = 0;
    pub const ACTIVATING: u32 = 1;
    pub const ACTIVATED: u32 = 2;
    pub const DEACTIVATING: u32 = 3;
    pub const DEACTIVATED: u32 = 4;
}

/// Connection type strings stored in `connection.type`.
pub mod connection_type {
    pub const WIRELESS: &str = "802-11-wireless";
    pub const ETHERNET: &str = "802-3-ethernet";
    pub const VPN: &str = "vpn";
    pub const WIREGUARD: &str = "wireguard";
}

/// `AccessPoint.Mode`.
pub mod wifi_mode {
    pub const ADHOC: u32 = 1;
    pub const INFRA: u32 = 2;
    pub const AP: u32 = 3;
}

/// Autoconnect priorities and route metrics for the media preference.
pub mod priority {
    pub const HIGH: i32 = 100;
    pub const LOW: i32 = 10;
    pub const DEFAULT: i32 = 0;

    pub const METRIC_PREFERRED: u32 = 100;
    pub const METRIC_NON_PREFERRED: u32 = 300;
    pub const METRIC_DEFAULT: u32 = 100;
}

/// Default tuning values for [`ManagerConfig`](crate::ManagerConfig).
pub mod defaults {
    use std::time::Duration;

    pub const DEBOUNCE: Duration = Duration::from_millis(200);
    pub const SUBSCRIBER_CAPACITY: usize = 64;
    pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(120);
    pub const VPN_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const VPN_SETTLE_POLL: Duration = Duration::from_millis(100);
    pub const STRENGTH_HYSTERESIS: u8 = 5;
    pub const RECENT_FAILURE_WINDOW: Duration = Duration::from_secs(10);
    pub const NMCLI: &str = "nmcli";

    pub const PLUGIN_DIRS: [&str; 3] = [
        "/usr/lib/NetworkManager/VPN",
        "/usr/lib64/NetworkManager/VPN",
        "/etc/NetworkManager/VPN",
    ];
}

/// Upper and lower bounds of each meter cell, in percent.
pub mod signal_strength {
    pub const BAR_1_MAX: u8 = 24;
    pub const BAR_2_MIN: u8 = BAR_1_MAX + 1;
    pub const BAR_2_MAX: u8 = 49;
    pub const BAR_3_MIN: u8 = BAR_2_MAX + 1;
    pub const BAR_3_MAX: u8 = 74;
}

/// Band edges in MHz.
pub mod frequency {
    pub const BAND_2_4_START: u32 = 2412;
    pub const BAND_2_4_END: u32 = 2472;
    pub const BAND_2_4_CH14: u32 = 2484;
    pub const BAND_5_START: u32 = 5150;
    pub const BAND_5_END: u32 = 5925;
    pub const BAND_6_START: u32 = 5955;
    pub const BAND_6_END: u32 = 7115;
    pub const CHANNEL_SPACING: u32 = 5;
}
