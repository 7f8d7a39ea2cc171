//! Wi-Fi flows against the in-memory bus.

mod common;

use common::{FakeBus, FakeRunner, ap, manager, settle};
use nmctl::types::constants::bus::{DEVICE_IFACE, WIRELESS_IFACE};
use nmctl::types::constants::device_state;
use nmctl::{ConnectionError, ConnectionRequest, SettingValue};

const WLAN: &str = "/org/freedesktop/NetworkManager/Devices/1";
const SECURITY: &str = "802-11-wireless-security";

#[tokio::test]
async fn test_network_list_keeps_strongest_access_point_per_ssid() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![
        ap("Cafe", "00:00:00:00:00:01", 40, 2412),
        ap("Cafe", "00:00:00:00:00:02", 70, 5180),
        ap("Library", "00:00:00:00:00:03", 55, 2437),
    ]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let state = nm.state();
    let cafe: Vec<_> = state.wifi_networks.iter().filter(|n| n.ssid == "Cafe").collect();
    assert_eq!(cafe.len(), 1);
    assert_eq!(cafe[0].signal, 70);
    assert_eq!(cafe[0].frequency, 5180);
    assert_eq!(cafe[0].bssid, "00:00:00:00:00:02");
    assert_eq!(state.wifi_networks.len(), 2);
    assert_eq!(state.wifi_networks[0].ssid, "Cafe");
}

#[tokio::test]
async fn test_scan_requires_radio_and_device() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    nm.scan_wifi(None).await.unwrap();
    assert_eq!(*wlan.scans.lock().unwrap(), 1);

    assert!(matches!(
        nm.scan_wifi(Some("wlan9")).await,
        Err(ConnectionError::DeviceNotFound(name)) if name == "wlan9"
    ));

    nm.set_wifi_enabled(false).await.unwrap();
    assert!(matches!(
        nm.scan_wifi(None).await,
        Err(ConnectionError::WifiDisabled)
    ));
    assert!(nm.toggle_wifi().await.unwrap());
    assert!(nm.state().wifi_enabled);
}

#[tokio::test]
async fn test_sae_only_access_point_gets_protected_management_frames() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    let mut wpa3 = ap("Modern", "00:00:00:00:00:04", 80, 5200);
    wpa3.flags = 0x1;
    wpa3.rsn_flags = 0x400 | 0x8;
    wlan.set_access_points(vec![wpa3]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let request = ConnectionRequest {
        password: Some("correct horse".into()),
        ..ConnectionRequest::new("Modern")
    };
    nm.connect_wifi(&request).await.unwrap();

    let added = bus.added();
    assert_eq!(added.len(), 1);
    let security = &added[0][SECURITY];
    assert_eq!(security["key-mgmt"], SettingValue::from("sae"));
    assert_eq!(security["pmf"], SettingValue::I32(3));
    assert_eq!(security["psk"], SettingValue::from("correct horse"));
    assert!(nm.is_connecting_to("Modern"));
}

#[tokio::test]
async fn test_enterprise_access_point_defaults_to_peap_mschapv2() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    let mut corp = ap("Corp", "00:00:00:00:00:05", 65, 5500);
    corp.flags = 0x1;
    corp.rsn_flags = 0x200 | 0x8;
    wlan.set_access_points(vec![corp]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let request = ConnectionRequest {
        username: Some("alice".into()),
        password: Some("s3cret".into()),
        ..ConnectionRequest::new("Corp")
    };
    nm.connect_wifi(&request).await.unwrap();

    let added = bus.added();
    assert_eq!(added[0][SECURITY]["key-mgmt"], SettingValue::from("wpa-eap"));
    let eap = &added[0]["802-1x"];
    assert_eq!(eap["eap"], SettingValue::StrList(vec!["peap".into()]));
    assert_eq!(eap["phase2-auth"], SettingValue::from("mschapv2"));
}

#[tokio::test]
async fn test_interactive_request_leaves_secret_out_of_profile() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    let mut home = ap("Home", "00:00:00:00:00:06", 75, 2462);
    home.flags = 0x1;
    home.wpa_flags = 0x100;
    wlan.set_access_points(vec![home]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let request = ConnectionRequest {
        password: Some("hunter22".into()),
        interactive: true,
        ..ConnectionRequest::new("Home")
    };
    nm.connect_wifi(&request).await.unwrap();

    assert_eq!(bus.calls_starting_with("add_connection").len(), 1);
    assert!(bus.calls_starting_with("add_and_activate").is_empty());
    let security = &bus.added()[0][SECURITY];
    assert_eq!(security["key-mgmt"], SettingValue::from("wpa-psk"));
    assert!(!security.contains_key("psk"));
}

#[tokio::test]
async fn test_unsupported_security_fails_and_clears_progress() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    let mut odd = ap("Odd", "00:00:00:00:00:07", 50, 2412);
    odd.flags = 0x1;
    odd.wpa_flags = 0x8;
    wlan.set_access_points(vec![odd]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let request = ConnectionRequest {
        password: Some("whatever".into()),
        ..ConnectionRequest::new("Odd")
    };
    let err = nm.connect_wifi(&request).await.unwrap_err();
    assert!(matches!(err, ConnectionError::UnsupportedSecurity { .. }));

    let state = nm.state();
    assert!(!state.is_connecting);
    assert!(state.connecting_ssid.is_empty());
    assert!(!state.last_error.is_empty());
    assert!(nm.was_recently_failed("Odd"));
    assert!(!nm.was_recently_failed("Home"));
}

#[tokio::test]
async fn test_saved_profile_is_activated_and_attempt_settles_on_signal() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![ap("Home", "00:00:00:00:00:08", 72, 2437)]);
    let profile = bus.save_wifi("Home");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    nm.connect_wifi(&ConnectionRequest::new("Home")).await.unwrap();
    assert_eq!(bus.calls_starting_with("activate"), [format!("activate {profile} {WLAN}")]);
    assert!(bus.added().is_empty());
    assert!(nm.is_connecting_to("Home"));

    wlan.associate("00:00:00:00:00:08");
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::ACTIVATED))],
    );
    bus.emit_properties(
        WLAN,
        WIRELESS_IFACE,
        &[("ActiveAccessPoint", SettingValue::from("/ap/8"))],
    );
    settle().await;

    let state = nm.state();
    assert!(!state.is_connecting);
    assert!(state.wifi_connected);
    assert_eq!(state.wifi_ssid, "Home");
    assert_eq!(state.wifi_signal, 72);
    assert!(state.wifi_networks[0].connected);
    assert!(state.wifi_networks[0].saved);
}

#[tokio::test]
async fn test_failed_signal_settles_attempt_after_device_moved_on() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![ap("Home", "00:00:00:00:00:08", 72, 2437)]);
    bus.save_wifi("Home");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    nm.connect_wifi(&ConnectionRequest::new("Home")).await.unwrap();
    assert!(nm.is_connecting_to("Home"));

    // The device already reads DISCONNECTED when the FAILED signal is handled.
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::FAILED))],
    );
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::DISCONNECTED))],
    );
    settle().await;

    let state = nm.state();
    assert!(!state.is_connecting);
    assert!(state.connecting_ssid.is_empty());
    assert_eq!(state.last_error, "failed to connect to Home");
    assert!(nm.was_recently_failed("Home"));
}

#[tokio::test]
async fn test_disconnect_after_activation_started_fails_attempt() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![ap("Home", "00:00:00:00:00:08", 72, 2437)]);
    bus.save_wifi("Home");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    nm.connect_wifi(&ConnectionRequest::new("Home")).await.unwrap();

    wlan.set_state(device_state::CONFIG);
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::CONFIG))],
    );
    settle().await;
    assert!(nm.is_connecting_to("Home"));

    wlan.set_state(device_state::DISCONNECTED);
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::DISCONNECTED))],
    );
    settle().await;

    let state = nm.state();
    assert!(!state.is_connecting);
    assert!(!state.last_error.is_empty());
    assert!(nm.was_recently_failed("Home"));
}

#[tokio::test]
async fn test_disconnected_before_activation_keeps_attempt_running() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![ap("Home", "00:00:00:00:00:08", 72, 2437)]);
    bus.save_wifi("Home");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    nm.connect_wifi(&ConnectionRequest::new("Home")).await.unwrap();
    bus.emit_properties(
        WLAN,
        DEVICE_IFACE,
        &[("State", SettingValue::U32(device_state::DISCONNECTED))],
    );
    settle().await;

    assert!(nm.is_connecting_to("Home"));
    assert!(nm.state().last_error.is_empty());
}

#[tokio::test]
async fn test_forgetting_connected_network_clears_live_fields() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![ap("Home", "00:00:00:00:00:09", 60, 2412)]);
    wlan.associate("00:00:00:00:00:09");
    bus.save_wifi("Home");
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;
    assert!(nm.state().wifi_connected);

    nm.forget_wifi("Home").await.unwrap();

    let state = nm.state();
    assert!(!state.wifi_connected);
    assert!(state.wifi_ssid.is_empty());
    assert_eq!(bus.calls_starting_with("delete_connection").len(), 1);
    assert!(matches!(
        nm.forget_wifi("Home").await,
        Err(ConnectionError::ConnectionNotFound(_))
    ));
}

#[tokio::test]
async fn test_network_details_list_every_band() {
    let bus = FakeBus::new();
    let wlan = bus.add_wifi(WLAN, "wlan0");
    wlan.set_access_points(vec![
        ap("Mesh", "00:00:00:00:00:0a", 30, 2412),
        ap("Mesh", "00:00:00:00:00:0b", 90, 5745),
    ]);
    let runner = FakeRunner::new();
    let nm = manager(&bus, &runner).await;

    let details = nm.wifi_network_details("Mesh").await.unwrap();
    assert_eq!(details.bands.len(), 2);
    assert_eq!(details.bands[0].signal, 90);
    assert_eq!(details.bands[0].channel, 149);
    assert_eq!(details.bands[1].channel, 1);

    assert!(matches!(
        nm.wifi_network_details("Nowhere").await,
        Err(ConnectionError::NetworkNotFound(_))
    ));
}
