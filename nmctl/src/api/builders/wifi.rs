//! Wi-Fi connection settings.
//!
//! Constructs the settings NetworkManager needs to create a wireless
//! profile. The security mode is decided by [`classify_security`] from the
//! access point's advertised flags, or from the supplied credentials for
//! hidden networks that advertise nothing.
//!
//! # NetworkManager Settings Structure
//!
//! - `connection`: General settings (type, id, uuid, autoconnect)
//! - `802-11-wireless`: Wi-Fi specific settings (ssid, mode, security reference)
//! - `802-11-wireless-security`: Security settings (key-mgmt, psk, pmf)
//! - `802-1x`: Enterprise authentication settings (for WPA-EAP)
//! - `ipv4` / `ipv6`: IP configuration (always "auto")

use std::collections::HashMap;

use log::info;

use super::connection_builder::ConnectionBuilder;
use crate::Result;
use crate::api::models::{ConnectionError, ConnectionRequest};
use crate::dbus::bus::AccessPoint;
use crate::dbus::values::{SettingValue, Settings};
use crate::types::constants::connection_type;
use crate::types::security::ApSecurityFlags;

const SECURITY_SECTION: &str = "802-11-wireless-security";
const DEFAULT_EAP_METHOD: &str = "peap";
const DEFAULT_PHASE2: &str = "mschapv2";
/// Protected management frames: required.
const PMF_REQUIRED: i32 = 3;

/// Key management chosen for a new profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiSecurityKind {
    Open,
    /// WPA-EAP with an 802.1X sub-profile.
    Enterprise,
    /// WPA/WPA2 personal.
    Psk,
    /// WPA3 personal.
    Sae,
}

/// Decides how to secure a profile for `request`.
///
/// `ap` is the target access point; hidden networks pass `None` and are
/// classified from the credentials alone. A username always selects
/// enterprise. Otherwise 802.1X beats PSK, which beats SAE.
pub fn classify_security(
    request: &ConnectionRequest,
    ap: Option<&AccessPoint>,
) -> Result<WifiSecurityKind> {
    let has_password = request.password.as_deref().is_some_and(|p| !p.is_empty());
    let has_username = request.username.as_deref().is_some_and(|u| !u.is_empty());

    let (secured, enterprise, psk, sae, wpa, rsn) = match ap {
        None => (
            has_password || has_username,
            has_username,
            has_password && !has_username,
            false,
            0,
            0,
        ),
        Some(ap) => {
            let sec = ApSecurityFlags::from_ap(ap.wpa_flags, ap.rsn_flags);
            (
                ap.flags != 0 || ap.wpa_flags != 0 || ap.rsn_flags != 0,
                sec.enterprise(),
                sec.psk(),
                sec.sae(),
                ap.wpa_flags,
                ap.rsn_flags,
            )
        }
    };

    if !secured {
        return Ok(WifiSecurityKind::Open);
    }
    if enterprise || has_username {
        return Ok(WifiSecurityKind::Enterprise);
    }
    if psk {
        return Ok(WifiSecurityKind::Psk);
    }
    if sae {
        return Ok(WifiSecurityKind::Sae);
    }
    Err(ConnectionError::UnsupportedSecurity { rsn, wpa })
}

fn file_uri(path: &str) -> SettingValue {
    SettingValue::Bytes(format!("file://{path}").into_bytes())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Builder for wireless profiles created from a [`ConnectionRequest`].
///
/// # Example
///
/// ```rust
/// use nmctl::ConnectionRequest;
/// use nmctl::builders::{WifiConnectionBuilder, WifiSecurityKind};
///
/// let req = ConnectionRequest {
///     password: Some("correct horse".into()),
///     ..ConnectionRequest::new("HomeNet")
/// };
/// let settings = WifiConnectionBuilder::new(&req)
///     .security(WifiSecurityKind::Psk)
///     .build();
/// assert!(settings.contains_key("802-11-wireless-security"));
/// ```
#[derive(Debug)]
pub struct WifiConnectionBuilder<'a> {
    request: &'a ConnectionRequest,
    security: WifiSecurityKind,
}

impl<'a> WifiConnectionBuilder<'a> {
    pub fn new(request: &'a ConnectionRequest) -> Self {
        Self {
            request,
            security: WifiSecurityKind::Open,
        }
    }

    pub fn security(mut self, kind: WifiSecurityKind) -> Self {
        self.security = kind;
        self
    }

    pub fn build(self) -> Settings {
        let req = self.request;
        let mut builder = ConnectionBuilder::new(connection_type::WIRELESS, &req.ssid)
            .autoconnect(true)
            .ipv4_auto()
            .ipv6_auto()
            .set(
                connection_type::WIRELESS,
                "ssid",
                req.ssid.as_bytes().to_vec(),
            )
            .set(connection_type::WIRELESS, "mode", "infrastructure");

        if req.hidden {
            builder = builder.set(connection_type::WIRELESS, "hidden", true);
        }

        if self.security != WifiSecurityKind::Open {
            builder = builder.set(connection_type::WIRELESS, "security", SECURITY_SECTION);
        }

        // Interactive requests leave the secret out so NetworkManager asks for it.
        let embedded_psk = non_empty(&req.password).filter(|_| !req.interactive);

        match self.security {
            WifiSecurityKind::Open => {}
            WifiSecurityKind::Enterprise => {
                builder = builder
                    .set(SECURITY_SECTION, "key-mgmt", "wpa-eap")
                    .with_section("802-1x", Self::eap_section(req));
            }
            WifiSecurityKind::Psk => {
                builder = builder
                    .set(SECURITY_SECTION, "key-mgmt", "wpa-psk")
                    .set(SECURITY_SECTION, "psk-flags", 0u32);
                if let Some(psk) = embedded_psk {
                    builder = builder.set(SECURITY_SECTION, "psk", psk);
                }
            }
            WifiSecurityKind::Sae => {
                builder = builder
                    .set(SECURITY_SECTION, "key-mgmt", "sae")
                    .set(SECURITY_SECTION, "pmf", PMF_REQUIRED)
                    .set(SECURITY_SECTION, "psk-flags", 0u32);
                if let Some(psk) = embedded_psk {
                    builder = builder.set(SECURITY_SECTION, "psk", psk);
                }
            }
        }

        builder.build()
    }

    fn eap_section(req: &ConnectionRequest) -> HashMap<String, SettingValue> {
        let method = non_empty(&req.eap_method).unwrap_or(DEFAULT_EAP_METHOD);
        let phase2 = non_empty(&req.phase2_auth).unwrap_or(DEFAULT_PHASE2);

        let mut x = HashMap::new();
        x.insert("eap".to_string(), SettingValue::from(vec![method.to_string()]));
        x.insert(
            "system-ca-certs".to_string(),
            SettingValue::from(req.use_system_ca_certs.unwrap_or(false)),
        );
        x.insert("password-flags".to_string(), SettingValue::from(0u32));

        match method {
            "peap" | "ttls" => {
                x.insert("phase2-auth".to_string(), SettingValue::from(phase2));
            }
            "tls" => {
                if let Some(cert) = non_empty(&req.client_cert_path) {
                    x.insert("client-cert".to_string(), file_uri(cert));
                }
                if let Some(key) = non_empty(&req.private_key_path) {
                    x.insert("private-key".to_string(), file_uri(key));
                }
                if let Some(pw) = non_empty(&req.private_key_password) {
                    x.insert("private-key-password".to_string(), SettingValue::from(pw));
                }
            }
            _ => {}
        }

        if let Some(identity) = non_empty(&req.username) {
            x.insert("identity".to_string(), SettingValue::from(identity));
        }
        if let Some(password) = non_empty(&req.password) {
            x.insert("password".to_string(), SettingValue::from(password));
        }
        if let Some(anon) = non_empty(&req.anonymous_identity) {
            x.insert("anonymous-identity".to_string(), SettingValue::from(anon));
        }
        if let Some(domain) = non_empty(&req.domain_suffix_match) {
            x.insert("domain-suffix-match".to_string(), SettingValue::from(domain));
        }
        if let Some(ca) = non_empty(&req.ca_cert_path) {
            x.insert("ca-cert".to_string(), file_uri(ca));
        }

        info!(
            "WPA-EAP settings for {}: eap={method}, identity={}, interactive={}",
            req.ssid,
            req.username.as_deref().unwrap_or_default(),
            req.interactive
        );
        x
    }
}
