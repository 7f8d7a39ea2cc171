//! VPN controller.
//!
//! Covers saved VPN and WireGuard profiles: listing, activation with an
//! optional credential pre-flight, the connect-progress tracking driven by
//! the reconciler, and profile edits.

use std::collections::HashMap;
use std::pin::pin;

use futures::{FutureExt, select};
use futures_timer::Delay;
use log::{debug, info, warn};

use crate::Result;
use crate::api::models::{
    ActiveConnectionState, ConnectionError, FieldInfo, PromptRequest, VpnActive, VpnConfig,
    VpnConfigUpdate, VpnProfile,
};
use crate::core::Context;
use crate::core::connectivity;
use crate::core::secrets::PendingSave;
use crate::core::settings::{self, vpn_data, vpn_service_type};
use crate::dbus::bus::{ActiveConnection, SavedConnection};
use crate::types::constants::{active_state, connection_type};

/// `vpn.data` `password-flags` values.
mod password_flags {
    pub(super) const SAVED: &str = "0";
    pub(super) const AGENT_OWNED: &str = "1";
    pub(super) const NOT_SAVED: &str = "2";
}

fn is_vpn_active(c: &ActiveConnection) -> bool {
    matches!(
        c.connection_type.as_str(),
        connection_type::VPN | connection_type::WIREGUARD
    )
}

fn matches_target(c: &ActiveConnection, uuid_or_name: &str) -> bool {
    c.uuid == uuid_or_name || c.id == uuid_or_name
}

/// Data keys that may carry a secret.
pub(crate) fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("password") || key.contains("secret") || key.contains("key")
}

fn public_data(data: HashMap<String, String>) -> HashMap<String, String> {
    data.into_iter().filter(|(k, _)| !is_secret_key(k)).collect()
}

/// OpenVPN in password mode cannot activate without a username in its data.
pub(crate) fn needs_username_prompt(service_type: &str, data: &HashMap<String, String>) -> bool {
    if !service_type.contains("openvpn") {
        return false;
    }
    let mode = data.get("connection-type").map(String::as_str);
    matches!(mode, Some("password" | "password-tls"))
        && data.get("username").is_none_or(|u| u.is_empty())
}

fn profile_from(conn: &SavedConnection) -> VpnProfile {
    let s = &conn.settings;
    let kind = settings::conn_type(s);
    let (service_type, data) = if kind == connection_type::VPN {
        (vpn_service_type(s).to_string(), vpn_data(s))
    } else {
        (String::new(), HashMap::new())
    };

    VpnProfile {
        name: settings::conn_id(s).to_string(),
        uuid: settings::conn_uuid(s).to_string(),
        connection_type: kind.to_string(),
        service_type,
        remote_host: data.get("remote").cloned().unwrap_or_default(),
        username: data.get("username").cloned().unwrap_or_default(),
        autoconnect: settings::autoconnect(s),
        data: public_data(data),
    }
}

/// Re-enumerates saved VPN profiles, sorted by name ignoring case.
pub(crate) async fn refresh_profiles(ctx: &Context) {
    let connections = match ctx.bus.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to list saved connections: {e}");
            return;
        }
    };

    let mut profiles: Vec<VpnProfile> = connections
        .iter()
        .filter(|c| settings::is_vpn(&c.settings))
        .map(profile_from)
        .collect();
    profiles.sort_by_key(|p| p.name.to_lowercase());

    ctx.store.update(|s| s.vpn_profiles = profiles);
}

/// Re-enumerates live VPN connections.
pub(crate) async fn refresh_active(ctx: &Context) {
    let active = match ctx.bus.active_connections().await {
        Ok(a) => a,
        Err(e) => {
            warn!("Failed to list active connections: {e}");
            return;
        }
    };
    let connections = ctx.bus.list_connections().await.unwrap_or_default();

    let vpns: Vec<VpnActive> = active
        .into_iter()
        .filter(is_vpn_active)
        .map(|c| {
            let saved = connections.iter().find(|s| s.path == c.connection);
            let (service_type, data) = match saved {
                Some(s) if c.connection_type == connection_type::VPN => {
                    (vpn_service_type(&s.settings).to_string(), vpn_data(&s.settings))
                }
                _ => (String::new(), HashMap::new()),
            };
            let ip4 = c.ip4.unwrap_or_default();

            VpnActive {
                name: c.id,
                uuid: c.uuid,
                device: c.device,
                state: ActiveConnectionState::from(c.state).to_string(),
                connection_type: c.connection_type,
                service_type,
                ip: ip4.address,
                gateway: ip4.gateway,
                remote_host: data.get("remote").cloned().unwrap_or_default(),
                username: data.get("username").cloned().unwrap_or_default(),
                mtu: c.mtu,
                data: public_data(data),
            }
        })
        .collect();

    ctx.store.update(|s| s.vpn_active = vpns);
}

/// Polls until no active connection satisfies `still_up`, bounded by
/// `vpn_settle_timeout`. Returns `false` on timeout.
async fn wait_until_inactive(ctx: &Context, still_up: impl Fn(&ActiveConnection) -> bool) -> bool {
    let poll = ctx.config.vpn_settle_poll;
    let mut settled = pin!(
        async {
            loop {
                match ctx.bus.active_connections().await {
                    Ok(active) if !active.iter().any(&still_up) => return,
                    Ok(_) => {}
                    Err(e) => warn!("Failed to list active connections: {e}"),
                }
                Delay::new(poll).await;
            }
        }
        .fuse()
    );
    let mut deadline = pin!(Delay::new(ctx.config.vpn_settle_timeout).fuse());

    select! {
        _ = settled => true,
        _ = deadline => {
            warn!(
                "VPN connections still active after {:?}",
                ctx.config.vpn_settle_timeout
            );
            false
        }
    }
}

/// Activates a saved VPN profile.
///
/// With `single_active`, other active VPNs are brought down first and the
/// call waits (bounded) for them to go away. Asking for a VPN that is
/// already active is a no-op.
pub(crate) async fn connect(ctx: &Context, uuid_or_name: &str, single_active: bool) -> Result<()> {
    if single_active {
        let active: Vec<ActiveConnection> = ctx
            .bus
            .active_connections()
            .await?
            .into_iter()
            .filter(is_vpn_active)
            .collect();

        if active.iter().any(|c| matches_target(c, uuid_or_name)) {
            debug!("VPN {uuid_or_name} already active");
            return Ok(());
        }
        if !active.is_empty() {
            if let Err(e) = disconnect_all(ctx).await {
                warn!("Failed to disconnect existing VPNs: {e}");
            }
            wait_until_inactive(ctx, is_vpn_active).await;
        }
    }

    let connections = ctx.bus.list_connections().await?;
    let target = settings::find_vpn(&connections, uuid_or_name)
        .ok_or_else(|| ConnectionError::VpnNotFound(uuid_or_name.to_string()))?;
    let uuid = settings::conn_uuid(&target.settings).to_string();

    let service = vpn_service_type(&target.settings);
    if needs_username_prompt(service, &vpn_data(&target.settings)) {
        if let Err(e) = prompt_for_username(ctx, target).await {
            ctx.store.update(|s| s.last_error = e.to_string());
            ctx.notify();
            return Err(e);
        }
    }

    ctx.store.update(|s| {
        s.is_connecting_vpn = true;
        s.connecting_vpn_uuid = uuid.clone();
        s.last_error.clear();
    });
    ctx.notify();

    info!("Activating VPN {}", settings::conn_id(&target.settings));
    if let Err(e) = ctx.bus.activate(&target.path, None, None).await {
        let err = ConnectionError::VpnActivationFailed(e.to_string());
        ctx.fail_vpn_attempt(&err.to_string());
        return Err(err);
    }
    Ok(())
}

/// Asks for the username (and optionally the password) an OpenVPN profile
/// is missing and writes it into the profile before activation.
async fn prompt_for_username(ctx: &Context, target: &SavedConnection) -> Result<()> {
    let name = settings::conn_id(&target.settings).to_string();
    let uuid = settings::conn_uuid(&target.settings).to_string();
    info!("{name} needs a username before activation, prompting");

    let token = ctx.broker.ask(PromptRequest {
        name: name.clone(),
        conn_type: connection_type::VPN.to_string(),
        vpn_service: vpn_service_type(&target.settings).to_string(),
        setting: "vpn".to_string(),
        fields: vec!["username".to_string(), "password".to_string()],
        fields_info: vec![
            FieldInfo {
                name: "username".to_string(),
                label: "Username".to_string(),
                is_secret: false,
            },
            FieldInfo {
                name: "password".to_string(),
                label: "Password".to_string(),
                is_secret: true,
            },
        ],
        reason: "required".to_string(),
        connection_id: name,
        connection_uuid: uuid.clone(),
        connection_path: target.path.clone(),
        ..Default::default()
    })?;

    let reply = ctx.broker.wait(&token, ctx.config.prompt_timeout).await?;
    if reply.cancel {
        return Err(ConnectionError::UserCancelled);
    }

    let username = reply.secrets.get("username").map(String::as_str).unwrap_or_default();
    let password = reply.secrets.get("password").map(String::as_str).unwrap_or_default();
    if username.is_empty() {
        return Ok(());
    }

    let saved_password = (reply.save && !password.is_empty()).then_some(password);
    write_credentials(ctx, target, username, saved_password).await?;
    debug!("Username saved to {}", target.path);

    if !password.is_empty() && !reply.save {
        ctx.secrets.put_one_time(
            &uuid,
            HashMap::from([("password".to_string(), password.to_string())]),
        );
    }
    Ok(())
}

/// Writes the username, and the password if given, into a profile on disk.
async fn write_credentials(
    ctx: &Context,
    target: &SavedConnection,
    username: &str,
    password: Option<&str>,
) -> Result<()> {
    let mut updated = target.settings.clone();
    let mut data = vpn_data(&updated);
    if !username.is_empty() {
        data.insert("username".to_string(), username.to_string());
    }
    if let Some(password) = password {
        data.insert("password-flags".to_string(), password_flags::SAVED.to_string());
        let secrets = HashMap::from([("password".to_string(), password.to_string())]);
        settings::set(&mut updated, "vpn", "secrets", secrets);
    }
    settings::set(&mut updated, "vpn", "data", data);
    settings::strip_ip_keys(&mut updated);

    ctx.bus.save_connection(&target.path, &updated).await
}

async fn persist_pending_save(ctx: &Context, save: PendingSave) {
    let connections = match ctx.bus.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to list connections to save VPN credentials: {e}");
            return;
        }
    };
    let Some(target) = connections.iter().find(|c| c.path == save.connection_path) else {
        warn!("VPN profile {} is gone, dropping credentials", save.connection_path);
        return;
    };

    match write_credentials(ctx, target, &save.username, save.password.as_deref()).await {
        Ok(()) => info!("Saved credentials for {}", save.connection_path),
        Err(e) => warn!("Failed to save VPN credentials: {e}"),
    }
}

/// Settles the tracked VPN attempt from the live active-connection list.
pub(crate) async fn update_connection_state(ctx: &Context) {
    let (connecting, uuid) = ctx
        .store
        .read(|s| (s.is_connecting_vpn, s.connecting_vpn_uuid.clone()));
    if !connecting || uuid.is_empty() {
        return;
    }

    let active = match ctx.bus.active_connections().await {
        Ok(a) => a,
        Err(e) => {
            warn!("Failed to list active connections: {e}");
            return;
        }
    };

    match active.iter().find(|c| is_vpn_active(c) && c.uuid == uuid) {
        Some(c) if c.state == active_state::ACTIVATED => {
            info!("VPN {} connected", c.id);
            ctx.store.update(|s| {
                s.is_connecting_vpn = false;
                s.connecting_vpn_uuid.clear();
                s.last_error.clear();
            });
            if let Some(save) = ctx.secrets.on_activated(&uuid) {
                persist_pending_save(ctx, save).await;
            }
            ctx.notify();
        }
        Some(c) if c.state == active_state::DEACTIVATED => {
            warn!("VPN {} failed", c.id);
            ctx.fail_vpn_attempt("VPN connection failed");
        }
        Some(_) => {}
        None => {
            warn!("VPN connection {uuid} no longer exists");
            ctx.fail_vpn_attempt("VPN connection failed");
        }
    }
}

/// Deactivates the VPN named by UUID or name. Succeeds if the profile exists
/// but is not active.
pub(crate) async fn disconnect(ctx: &Context, uuid_or_name: &str) -> Result<()> {
    let active = ctx.bus.active_connections().await?;
    if let Some(conn) = active
        .iter()
        .find(|c| is_vpn_active(c) && matches_target(c, uuid_or_name))
    {
        info!("Deactivating VPN {}", conn.id);
        ctx.bus.deactivate(&conn.path).await?;
        refresh_active(ctx).await;
        connectivity::refresh_primary(ctx).await;
        ctx.notify();
        return Ok(());
    }

    let connections = ctx.bus.list_connections().await?;
    if settings::find_vpn(&connections, uuid_or_name).is_some() {
        debug!("VPN {uuid_or_name} exists but is not active");
        return Ok(());
    }
    Err(ConnectionError::VpnNotFound(uuid_or_name.to_string()))
}

/// Deactivates every live VPN. Returns the last failure, if any.
pub(crate) async fn disconnect_all(ctx: &Context) -> Result<()> {
    let active = ctx.bus.active_connections().await?;
    let mut last_err = None;
    let mut disconnected = false;

    for conn in active.iter().filter(|c| is_vpn_active(c)) {
        match ctx.bus.deactivate(&conn.path).await {
            Ok(()) => disconnected = true,
            Err(e) => {
                warn!("Failed to deactivate VPN {}: {e}", conn.id);
                last_err = Some(e);
            }
        }
    }

    if disconnected {
        refresh_active(ctx).await;
        connectivity::refresh_primary(ctx).await;
        ctx.notify();
    }
    last_err.map_or(Ok(()), Err)
}

fn find_target<'a>(connections: &'a [SavedConnection], uuid_or_name: &str) -> Result<&'a SavedConnection> {
    settings::find_vpn(connections, uuid_or_name)
        .ok_or_else(|| ConnectionError::VpnNotFound(uuid_or_name.to_string()))
}

/// Forgets stored secrets so the next activation prompts again.
pub(crate) async fn clear_credentials(ctx: &Context, uuid_or_name: &str) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let target = find_target(&connections, uuid_or_name)?;

    let mut updated = target.settings.clone();
    if settings::conn_type(&updated) == connection_type::VPN {
        let mut data = vpn_data(&updated);
        data.insert(
            "password-flags".to_string(),
            password_flags::AGENT_OWNED.to_string(),
        );
        if let Some(vpn) = updated.get_mut("vpn") {
            vpn.remove("secrets");
        }
        settings::set(&mut updated, "vpn", "data", data);
    }
    settings::strip_ip_keys(&mut updated);
    ctx.bus.update_connection(&target.path, &updated).await?;

    if let Err(e) = ctx.bus.clear_secrets(&target.path).await {
        warn!("ClearSecrets failed: {e}");
    }
    info!("Cleared credentials for VPN {}", settings::conn_id(&updated));
    Ok(())
}

/// The editable view of a profile, without secret-bearing data keys.
pub(crate) async fn get_config(ctx: &Context, uuid_or_name: &str) -> Result<VpnConfig> {
    let connections = ctx.bus.list_connections().await?;
    let target = find_target(&connections, uuid_or_name)?;
    let s = &target.settings;

    Ok(VpnConfig {
        uuid: settings::conn_uuid(s).to_string(),
        name: settings::conn_id(s).to_string(),
        connection_type: settings::conn_type(s).to_string(),
        service_type: vpn_service_type(s).to_string(),
        autoconnect: settings::autoconnect(s),
        data: public_data(vpn_data(s)),
    })
}

pub(crate) async fn update_config(ctx: &Context, uuid: &str, update: VpnConfigUpdate) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let target = connections
        .iter()
        .find(|c| settings::is_vpn(&c.settings) && settings::conn_uuid(&c.settings) == uuid)
        .ok_or_else(|| ConnectionError::VpnNotFound(uuid.to_string()))?;

    let mut updated = target.settings.clone();
    if let Some(name) = update.name.filter(|n| !n.is_empty()) {
        settings::set(&mut updated, "connection", "id", name);
    }
    if let Some(autoconnect) = update.autoconnect {
        settings::set(&mut updated, "connection", "autoconnect", autoconnect);
    }
    if let Some(changes) = update.data {
        if updated.contains_key("vpn") {
            let mut data = vpn_data(&updated);
            data.extend(changes);
            settings::set(&mut updated, "vpn", "data", data);
        }
    }
    settings::strip_ip_keys(&mut updated);
    ctx.bus.update_connection(&target.path, &updated).await?;

    refresh_profiles(ctx).await;
    ctx.notify();
    Ok(())
}

/// Stores a username and password on a profile. Without `save` the password
/// is marked not-saved and handed out once from memory instead.
pub(crate) async fn set_credentials(
    ctx: &Context,
    uuid: &str,
    username: &str,
    password: &str,
    save: bool,
) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let target = connections
        .iter()
        .find(|c| settings::is_vpn(&c.settings) && settings::conn_uuid(&c.settings) == uuid)
        .ok_or_else(|| ConnectionError::VpnNotFound(uuid.to_string()))?;

    let mut updated = target.settings.clone();
    let mut data = vpn_data(&updated);
    if !username.is_empty() {
        data.insert("username".to_string(), username.to_string());
    }
    let flags = if save {
        password_flags::SAVED
    } else {
        password_flags::NOT_SAVED
    };
    data.insert("password-flags".to_string(), flags.to_string());
    settings::set(&mut updated, "vpn", "data", data);

    if save && !password.is_empty() {
        let secrets = HashMap::from([("password".to_string(), password.to_string())]);
        settings::set(&mut updated, "vpn", "secrets", secrets);
    } else if let Some(vpn) = updated.get_mut("vpn") {
        vpn.remove("secrets");
    }
    settings::strip_ip_keys(&mut updated);
    ctx.bus.update_connection(&target.path, &updated).await?;

    if !save && !password.is_empty() {
        ctx.secrets.put_one_time(
            uuid,
            HashMap::from([("password".to_string(), password.to_string())]),
        );
    }
    info!("Updated VPN credentials for {uuid} (save={save})");

    refresh_profiles(ctx).await;
    ctx.notify();
    Ok(())
}

/// Deletes a profile, bringing it down first if it is active.
pub(crate) async fn delete(ctx: &Context, uuid_or_name: &str) -> Result<()> {
    let connections = ctx.bus.list_connections().await?;
    let target = find_target(&connections, uuid_or_name)?;
    let uuid = settings::conn_uuid(&target.settings).to_string();

    let active = ctx.bus.active_connections().await?;
    if let Some(conn) = active
        .iter()
        .find(|c| is_vpn_active(c) && c.uuid == uuid)
    {
        match ctx.bus.deactivate(&conn.path).await {
            Ok(()) => {
                wait_until_inactive(ctx, |c| c.uuid == uuid).await;
            }
            Err(e) => warn!("Failed to disconnect VPN before deletion: {e}"),
        }
    }

    ctx.bus.delete_connection(&target.path).await?;
    info!("Deleted VPN {}", settings::conn_id(&target.settings));
    ctx.secrets.on_failed(&uuid);

    refresh_profiles(ctx).await;
    refresh_active(ctx).await;
    ctx.notify();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbus::values::Settings;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const OPENVPN: &str = "org.freedesktop.NetworkManager.openvpn";

    #[test]
    fn openvpn_password_mode_without_username_needs_prompt() {
        assert!(needs_username_prompt(
            OPENVPN,
            &data(&[("connection-type", "password")])
        ));
        assert!(needs_username_prompt(
            OPENVPN,
            &data(&[("connection-type", "password-tls"), ("username", "")])
        ));
    }

    #[test]
    fn prompt_not_needed_with_username_certificates_or_other_plugins() {
        assert!(!needs_username_prompt(
            OPENVPN,
            &data(&[("connection-type", "password"), ("username", "alice")])
        ));
        assert!(!needs_username_prompt(OPENVPN, &data(&[("connection-type", "tls")])));
        assert!(!needs_username_prompt(
            "org.freedesktop.NetworkManager.vpnc",
            &data(&[("connection-type", "password")])
        ));
    }

    #[test]
    fn secret_bearing_keys_are_hidden() {
        let shown = public_data(data(&[
            ("remote", "vpn.example.com"),
            ("password-flags", "1"),
            ("Xauth password", "x"),
            ("static-key", "/etc/k"),
            ("cert-pass-secret", "s"),
        ]));
        assert_eq!(shown, data(&[("remote", "vpn.example.com")]));
    }

    #[test]
    fn profile_projects_remote_and_username() {
        let mut s = Settings::new();
        settings::set(&mut s, "connection", "type", "vpn");
        settings::set(&mut s, "connection", "id", "Office");
        settings::set(&mut s, "connection", "uuid", "u-1");
        settings::set(&mut s, "vpn", "service-type", OPENVPN);
        settings::set(
            &mut s,
            "vpn",
            "data",
            data(&[("remote", "gw.example.com"), ("username", "bob"), ("password-flags", "0")]),
        );
        let profile = profile_from(&SavedConnection {
            path: "/s/1".into(),
            settings: s,
        });

        assert_eq!(profile.name, "Office");
        assert_eq!(profile.remote_host, "gw.example.com");
        assert_eq!(profile.username, "bob");
        assert!(profile.autoconnect);
        assert!(!profile.data.contains_key("password-flags"));
    }

    #[test]
    fn wireguard_profiles_carry_no_plugin_data() {
        let mut s = Settings::new();
        settings::set(&mut s, "connection", "type", "wireguard");
        settings::set(&mut s, "connection", "id", "wg0");
        settings::set(&mut s, "connection", "autoconnect", false);
        let profile = profile_from(&SavedConnection {
            path: "/s/2".into(),
            settings: s,
        });
        assert_eq!(profile.connection_type, "wireguard");
        assert!(profile.service_type.is_empty());
        assert!(!profile.autoconnect);
    }
}
