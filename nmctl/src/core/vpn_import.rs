//! VPN plugin discovery and provider-file import.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::Result;
use crate::api::models::{VpnImportResult, VpnPlugin};
use crate::core::Context;
use crate::core::settings;
use crate::core::vpn;

/// Plugin types handed to `nmcli connection import`, in the order tried.
const IMPORT_TYPES: [&str; 7] = [
    "openvpn",
    "wireguard",
    "vpnc",
    "pptp",
    "l2tp",
    "openconnect",
    "strongswan",
];

/// Parses a `*.name` plugin descriptor. `None` if it names no service.
pub(crate) fn parse_descriptor(contents: &str) -> Option<VpnPlugin> {
    let mut plugin = VpnPlugin::default();

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "name" => plugin.name = value.to_string(),
            "service" => plugin.service_type = value.to_string(),
            "program" => plugin.program = value.to_string(),
            "supports" => {
                plugin.supports = value.split(',').map(|s| s.trim().to_string()).collect();
            }
            _ => {}
        }
    }

    if plugin.service_type.is_empty() {
        return None;
    }
    plugin.file_extensions = file_extensions(&plugin.service_type);
    Some(plugin)
}

/// Provider-file extensions a plugin is expected to import.
pub(crate) fn file_extensions(service_type: &str) -> Vec<String> {
    let exts: &[&str] = if service_type.contains("openvpn") {
        &[".ovpn", ".conf"]
    } else if service_type.contains("vpnc") || service_type.contains("cisco") {
        &[".pcf", ".conf"]
    } else if service_type.contains("strongswan") || service_type.contains("ipsec") {
        &[".conf", ".sswan"]
    } else {
        &[".conf"]
    };
    exts.iter().map(|e| e.to_string()).collect()
}

/// Installed plugins across `dirs`, one per service type, sorted by name
/// ignoring case. Unreadable directories and files are skipped.
pub(crate) fn list_plugins(dirs: &[PathBuf]) -> Vec<VpnPlugin> {
    let mut seen = HashSet::new();
    let mut plugins = Vec::new();

    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "name"))
            .collect();
        files.sort();

        for file in files {
            let plugin = match fs::read_to_string(&file) {
                Ok(contents) => parse_descriptor(&contents),
                Err(e) => {
                    debug!("Failed to read {}: {e}", file.display());
                    continue;
                }
            };
            let Some(plugin) = plugin else {
                debug!("{} has no service type", file.display());
                continue;
            };
            if seen.insert(plugin.service_type.clone()) {
                plugins.push(plugin);
            }
        }
    }

    plugins.sort_by_key(|p| p.name.to_lowercase());
    plugins
}

/// The UUID from `nmcli`'s "Connection 'x' (uuid) successfully added." line.
pub(crate) fn parse_added_uuid(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains("successfully added"))?;
    let start = line.find('(')? + 1;
    let end = start + line[start..].find(')')?;
    let uuid = line[start..end].trim();
    (!uuid.is_empty()).then(|| uuid.to_string())
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Imports a provider file, trying each plugin type until `nmcli` accepts
/// it. Failure to import is reported in the result, not as an error.
pub(crate) async fn import(ctx: &Context, path: &Path, name: Option<&str>) -> Result<VpnImportResult> {
    if !path.exists() {
        return Ok(VpnImportResult {
            success: false,
            error: format!("file not found: {}", path.display()),
            ..Default::default()
        });
    }

    let file = path.to_string_lossy().into_owned();
    let mut errors = Vec::new();
    let mut output = None;
    for kind in IMPORT_TYPES {
        let args: Vec<String> = ["connection", "import", "type", kind, "file", file.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match ctx.runner.run(&ctx.config.nmcli, &args).await {
            Ok(out) if out.success => {
                info!("Imported {file} as {kind}");
                output = Some(out.stdout);
                break;
            }
            Ok(out) => errors.push(format!("{kind}: {}", out.combined())),
            Err(e) => errors.push(format!("{kind}: {e}")),
        }
    }
    let Some(output) = output else {
        return Ok(VpnImportResult {
            success: false,
            error: errors.join("\n"),
            ..Default::default()
        });
    };

    let name = name.filter(|n| !n.is_empty());
    let mut uuid = parse_added_uuid(&output);
    let mut connection_name = String::new();

    if let (Some(uuid), Some(name)) = (uuid.as_deref(), name) {
        let args: Vec<String> = ["connection", "modify", uuid, "connection.id", name]
            .iter()
            .map(|s| s.to_string())
            .collect();
        match ctx.runner.run(&ctx.config.nmcli, &args).await {
            Ok(out) if out.success => connection_name = name.to_string(),
            Ok(out) => warn!("Failed to rename imported VPN: {}", out.combined()),
            Err(e) => warn!("Failed to rename imported VPN: {e}"),
        }
    }

    let connections = ctx.bus.list_connections().await.unwrap_or_default();
    if uuid.is_none() {
        let base = base_name(path);
        let found = connections.iter().find(|c| {
            let id = settings::conn_id(&c.settings);
            settings::is_vpn(&c.settings) && (id.contains(&base) || Some(id) == name)
        });
        if let Some(found) = found {
            uuid = Some(settings::conn_uuid(&found.settings).to_string());
            connection_name = settings::conn_id(&found.settings).to_string();
        }
    }

    let uuid = uuid.unwrap_or_default();
    let imported = settings::find_uuid(&connections, &uuid);
    let service_type = imported
        .map(|c| settings::vpn_service_type(&c.settings).to_string())
        .unwrap_or_default();
    if connection_name.is_empty() {
        if let Some(c) = imported {
            connection_name = settings::conn_id(&c.settings).to_string();
        }
    }

    vpn::refresh_profiles(ctx).await;
    ctx.notify();

    Ok(VpnImportResult {
        success: true,
        uuid,
        name: connection_name,
        service_type,
        error: String::new(),
    })
}
