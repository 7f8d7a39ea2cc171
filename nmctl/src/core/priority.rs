//! Medium preference.
//!
//! A preference becomes an (autoconnect-priority, route-metric) pair per
//! connection type, written to every saved profile of that type with
//! `nmcli`. The primary devices are then told to reapply their profiles so
//! the new metrics take effect on links that are already up.

use log::{info, warn};

use crate::Result;
use crate::api::models::Preference;
use crate::core::Context;
use crate::core::settings;
use crate::types::constants::{connection_type, priority};

/// What one connection type gets under a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tuning {
    pub(crate) autoconnect_priority: i32,
    pub(crate) route_metric: u32,
}

const PREFERRED: Tuning = Tuning {
    autoconnect_priority: priority::HIGH,
    route_metric: priority::METRIC_PREFERRED,
};

const NON_PREFERRED: Tuning = Tuning {
    autoconnect_priority: priority::LOW,
    route_metric: priority::METRIC_NON_PREFERRED,
};

const NEUTRAL: Tuning = Tuning {
    autoconnect_priority: priority::DEFAULT,
    route_metric: priority::METRIC_DEFAULT,
};

/// The tuning for each connection type, in the order they are applied.
pub(crate) fn tunings(pref: Preference) -> [(&'static str, Tuning); 2] {
    match pref {
        Preference::Wifi => [
            (connection_type::WIRELESS, PREFERRED),
            (connection_type::ETHERNET, NON_PREFERRED),
        ],
        Preference::Ethernet => [
            (connection_type::ETHERNET, PREFERRED),
            (connection_type::WIRELESS, NON_PREFERRED),
        ],
        Preference::Auto => [
            (connection_type::ETHERNET, NEUTRAL),
            (connection_type::WIRELESS, NEUTRAL),
        ],
    }
}

fn modify_args(id: &str, tuning: Tuning) -> Vec<String> {
    let metric = tuning.route_metric.to_string();
    vec![
        "con".to_string(),
        "mod".to_string(),
        id.to_string(),
        "connection.autoconnect-priority".to_string(),
        tuning.autoconnect_priority.to_string(),
        "ipv4.route-metric".to_string(),
        metric.clone(),
        "ipv6.route-metric".to_string(),
        metric,
    ]
}

/// Records the preference and applies it. Per-profile failures are logged;
/// only listing the profiles can fail the call.
pub(crate) async fn set_preference(ctx: &Context, pref: Preference) -> Result<()> {
    ctx.store.update(|s| s.preference = pref);

    let connections = ctx.bus.list_connections().await?;
    for (kind, tuning) in tunings(pref) {
        let ids = connections
            .iter()
            .filter(|c| settings::conn_type(&c.settings) == kind)
            .map(|c| settings::conn_id(&c.settings))
            .filter(|id| !id.is_empty());

        for id in ids {
            match ctx.runner.run(&ctx.config.nmcli, &modify_args(id, tuning)).await {
                Ok(out) if out.success => info!(
                    "Updated {id}: autoconnect-priority={}, route-metric={}",
                    tuning.autoconnect_priority, tuning.route_metric
                ),
                Ok(out) => warn!("Failed to set priority for {id}: {}", out.combined()),
                Err(e) => warn!("Failed to set priority for {id}: {e}"),
            }
        }
    }

    reapply(ctx).await;
    ctx.notify();
    Ok(())
}

async fn reapply(ctx: &Context) {
    let devices = ctx
        .store
        .read(|s| [s.ethernet_device.clone(), s.wifi_device.clone()]);

    for device in devices.iter().filter(|d| !d.is_empty()) {
        let args = ["dev".to_string(), "reapply".to_string(), device.clone()];
        match ctx.runner.run(&ctx.config.nmcli, &args).await {
            Ok(out) if !out.success => warn!("Reapply on {device} failed: {}", out.combined()),
            Ok(_) => {}
            Err(e) => warn!("Reapply on {device} failed: {e}"),
        }
    }
}
