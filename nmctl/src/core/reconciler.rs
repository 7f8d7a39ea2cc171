//! Signal reconciler.
//!
//! One worker drains a single queue of [`WorkItem`]s. Bus signals and the
//! follow-up actions they cause (subscribing to a device that just appeared)
//! go through the same queue, so every item is fully handled before the
//! next one is read and no handler ever re-enters another.
//!
//! Handlers have no caller to report to. A failed read is logged and the
//! worker moves on to the next item.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::Context;
use crate::core::registry::Domain;
use crate::core::{connectivity, ethernet, vpn, wifi};
use crate::dbus::bus::{BusSignal, DeviceProbe, Subscription};
use crate::dbus::values::SettingValue;
use crate::types::constants::{bus, device_type};

/// What the worker can be asked to do.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Signal(BusSignal),
    /// Start following property changes of a device. Ignored if already
    /// subscribed.
    SubscribeDevice(DeviceProbe),
    UnsubscribeDevice(String),
}

pub(crate) struct Reconciler {
    ctx: Arc<Context>,
    subscriptions: HashMap<String, Subscription>,
}

impl Reconciler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            subscriptions: HashMap::new(),
        }
    }

    /// Runs until `cancel` fires or the queue closes. Device subscriptions
    /// are dropped on exit.
    pub(crate) async fn run(
        mut self,
        mut work: mpsc::UnboundedReceiver<WorkItem>,
        cancel: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = work.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            self.handle(item).await;
        }
        self.subscriptions.clear();
        debug!("Signal worker stopped");
    }

    async fn handle(&mut self, item: WorkItem) {
        match item {
            WorkItem::SubscribeDevice(probe) => self.subscribe(probe).await,
            WorkItem::UnsubscribeDevice(path) => {
                if self.subscriptions.remove(&path).is_some() {
                    debug!("Unsubscribed from {path}");
                }
            }
            WorkItem::Signal(signal) => self.dispatch(signal).await,
        }
    }

    async fn subscribe(&mut self, probe: DeviceProbe) {
        if self.subscriptions.contains_key(&probe.path) {
            return;
        }
        match self.ctx.bus.subscribe_device(&probe, self.ctx.sink()).await {
            Ok(sub) => {
                self.subscriptions.insert(probe.path, sub);
            }
            Err(e) => warn!("Failed to subscribe to {}: {e}", probe.interface),
        }
    }

    async fn dispatch(&mut self, signal: BusSignal) {
        let ctx = &*self.ctx;
        match signal {
            BusSignal::PropertiesChanged {
                path,
                interface,
                changed,
            } => match interface.as_str() {
                bus::MANAGER_IFACE => on_manager(ctx, &changed).await,
                bus::DEVICE_IFACE => self.on_device(&path, &changed).await,
                bus::WIRED_IFACE => on_wired(ctx, &changed).await,
                bus::WIRELESS_IFACE => on_wireless(ctx, &changed).await,
                bus::ACCESS_POINT_IFACE => on_access_point(ctx, &changed).await,
                _ => {}
            },
            BusSignal::ConnectionAdded(path) | BusSignal::ConnectionRemoved(path) => {
                debug!("Saved connections changed ({path})");
                vpn::refresh_profiles(ctx).await;
                ctx.notify();
            }
            BusSignal::DeviceAdded(path) => {
                if let Some(domain) = adopt_device(ctx, &path).await {
                    refresh_domain(ctx, domain).await;
                    ctx.notify();
                }
            }
            BusSignal::DeviceRemoved(path) => self.on_device_removed(&path).await,
        }
    }

    async fn on_device(&mut self, path: &str, changed: &HashMap<String, SettingValue>) {
        let ctx = &*self.ctx;
        let became_managed = changed.get("Managed").and_then(SettingValue::as_bool) == Some(true);
        if became_managed && ctx.registry.domain_of(path).is_none() {
            if let Some(domain) = adopt_device(ctx, path).await {
                refresh_domain(ctx, domain).await;
                ctx.notify();
            }
            return;
        }

        let state = changed.contains_key("State");
        if !state && !changed.contains_key("Ip4Config") {
            return;
        }

        match ctx.registry.domain_of(path) {
            Some(Domain::Ethernet) => {
                ethernet::refresh_devices(ctx).await;
                ethernet::refresh_state(ctx).await;
                if state {
                    ethernet::refresh_connections(ctx).await;
                }
            }
            Some(Domain::Wifi) => {
                if let Some(signalled) = changed.get("State").and_then(SettingValue::as_u32) {
                    wifi::on_device_state(ctx, path, signalled);
                }
                wifi::refresh_devices(ctx).await;
                wifi::refresh_state(ctx).await;
            }
            None => return,
        }
        if state {
            connectivity::refresh_primary(ctx).await;
        }
        ctx.notify();
    }

    async fn on_device_removed(&mut self, path: &str) {
        self.subscriptions.remove(path);
        let ctx = &*self.ctx;
        let Some((domain, name)) = ctx.registry.remove(path) else {
            return;
        };
        info!("Device {name} removed");
        refresh_domain(ctx, domain).await;
        ctx.notify();
    }
}

/// Registers the device at `path` if it is a managed Wi-Fi or Ethernet
/// adapter, and queues the subscription to its property changes.
///
/// The subscription is queued even for an unmanaged device, so the worker
/// sees it flip to managed later.
pub(crate) async fn adopt_device(ctx: &Context, path: &str) -> Option<Domain> {
    let probe = match ctx.bus.probe_device(path).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to probe device {path}: {e}");
            return None;
        }
    };
    if !matches!(probe.device_type, device_type::WIFI | device_type::ETHERNET) {
        debug!("Ignoring {} (type {})", probe.interface, probe.device_type);
        return None;
    }

    ctx.queue(WorkItem::SubscribeDevice(probe.clone()));
    if !probe.managed {
        debug!("Ignoring unmanaged device {}", probe.interface);
        return None;
    }

    let handle = match ctx.bus.open_device(&probe).await {
        Ok(h) => h,
        Err(e) => {
            warn!("Failed to open device {}: {e}", probe.interface);
            return None;
        }
    };
    let hw_address = handle.control().hw_address().await.unwrap_or_else(|e| {
        debug!("No hardware address for {}: {e}", probe.interface);
        String::new()
    });

    let domain = ctx.registry.register(handle, hw_address);
    info!("Registered {:?} device {}", domain, probe.interface);
    Some(domain)
}

/// Recomputes everything published about one domain, then the primary
/// connection.
async fn refresh_domain(ctx: &Context, domain: Domain) {
    match domain {
        Domain::Wifi => {
            wifi::refresh_devices(ctx).await;
            wifi::refresh_state(ctx).await;
            if ctx.registry.primary_wifi().is_some() {
                if let Err(e) = wifi::refresh_networks(ctx).await {
                    warn!("Failed to refresh networks: {e}");
                }
            } else {
                ctx.store.update(|s| s.wifi_networks.clear());
            }
        }
        Domain::Ethernet => {
            ethernet::refresh_devices(ctx).await;
            ethernet::refresh_state(ctx).await;
            ethernet::refresh_connections(ctx).await;
        }
    }
    connectivity::refresh_primary(ctx).await;
}

async fn on_manager(ctx: &Context, changed: &HashMap<String, SettingValue>) {
    let mut touched = false;

    if let Some(enabled) = changed.get("WirelessEnabled").and_then(SettingValue::as_bool) {
        ctx.store.update(|s| s.wifi_enabled = enabled);
        touched = true;
    }

    let primary = changed.contains_key("PrimaryConnection");
    let state = changed.contains_key("State");
    let active = changed.contains_key("ActiveConnections");
    if primary || state || active {
        if state {
            ethernet::refresh_state(ctx).await;
            wifi::refresh_state(ctx).await;
        }
        if active {
            vpn::update_connection_state(ctx).await;
            vpn::refresh_active(ctx).await;
        }
        connectivity::refresh_primary(ctx).await;
        touched = true;
    }

    if touched {
        ctx.notify();
    }
}

async fn on_wired(ctx: &Context, changed: &HashMap<String, SettingValue>) {
    if !["Carrier", "Speed", "HwAddress"]
        .iter()
        .any(|k| changed.contains_key(*k))
    {
        return;
    }
    ethernet::refresh_devices(ctx).await;
    ethernet::refresh_state(ctx).await;
    connectivity::refresh_primary(ctx).await;
    ctx.notify();
}

async fn on_wireless(ctx: &Context, changed: &HashMap<String, SettingValue>) {
    let active_ap = changed.contains_key("ActiveAccessPoint");
    let aps = changed.contains_key("AccessPoints");
    if !active_ap && !aps {
        return;
    }
    if active_ap {
        wifi::refresh_state(ctx).await;
        wifi::refresh_devices(ctx).await;
    }
    if let Err(e) = wifi::refresh_networks(ctx).await {
        warn!("Failed to refresh networks: {e}");
    }
    ctx.notify();
}

/// Strength updates are frequent and noisy. Only a move of at least the
/// configured hysteresis in the associated signal is published.
async fn on_access_point(ctx: &Context, changed: &HashMap<String, SettingValue>) {
    if !changed.contains_key("Strength") {
        return;
    }
    let before = ctx.store.read(|s| s.wifi_signal);
    wifi::refresh_state(ctx).await;
    let after = ctx.store.read(|s| s.wifi_signal);

    if exceeds_hysteresis(before, after, ctx.config.strength_hysteresis) {
        ctx.notify();
    }
}

fn exceeds_hysteresis(before: u8, after: u8, band: u8) -> bool {
    before.abs_diff(after) >= band.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_strength_moves_are_absorbed() {
        assert!(!exceeds_hysteresis(60, 64, 5));
        assert!(!exceeds_hysteresis(64, 60, 5));
        assert!(exceeds_hysteresis(60, 65, 5));
        assert!(exceeds_hysteresis(70, 40, 5));
    }

    #[test]
    fn zero_band_still_ignores_identical_readings() {
        assert!(!exceeds_hysteresis(50, 50, 0));
        assert!(exceeds_hysteresis(50, 51, 0));
    }
}
