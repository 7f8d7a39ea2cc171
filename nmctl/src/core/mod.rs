//! Core internal logic for connectivity management.
//!
//! The controllers in this module share one [`Context`]: the bus client, the
//! device registry, the state store and the notification, prompt and secret
//! plumbing. Nothing here is global; the [`Manager`](crate::Manager) builds
//! the context and owns the tasks that run against it.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::config::ManagerConfig;
use crate::dbus::bus::{NetworkBus, SignalSink};
use crate::util::command::CommandRunner;

pub(crate) mod connectivity;
pub(crate) mod credentials;
pub(crate) mod ethernet;
pub(crate) mod notifier;
pub(crate) mod priority;
pub mod prompt;
pub(crate) mod reconciler;
pub(crate) mod registry;
pub(crate) mod secrets;
pub(crate) mod settings;
pub(crate) mod store;
pub(crate) mod vpn;
pub(crate) mod vpn_import;
pub(crate) mod wifi;

use notifier::Notifier;
use prompt::PromptBroker;
use reconciler::WorkItem;
use registry::DeviceRegistry;
use secrets::SecretCache;
use store::StateStore;
use wifi::{AttemptProgress, RecentFailures};

/// Everything a controller operation needs.
pub(crate) struct Context {
    pub(crate) bus: Arc<dyn NetworkBus>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) config: ManagerConfig,
    pub(crate) registry: DeviceRegistry,
    pub(crate) store: Arc<StateStore>,
    pub(crate) notifier: Arc<Notifier>,
    pub(crate) broker: Arc<PromptBroker>,
    pub(crate) secrets: SecretCache,
    pub(crate) failures: RecentFailures,
    pub(crate) attempt: AttemptProgress,
    work: mpsc::UnboundedSender<WorkItem>,
}

impl Context {
    pub(crate) fn new(
        bus: Arc<dyn NetworkBus>,
        runner: Arc<dyn CommandRunner>,
        config: ManagerConfig,
        store: Arc<StateStore>,
        notifier: Arc<Notifier>,
        work: mpsc::UnboundedSender<WorkItem>,
    ) -> Self {
        let broker = Arc::new(PromptBroker::new(config.subscriber_capacity));
        Self {
            bus,
            runner,
            config,
            registry: DeviceRegistry::default(),
            store,
            notifier,
            broker,
            secrets: SecretCache::default(),
            failures: RecentFailures::default(),
            attempt: AttemptProgress::default(),
            work,
        }
    }

    /// Schedules a debounced push to subscribers.
    pub(crate) fn notify(&self) {
        self.notifier.mark_dirty();
    }

    /// Queues an action for the signal worker.
    pub(crate) fn queue(&self, item: WorkItem) {
        if self.work.send(item).is_err() {
            log::debug!("Signal worker is gone, dropping queued action");
        }
    }

    pub(crate) fn sink(&self) -> SignalSink {
        SignalSink::new(self.work.clone())
    }

    /// Records a failed attempt: clears the progress flags and publishes
    /// the error text.
    pub(crate) fn fail_wifi_attempt(&self, error: &str) {
        let ssid = self.store.update(|s| {
            s.is_connecting = false;
            s.connecting_device.clear();
            s.last_error = error.to_string();
            std::mem::take(&mut s.connecting_ssid)
        });
        if !ssid.is_empty() {
            self.failures.record(&ssid);
        }
        self.notify();
    }

    pub(crate) fn fail_vpn_attempt(&self, error: &str) {
        let uuid = self.store.update(|s| {
            s.is_connecting_vpn = false;
            s.last_error = error.to_string();
            std::mem::take(&mut s.connecting_vpn_uuid)
        });
        if !uuid.is_empty() {
            self.secrets.on_failed(&uuid);
        }
        self.notify();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
