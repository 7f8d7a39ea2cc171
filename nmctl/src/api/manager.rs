use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::api::config::ManagerConfig;
use crate::api::models::{
    ConnectionRequest, CredentialPrompt, NetworkDetails, NetworkState, Preference, PromptReply,
    PromptRequest, VpnActive, VpnConfig, VpnConfigUpdate, VpnImportResult, VpnPlugin, VpnProfile,
    WiredConnection, WiredNetworkDetails,
};
use crate::core::Context;
use crate::core::notifier::Notifier;
use crate::core::reconciler::{self, Reconciler};
use crate::core::store::StateStore;
use crate::core::{connectivity, credentials, ethernet, priority, vpn, vpn_import, wifi};
use crate::dbus::SystemBus;
use crate::dbus::bus::{NetworkBus, Subscription};
use crate::types::constants::defaults;
use crate::util::command::{CommandRunner, SystemCommandRunner};

/// Name published in [`NetworkState::backend`].
pub const BACKEND_NAME: &str = "networkmanager";

/// Background tasks owned by a manager and its clones.
#[derive(Debug)]
struct Lifecycle {
    cancel: CancellationToken,
    global: Mutex<Option<Subscription>>,
    broker: Arc<crate::PromptBroker>,
}

impl Lifecycle {
    fn stop(&self) {
        self.cancel.cancel();
        self.broker.shutdown();
        self.global
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stateful front end to NetworkManager.
///
/// Owns the published [`NetworkState`], keeps it current from bus signals
/// and exposes the Wi-Fi, Ethernet, VPN and preference operations. Every
/// operation that changes something schedules a debounced push to every
/// receiver returned by [`subscribe`](Manager::subscribe).
///
/// # Creating an Instance
///
/// ```no_run
/// use nmctl::Manager;
///
/// # async fn example() -> nmctl::Result<()> {
/// let manager = Manager::new().await?;
/// let state = manager.state();
/// println!("{} via {}", state.status, state.backend);
/// # Ok(())
/// # }
/// ```
///
/// # Watching State
///
/// ```no_run
/// use nmctl::Manager;
///
/// # async fn example() -> nmctl::Result<()> {
/// let manager = Manager::new().await?;
/// let mut updates = manager.subscribe();
/// while let Some(state) = updates.recv().await {
///     println!("wifi: {} ({}%)", state.wifi_ssid, state.wifi_signal);
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Answering Credential Prompts
///
/// ```no_run
/// use std::collections::HashMap;
/// use nmctl::Manager;
///
/// # async fn example() -> nmctl::Result<()> {
/// let manager = Manager::new().await?;
/// let mut prompts = manager.subscribe_prompts();
/// while let Some(prompt) = prompts.recv().await {
///     let mut secrets = HashMap::new();
///     secrets.insert("password".to_string(), "hunter2".to_string());
///     manager.submit_credentials(&prompt.token, secrets, false)?;
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `Manager` is `Clone`; clones share the same state and background tasks.
/// The tasks stop when [`shutdown`](Manager::shutdown) is called or the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct Manager {
    ctx: Arc<Context>,
    lifecycle: Arc<Lifecycle>,
}

impl Manager {
    /// Connects to the system bus with the default configuration.
    pub async fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default()).await
    }

    pub async fn with_config(config: ManagerConfig) -> Result<Self> {
        let bus = SystemBus::connect().await?;
        Self::with_backend(Arc::new(bus), Arc::new(SystemCommandRunner), config).await
    }

    /// Builds a manager over any bus and command implementation.
    ///
    /// Registers the managed devices, computes the initial state, subscribes
    /// to signals and starts the signal worker and the notifier. Must be
    /// called inside a Tokio runtime.
    pub async fn with_backend(
        bus: Arc<dyn NetworkBus>,
        runner: Arc<dyn CommandRunner>,
        config: ManagerConfig,
    ) -> Result<Self> {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (notifier, dirty_rx) = Notifier::new(config.subscriber_capacity);
        let notifier = Arc::new(notifier);
        let store = Arc::new(StateStore::new(NetworkState {
            backend: BACKEND_NAME.to_string(),
            ..Default::default()
        }));
        let window = config.debounce;

        let ctx = Arc::new(Context::new(
            bus,
            runner,
            config,
            Arc::clone(&store),
            Arc::clone(&notifier),
            work_tx,
        ));

        for path in ctx.bus.device_paths().await? {
            reconciler::adopt_device(&ctx, &path).await;
        }
        connectivity::refresh_all(&ctx).await;

        let global = ctx.bus.subscribe_global(ctx.sink()).await?;
        let cancel = CancellationToken::new();
        tokio::spawn(Reconciler::new(Arc::clone(&ctx)).run(work_rx, cancel.clone()));
        tokio::spawn(notifier.run(dirty_rx, store, window, cancel.clone()));

        info!(
            "Manager ready: {} Wi-Fi, {} Ethernet device(s)",
            ctx.registry.wifi_devices().len(),
            ctx.registry.wired_devices().len()
        );

        let lifecycle = Arc::new(Lifecycle {
            cancel,
            global: Mutex::new(Some(global)),
            broker: Arc::clone(&ctx.broker),
        });
        Ok(Self { ctx, lifecycle })
    }

    /// Stops the signal worker and the notifier and fails pending prompts.
    pub fn shutdown(&self) {
        debug!("Shutting down manager");
        self.lifecycle.stop();
    }

    /// A copy of the current state.
    pub fn state(&self) -> NetworkState {
        self.ctx.store.snapshot()
    }

    /// Receives the current state, then a snapshot after every settled
    /// change. A receiver that falls behind skips intermediate snapshots
    /// rather than slowing the manager down, and gets the latest one once it
    /// has room again.
    pub fn subscribe(&self) -> mpsc::Receiver<NetworkState> {
        self.ctx.notifier.subscribe(&self.ctx.store)
    }

    /// Receives every credential prompt issued from now on.
    pub fn subscribe_prompts(&self) -> mpsc::Receiver<CredentialPrompt> {
        self.ctx.broker.subscribe()
    }

    /// Prompts waiting for an answer.
    pub fn pending_prompts(&self) -> Vec<CredentialPrompt> {
        self.ctx.broker.pending()
    }

    pub async fn scan_wifi(&self, device: Option<&str>) -> Result<()> {
        wifi::scan(&self.ctx, device).await
    }

    /// Starts joining a Wi-Fi network. Returns once activation has been
    /// requested; progress shows up in [`NetworkState::is_connecting`].
    pub async fn connect_wifi(&self, request: &ConnectionRequest) -> Result<()> {
        wifi::connect(&self.ctx, request).await
    }

    pub async fn disconnect_wifi(&self, device: Option<&str>) -> Result<()> {
        wifi::disconnect(&self.ctx, device).await
    }

    /// Deletes the saved profile for `ssid`.
    pub async fn forget_wifi(&self, ssid: &str) -> Result<()> {
        wifi::forget(&self.ctx, ssid).await
    }

    pub async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        wifi::set_enabled(&self.ctx, enabled).await
    }

    /// Flips the radio and returns the new setting.
    pub async fn toggle_wifi(&self) -> Result<bool> {
        let enabled = !self.ctx.store.read(|s| s.wifi_enabled);
        wifi::set_enabled(&self.ctx, enabled).await?;
        Ok(enabled)
    }

    pub async fn set_wifi_autoconnect(&self, ssid: &str, autoconnect: bool) -> Result<()> {
        wifi::set_autoconnect(&self.ctx, ssid, autoconnect).await
    }

    pub async fn wifi_network_details(&self, ssid: &str) -> Result<NetworkDetails> {
        wifi::network_details(&self.ctx, ssid).await
    }

    /// Whether an attempt to join `ssid` is in progress.
    pub fn is_connecting_to(&self, ssid: &str) -> bool {
        self.ctx
            .store
            .read(|s| s.is_connecting && s.connecting_ssid == ssid)
    }

    /// Whether the last attempt to join `ssid` failed in the last ten
    /// seconds.
    pub fn was_recently_failed(&self, ssid: &str) -> bool {
        self.ctx
            .failures
            .was_recent(ssid, defaults::RECENT_FAILURE_WINDOW)
    }

    pub async fn connect_ethernet(&self) -> Result<()> {
        ethernet::connect(&self.ctx).await
    }

    pub async fn connect_ethernet_profile(&self, uuid: &str) -> Result<()> {
        ethernet::connect_profile(&self.ctx, uuid).await
    }

    pub async fn disconnect_ethernet(&self) -> Result<()> {
        ethernet::disconnect(&self.ctx).await
    }

    pub async fn list_wired_connections(&self) -> Vec<WiredConnection> {
        ethernet::refresh_connections(&self.ctx).await;
        self.ctx.store.read(|s| s.wired_connections.clone())
    }

    pub async fn wired_network_details(&self, uuid: &str) -> Result<WiredNetworkDetails> {
        ethernet::details(&self.ctx, uuid).await
    }

    /// Applies a preference given as `auto`, `wifi` or `ethernet`.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidPreference`](crate::ConnectionError::InvalidPreference)
    /// for any other string.
    pub async fn set_preference(&self, preference: &str) -> Result<()> {
        let preference: Preference = preference.parse()?;
        priority::set_preference(&self.ctx, preference).await
    }

    pub async fn list_vpn_profiles(&self) -> Vec<VpnProfile> {
        vpn::refresh_profiles(&self.ctx).await;
        self.ctx.store.read(|s| s.vpn_profiles.clone())
    }

    pub async fn list_active_vpn(&self) -> Vec<VpnActive> {
        vpn::refresh_active(&self.ctx).await;
        self.ctx.store.read(|s| s.vpn_active.clone())
    }

    /// Activates a saved VPN by UUID or name.
    ///
    /// With `single_active`, any other active VPN is disconnected first.
    /// Asking for a VPN that is already up does nothing.
    pub async fn connect_vpn(&self, uuid_or_name: &str, single_active: bool) -> Result<()> {
        vpn::connect(&self.ctx, uuid_or_name, single_active).await
    }

    pub async fn disconnect_vpn(&self, uuid_or_name: &str) -> Result<()> {
        vpn::disconnect(&self.ctx, uuid_or_name).await
    }

    pub async fn disconnect_all_vpn(&self) -> Result<()> {
        vpn::disconnect_all(&self.ctx).await
    }

    /// Imports a provider file (`.ovpn`, `.conf`, ...) through `nmcli`,
    /// optionally renaming the new profile. An import that no plugin accepts
    /// is reported in the result, not as an error.
    pub async fn import_vpn(&self, path: impl AsRef<Path>, name: Option<&str>) -> Result<VpnImportResult> {
        vpn_import::import(&self.ctx, path.as_ref(), name).await
    }

    pub async fn vpn_config(&self, uuid_or_name: &str) -> Result<VpnConfig> {
        vpn::get_config(&self.ctx, uuid_or_name).await
    }

    pub async fn update_vpn_config(&self, uuid: &str, update: VpnConfigUpdate) -> Result<()> {
        vpn::update_config(&self.ctx, uuid, update).await
    }

    /// Stores a username and password on a VPN profile. Without `save`, the
    /// password is kept in memory for the next activation only.
    pub async fn set_vpn_credentials(
        &self,
        uuid: &str,
        username: &str,
        password: &str,
        save: bool,
    ) -> Result<()> {
        vpn::set_credentials(&self.ctx, uuid, username, password, save).await
    }

    pub async fn clear_vpn_credentials(&self, uuid_or_name: &str) -> Result<()> {
        vpn::clear_credentials(&self.ctx, uuid_or_name).await
    }

    pub async fn delete_vpn(&self, uuid_or_name: &str) -> Result<()> {
        vpn::delete(&self.ctx, uuid_or_name).await
    }

    /// Installed NetworkManager VPN plugins.
    pub fn list_vpn_plugins(&self) -> Vec<VpnPlugin> {
        vpn_import::list_plugins(&self.ctx.config.plugin_dirs)
    }

    /// Answers a credential prompt.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::UnknownToken`](crate::ConnectionError::UnknownToken)
    /// if the prompt was already answered, timed out or never existed.
    pub fn submit_credentials(
        &self,
        token: &str,
        secrets: HashMap<String, String>,
        save: bool,
    ) -> Result<()> {
        credentials::submit(&self.ctx, token, secrets, save)
    }

    /// Declines a credential prompt. The attempt that asked is abandoned.
    pub fn cancel_credentials(&self, token: &str) -> Result<()> {
        credentials::cancel(&self.ctx, token)
    }

    /// Entry point for a secret agent: returns the secrets NetworkManager
    /// asked for, from the one-time cache or from a prompt.
    ///
    /// Waits at most [`ManagerConfig::prompt_timeout`]. If the prompt times
    /// out or is declined the connection attempt is marked failed.
    pub async fn request_secrets(&self, request: PromptRequest) -> Result<PromptReply> {
        let name = request.name.clone();
        let reply = credentials::request(&self.ctx, request).await;
        if let Err(e) = &reply {
            warn!("No secrets for {name}: {e}");
        }
        reply
    }
}
