//! Tuning knobs for [`Manager`](crate::Manager).

use std::path::PathBuf;
use std::time::Duration;

use crate::types::constants::defaults;

/// Runtime configuration for the manager.
///
/// Every field has a sensible default; use the `with_*` methods to override
/// individual values.
///
/// # Example
///
/// ```rust
/// use nmctl::ManagerConfig;
/// use std::time::Duration;
///
/// let config = ManagerConfig::new()
///     .with_debounce(Duration::from_millis(50))
///     .with_prompt_timeout(Duration::from_secs(30));
/// assert_eq!(config.subscriber_capacity, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Minimum spacing between two subscriber notifications (default: 200ms).
    pub debounce: Duration,
    /// Buffered snapshots per subscriber before new ones are dropped (default: 64).
    pub subscriber_capacity: usize,
    /// How long a credential prompt waits for an answer (default: 2 minutes).
    pub prompt_timeout: Duration,
    /// Upper bound on waiting for preempted VPNs to go away (default: 5 seconds).
    pub vpn_settle_timeout: Duration,
    /// Poll interval while waiting for preempted VPNs (default: 100ms).
    pub vpn_settle_poll: Duration,
    /// Signal strength change, in percentage points, that is worth a
    /// notification (default: 5).
    pub strength_hysteresis: u8,
    /// Directories scanned for `*.name` VPN plugin descriptors.
    pub plugin_dirs: Vec<PathBuf>,
    /// The `nmcli` executable (default: `nmcli` from `PATH`).
    pub nmcli: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            debounce: defaults::DEBOUNCE,
            subscriber_capacity: defaults::SUBSCRIBER_CAPACITY,
            prompt_timeout: defaults::PROMPT_TIMEOUT,
            vpn_settle_timeout: defaults::VPN_SETTLE_TIMEOUT,
            vpn_settle_poll: defaults::VPN_SETTLE_POLL,
            strength_hysteresis: defaults::STRENGTH_HYSTERESIS,
            plugin_dirs: defaults::PLUGIN_DIRS.iter().map(PathBuf::from).collect(),
            nmcli: defaults::NMCLI.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Creates a new `ManagerConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    pub fn with_vpn_settle(mut self, timeout: Duration, poll: Duration) -> Self {
        self.vpn_settle_timeout = timeout;
        self.vpn_settle_poll = poll;
        self
    }

    pub fn with_strength_hysteresis(mut self, points: u8) -> Self {
        self.strength_hysteresis = points;
        self
    }

    pub fn with_plugin_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.plugin_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nmcli(mut self, program: impl Into<String>) -> Self {
        self.nmcli = program.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(200));
        assert_eq!(config.subscriber_capacity, 64);
        assert_eq!(config.prompt_timeout, Duration::from_secs(120));
        assert_eq!(config.vpn_settle_timeout, Duration::from_secs(5));
        assert_eq!(config.strength_hysteresis, 5);
        assert_eq!(config.plugin_dirs.len(), 3);
        assert_eq!(config.nmcli, "nmcli");
    }

    #[test]
    fn setters_override_single_fields() {
        let config = ManagerConfig::new()
            .with_subscriber_capacity(0)
            .with_plugin_dirs(["/tmp/vpn"])
            .with_nmcli("/usr/bin/nmcli");
        assert_eq!(config.subscriber_capacity, 1);
        assert_eq!(config.plugin_dirs, vec![PathBuf::from("/tmp/vpn")]);
        assert_eq!(config.nmcli, "/usr/bin/nmcli");
        assert_eq!(config.debounce, Duration::from_millis(200));
    }
}
