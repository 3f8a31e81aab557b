//! Browse settings.
//!
//! The settings are owned by whoever embeds the browser; the engine only
//! reads a snapshot through [`SettingsProvider`] each time it needs one.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

/// Behaviour switches consulted while browsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowseSettings {
    /// Show administrative shares (names ending in `$`).
    #[serde(default)]
    pub detect_hidden_shares: bool,

    /// Show printer shares.
    #[serde(default = "default_true")]
    pub detect_printer_shares: bool,

    /// Broadcast magic packets before looking up domains.
    #[serde(default)]
    pub enable_wake_on_lan: bool,

    /// Seconds to wait after the magic packets went out.
    #[serde(default = "default_wol_wait")]
    pub wake_on_lan_wait_secs: u64,

    /// MAC addresses (`aa:bb:cc:dd:ee:ff`) to wake.
    #[serde(default)]
    pub wake_on_lan_macs: Vec<String>,

    /// Attach credentials when querying master browsers.
    #[serde(default)]
    pub master_browsers_require_auth: bool,

    /// Consult a single master browser when listing domains.
    #[serde(default)]
    pub large_network_neighborhood: bool,

    /// Drop hosts whose address cannot be resolved instead of keeping them
    /// without an IP.
    #[serde(default)]
    pub drop_unresolved_items: bool,
}

fn default_true() -> bool {
    true
}

fn default_wol_wait() -> u64 {
    5
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            detect_hidden_shares: false,
            detect_printer_shares: default_true(),
            enable_wake_on_lan: false,
            wake_on_lan_wait_secs: default_wol_wait(),
            wake_on_lan_macs: Vec::new(),
            master_browsers_require_auth: false,
            large_network_neighborhood: false,
            drop_unresolved_items: false,
        }
    }
}

impl BrowseSettings {
    pub fn wake_on_lan_wait(&self) -> Duration {
        Duration::from_secs(self.wake_on_lan_wait_secs)
    }
}

/// Source of the current settings.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> BrowseSettings;
}

impl SettingsProvider for BrowseSettings {
    fn settings(&self) -> BrowseSettings {
        self.clone()
    }
}

/// Settings that can be changed while the browser runs. Clone is cheap.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<BrowseSettings>>,
}

impl SharedSettings {
    pub fn new(settings: BrowseSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut BrowseSettings)) {
        f(&mut self.inner.write());
    }
}

impl SettingsProvider for SharedSettings {
    fn settings(&self) -> BrowseSettings {
        self.inner.read().clone()
    }
}
