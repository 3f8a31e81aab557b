//! Configuration for the smbtree browser.

use serde::Deserialize;

use smbtree_core::{BrowseSettings, Credentials, ItemKey};

use crate::credentials::InMemoryCredentialProvider;
use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `smbtree.toml` `[discover]` section or
/// `SMBTREE_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the smbclient binary (default: "smbclient").
    #[serde(default = "default_smbclient_path")]
    pub smbclient_path: String,

    /// Path to the nmblookup binary (default: "nmblookup").
    #[serde(default = "default_nmblookup_path")]
    pub nmblookup_path: String,

    /// Seconds before a single smbclient or nmblookup call is abandoned.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Buffered events per subscriber before the slowest one lags.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub browse: BrowseSettings,

    /// Stored logins, most specific scope wins.
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

/// A stored login for a workgroup, host or share.
///
/// With no workgroup it becomes the default login.
#[derive(Clone, Deserialize)]
pub struct CredentialEntry {
    pub workgroup: Option<String>,
    pub host: Option<String>,
    pub share: Option<String>,
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("workgroup", &self.workgroup)
            .field("host", &self.host)
            .field("share", &self.share)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl CredentialEntry {
    /// Scope the entry applies to; `None` for the default login.
    pub fn key(&self) -> Result<Option<ItemKey>> {
        let key = match (&self.workgroup, &self.host, &self.share) {
            (None, None, None) => return Ok(None),
            (Some(wg), None, None) => ItemKey::workgroup(wg),
            (Some(wg), Some(host), None) => ItemKey::host(wg, host),
            (Some(wg), Some(host), Some(share)) => ItemKey::share(wg, host, share),
            _ => {
                return Err(DiscoverError::Config(format!(
                    "credential entry for {} needs a workgroup (and a host for a share)",
                    self.login
                )))
            }
        };
        Ok(Some(key))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.login, &self.password)
    }
}

fn default_smbclient_path() -> String {
    "smbclient".to_string()
}

fn default_nmblookup_path() -> String {
    "nmblookup".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    256
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            smbclient_path: default_smbclient_path(),
            nmblookup_path: default_nmblookup_path(),
            command_timeout_secs: default_command_timeout(),
            event_capacity: default_event_capacity(),
            browse: BrowseSettings::default(),
            credentials: Vec::new(),
        }
    }
}

impl DiscoverConfig {
    /// Load `[discover]` from `<file_prefix>.toml` (optional), overlaid by
    /// `SMBTREE_DISCOVER__*` environment variables. A config without a
    /// `[discover]` section yields the defaults.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("SMBTREE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
            Err(e) => Err(DiscoverError::Config(e.to_string())),
        }
    }

    /// Credential provider seeded with the configured logins.
    pub fn credential_provider(&self) -> Result<InMemoryCredentialProvider> {
        let mut provider = InMemoryCredentialProvider::new();
        for entry in &self.credentials {
            provider = match entry.key()? {
                Some(key) => provider.with_entry(key, entry.credentials()),
                None => provider.with_default(entry.credentials()),
            };
        }
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use smbtree_core::{NetworkItem, Share};

    use crate::credentials::CredentialProvider;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.smbclient_path, "smbclient");
        assert_eq!(config.nmblookup_path, "nmblookup");
        assert_eq!(config.command_timeout_secs, 30);
        assert!(config.browse.detect_printer_shares);
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("smbtree.toml")).unwrap();
        writeln!(
            file,
            r#"
[discover]
smbclient_path = "/usr/local/bin/smbclient"

[discover.browse]
detect_hidden_shares = true
wake_on_lan_macs = ["01:23:45:67:89:ab"]

[[discover.credentials]]
workgroup = "WG1"
host = "SRV1"
login = "bob"
password = "secret"
"#
        )
        .unwrap();

        let prefix = dir.path().join("smbtree");
        let config = DiscoverConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.smbclient_path, "/usr/local/bin/smbclient");
        assert_eq!(config.nmblookup_path, "nmblookup");
        assert!(config.browse.detect_hidden_shares);
        assert_eq!(config.browse.wake_on_lan_macs.len(), 1);
        assert_eq!(config.credentials[0].key().unwrap(), Some(ItemKey::host("WG1", "SRV1")));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = DiscoverConfig::load("/nonexistent/smbtree-test-config").unwrap();
        assert_eq!(config.command_timeout_secs, 30);
    }

    #[test]
    fn test_share_entry_without_host_is_rejected() {
        let entry = CredentialEntry {
            workgroup: Some("WG".into()),
            host: None,
            share: Some("DATA".into()),
            login: "bob".into(),
            password: String::new(),
        };
        assert!(matches!(entry.key(), Err(DiscoverError::Config(_))));
        assert!(!format!("{entry:?}").contains("password"));
    }

    #[tokio::test]
    async fn test_credential_provider_from_entries() {
        let config = DiscoverConfig {
            credentials: vec![CredentialEntry {
                workgroup: Some("WG1".into()),
                host: Some("SRV1".into()),
                share: None,
                login: "bob".into(),
                password: "secret".into(),
            }],
            ..Default::default()
        };
        let provider = config.credential_provider().unwrap();
        let share = NetworkItem::Share(Share::new("wg1", "srv1", "data"));
        let creds = provider.read_credentials(&share).await.unwrap();
        assert_eq!(creds.login.as_deref(), Some("bob"));
    }
}
