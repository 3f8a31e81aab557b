//! Credential provider seam.
//!
//! Storage of logins and passwords belongs to the embedding application
//! (keyring, wallet, config file). The engine reads credentials right before
//! it uses them and asks the provider to prompt when a server refuses access.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use smbtree_core::{Credentials, ItemKey, NetworkItem};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Stored credentials for `item`, if any.
    async fn read_credentials(&self, item: &NetworkItem) -> Option<Credentials>;

    /// Ask the user for credentials for `item` and persist them.
    ///
    /// Returns `false` when the user cancels or no prompt is possible.
    async fn prompt_and_store(&self, item: &NetworkItem) -> bool;
}

/// Credentials held in memory, looked up from the most specific key up
/// through its parents, then a default login.
///
/// It cannot prompt; `prompt_and_store` always declines.
#[derive(Debug, Default)]
pub struct InMemoryCredentialProvider {
    entries: RwLock<HashMap<ItemKey, Credentials>>,
    default: RwLock<Option<Credentials>>,
}

impl InMemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: ItemKey, credentials: Credentials) -> Self {
        self.store(key, credentials);
        self
    }

    pub fn with_default(self, credentials: Credentials) -> Self {
        *self.default.write() = Some(credentials);
        self
    }

    pub fn store(&self, key: ItemKey, credentials: Credentials) {
        self.entries.write().insert(key, credentials);
    }

    fn lookup(&self, key: &ItemKey) -> Option<Credentials> {
        let entries = self.entries.read();
        let mut current = Some(key.clone());
        while let Some(key) = current {
            if let Some(found) = entries.get(&key) {
                return Some(found.clone());
            }
            current = key.parent();
        }
        self.default.read().clone()
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialProvider {
    async fn read_credentials(&self, item: &NetworkItem) -> Option<Credentials> {
        self.lookup(&item.key())
    }

    async fn prompt_and_store(&self, item: &NetworkItem) -> bool {
        tracing::debug!(item = %item.key(), "No interactive prompt available");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smbtree_core::{Host, Share};

    #[tokio::test]
    async fn test_lookup_walks_up_to_host() {
        let provider = InMemoryCredentialProvider::new()
            .with_entry(ItemKey::host("WG", "SRV"), Credentials::new("bob", "pw"));

        let share = NetworkItem::Share(Share::new("wg", "srv", "data"));
        let creds = provider.read_credentials(&share).await.unwrap();
        assert_eq!(creds.login.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_specific_entry_wins_and_default_fallback() {
        let provider = InMemoryCredentialProvider::new()
            .with_entry(ItemKey::host("WG", "SRV"), Credentials::new("bob", "pw"))
            .with_entry(
                ItemKey::share("WG", "SRV", "DATA"),
                Credentials::new("alice", "pw2"),
            )
            .with_default(Credentials::new("guest", ""));

        let share = NetworkItem::Share(Share::new("WG", "SRV", "DATA"));
        let other = NetworkItem::Host(Host::new("WG", "OTHER"));
        assert_eq!(
            provider.read_credentials(&share).await.unwrap().login.as_deref(),
            Some("alice")
        );
        assert_eq!(
            provider.read_credentials(&other).await.unwrap().login.as_deref(),
            Some("guest")
        );
        assert!(!provider.prompt_and_store(&other).await);
    }
}
