//! Authentication retry after an access-denied failure.
//!
//! Each refused item opens an episode:
//! `Failed → CredentialRequested → Retrying → Resolved | GivenUp`.
//! The coordinator prompts once through the credential provider and hands
//! back a plan for a single retry. The controller reports how the retry
//! ended; a failed retry surfaces one communication-failed notification
//! instead of prompting again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use smbtree_core::{Credentials, ItemKey, NetworkItem, Notification};

use crate::credentials::CredentialProvider;
use crate::notify::NotificationSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    Idle,
    Failed,
    CredentialRequested,
    Retrying,
    Resolved,
    GivenUp,
}

impl RetryState {
    fn in_progress(self) -> bool {
        matches!(self, Self::Failed | Self::CredentialRequested | Self::Retrying)
    }
}

/// The single retry the controller should submit.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    /// Item to look up again, with the new credentials attached.
    pub target: NetworkItem,
    /// For file and directory failures: the original item, to resubmit with
    /// the same credentials once the share-level retry succeeded.
    pub follow_up: Option<NetworkItem>,
    /// The prompted login. Workgroup items cannot carry it themselves.
    pub credentials: Credentials,
}

pub struct RetryCoordinator {
    credentials: Arc<dyn CredentialProvider>,
    notifier: Arc<dyn NotificationSink>,
    episodes: Mutex<HashMap<ItemKey, RetryState>>,
}

impl RetryCoordinator {
    pub fn new(credentials: Arc<dyn CredentialProvider>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            credentials,
            notifier,
            episodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, key: &ItemKey) -> RetryState {
        self.episodes
            .lock()
            .get(key)
            .copied()
            .unwrap_or(RetryState::Idle)
    }

    fn transition(&self, key: &ItemKey, state: RetryState) {
        tracing::debug!(item = %key, state = ?state, "Retry state changed");
        self.episodes.lock().insert(key.clone(), state);
    }

    /// Handle a first access-denied failure on `target`.
    ///
    /// Returns `None` when no retry should happen: the network root cannot
    /// be retried, the user declined the prompt, or an episode for the same
    /// item is already under way.
    pub async fn on_access_denied(&self, target: &NetworkItem) -> Option<RetryPlan> {
        let key = target.key();
        {
            let mut episodes = self.episodes.lock();
            if episodes.get(&key).is_some_and(|s| s.in_progress()) {
                tracing::debug!(item = %key, "Retry already in progress");
                return None;
            }
            episodes.insert(key.clone(), RetryState::Failed);
        }
        tracing::info!(item = %target.address(), "Access denied, requesting credentials");

        if matches!(target, NetworkItem::Network) {
            self.give_up(&key, Some("access denied".to_string()));
            return None;
        }

        // Files and directories authenticate against their share.
        let mut prompt_item = match target {
            NetworkItem::File(file) => NetworkItem::Share(file.share_item()),
            other => other.clone(),
        };

        self.transition(&key, RetryState::CredentialRequested);
        if !self.credentials.prompt_and_store(&prompt_item).await {
            tracing::info!(item = %key, "Credential prompt declined");
            self.give_up(&key, None);
            return None;
        }

        let credentials = self
            .credentials
            .read_credentials(&prompt_item)
            .await
            .unwrap_or_default();
        prompt_item.set_credentials(credentials.clone());

        let follow_up = match target {
            NetworkItem::File(_) => {
                let mut original = target.clone();
                original.set_credentials(credentials.clone());
                Some(original)
            }
            _ => None,
        };

        self.transition(&key, RetryState::Retrying);
        Some(RetryPlan {
            target: prompt_item,
            follow_up,
            credentials,
        })
    }

    pub fn resolve(&self, key: &ItemKey) {
        self.transition(key, RetryState::Resolved);
    }

    /// End the episode for `key`. With `details`, the user is told the
    /// network communication failed; without, the episode ends silently.
    pub fn give_up(&self, key: &ItemKey, details: Option<String>) {
        let previous = self.state(key);
        self.transition(key, RetryState::GivenUp);
        if previous == RetryState::GivenUp {
            return;
        }
        if let Some(details) = details {
            self.notifier.notify(Notification::CommunicationFailed {
                scope: key.clone(),
                details,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smbtree_core::{FileItem, Share, Workgroup};

    use crate::credentials::InMemoryCredentialProvider;

    #[derive(Default)]
    struct Notes(Mutex<Vec<Notification>>);

    impl NotificationSink for Notes {
        fn notify(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    /// Stores `bob` for whatever item it is asked about.
    #[derive(Default)]
    struct AcceptingPrompt {
        inner: InMemoryCredentialProvider,
        prompted: Mutex<Vec<ItemKey>>,
    }

    #[async_trait]
    impl CredentialProvider for AcceptingPrompt {
        async fn read_credentials(&self, item: &NetworkItem) -> Option<Credentials> {
            self.inner.read_credentials(item).await
        }

        async fn prompt_and_store(&self, item: &NetworkItem) -> bool {
            self.prompted.lock().push(item.key());
            self.inner.store(item.key(), Credentials::new("bob", "secret"));
            true
        }
    }

    fn coordinator(provider: Arc<dyn CredentialProvider>) -> (RetryCoordinator, Arc<Notes>) {
        let notes = Arc::new(Notes::default());
        (RetryCoordinator::new(provider, notes.clone()), notes)
    }

    #[tokio::test]
    async fn test_share_retry_carries_credentials() {
        let (coord, notes) = coordinator(Arc::new(AcceptingPrompt::default()));
        let share = NetworkItem::Share(Share::new("WG", "SRV1", "DATA"));

        let plan = coord.on_access_denied(&share).await.unwrap();
        assert_eq!(plan.target.key(), share.key());
        assert_eq!(
            plan.target.credentials().unwrap().login.as_deref(),
            Some("bob")
        );
        assert!(plan.follow_up.is_none());
        assert_eq!(coord.state(&share.key()), RetryState::Retrying);

        coord.resolve(&share.key());
        assert_eq!(coord.state(&share.key()), RetryState::Resolved);
        assert!(notes.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_workgroup_plan_carries_prompted_login() {
        let (coord, _) = coordinator(Arc::new(AcceptingPrompt::default()));
        let workgroup = NetworkItem::Workgroup(Workgroup::new("WG1"));

        let plan = coord.on_access_denied(&workgroup).await.unwrap();
        assert_eq!(plan.target.key(), workgroup.key());
        assert!(plan.target.credentials().is_none());
        assert_eq!(plan.credentials.login.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_directory_retry_goes_through_share() {
        let provider = Arc::new(AcceptingPrompt::default());
        let (coord, _) = coordinator(provider.clone());
        let dir = NetworkItem::File(FileItem {
            workgroup: "WG".into(),
            host: "SRV1".into(),
            share: "DATA".into(),
            path: "docs".into(),
            is_directory: true,
            host_ip: None,
            credentials: Credentials::default(),
        });

        let plan = coord.on_access_denied(&dir).await.unwrap();
        assert_eq!(plan.target.key(), ItemKey::share("WG", "SRV1", "DATA"));
        assert_eq!(provider.prompted.lock().clone(), vec![plan.target.key()]);

        let follow_up = plan.follow_up.unwrap();
        assert_eq!(follow_up.key(), dir.key());
        assert_eq!(follow_up.credentials().unwrap().login.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_declined_prompt_gives_up_silently() {
        let (coord, notes) = coordinator(Arc::new(InMemoryCredentialProvider::new()));
        let share = NetworkItem::Share(Share::new("WG", "SRV1", "DATA"));

        assert!(coord.on_access_denied(&share).await.is_none());
        assert_eq!(coord.state(&share.key()), RetryState::GivenUp);
        assert!(notes.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_network_root_is_not_retried() {
        let (coord, notes) = coordinator(Arc::new(AcceptingPrompt::default()));
        assert!(coord.on_access_denied(&NetworkItem::Network).await.is_none());
        assert_eq!(coord.state(&ItemKey::Network), RetryState::GivenUp);
        assert_eq!(notes.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_retry_notifies_once() {
        let (coord, notes) = coordinator(Arc::new(AcceptingPrompt::default()));
        let share = NetworkItem::Share(Share::new("WG", "SRV1", "DATA"));
        coord.on_access_denied(&share).await.unwrap();

        // A concurrent failure for the same item does not prompt twice.
        assert!(coord.on_access_denied(&share).await.is_none());

        coord.give_up(&share.key(), Some("Access denied".into()));
        coord.give_up(&share.key(), Some("Access denied".into()));
        assert_eq!(notes.0.lock().len(), 1);
        assert!(matches!(
            notes.0.lock()[0],
            Notification::CommunicationFailed { .. }
        ));
    }
}
