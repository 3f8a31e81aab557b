//! Job scheduling and the composite network controller.
//!
//! The controller owns every in-flight job. Lookups are fire and forget:
//! they emit `AboutToStart`, register the job and return its id. Jobs report
//! back on a channel drained by a single completion loop, which reconciles
//! results into the model under its write lock, emits the change and
//! `Finished` events, then deregisters the job. Access-denied failures are
//! handed to the retry coordinator on a separate task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};

use smbtree_core::{
    BrowseEvent, BrowseSettings, ErrorCategory, EventPayload, FileItem, Host, ItemKey,
    NetworkError, NetworkItem, NetworkModel, Notification, ProcessKind, SettingsProvider, Share,
    SharedModel, Workgroup,
};

use crate::auth::{RetryCoordinator, RetryPlan, RetryState};
use crate::credentials::{CredentialProvider, InMemoryCredentialProvider};
use crate::enumerator::DirectoryEnumerator;
use crate::error::{DiscoverError, Result};
use crate::job::{
    Job, JobAction, JobCompletion, JobContext, JobHandle, JobId, JobOutcome,
    JobResult,
};
use crate::notify::{NotificationSink, TracingNotifier};
use crate::reconcile::Reconciler;

const DEFAULT_EVENT_CAPACITY: usize = 256;

pub struct ControllerBuilder {
    enumerator: Arc<dyn DirectoryEnumerator>,
    credentials: Arc<dyn CredentialProvider>,
    notifier: Arc<dyn NotificationSink>,
    settings: Arc<dyn SettingsProvider>,
    model: SharedModel,
    event_capacity: usize,
}

impl ControllerBuilder {
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_model(mut self, model: SharedModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the controller and spawn its completion loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> NetworkController {
        let (completions, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.event_capacity);
        let (busy, _) = watch::channel(0usize);

        let inner = Arc::new(Inner {
            enumerator: self.enumerator,
            credentials: self.credentials.clone(),
            settings: self.settings.clone(),
            notifier: self.notifier.clone(),
            model: self.model,
            reconciler: Reconciler::new(self.settings),
            retry: Arc::new(RetryCoordinator::new(self.credentials, self.notifier)),
            jobs: Mutex::new(HashMap::new()),
            busy,
            generation: AtomicU64::new(0),
            events,
            completions,
        });

        tokio::spawn(completion_loop(Arc::downgrade(&inner), rx));
        NetworkController { inner }
    }
}

struct Inner {
    enumerator: Arc<dyn DirectoryEnumerator>,
    credentials: Arc<dyn CredentialProvider>,
    settings: Arc<dyn SettingsProvider>,
    notifier: Arc<dyn NotificationSink>,
    model: SharedModel,
    reconciler: Reconciler,
    retry: Arc<RetryCoordinator>,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
    /// In-flight jobs plus retries waiting on a credential prompt.
    busy: watch::Sender<usize>,
    /// Bumped by `abort`; retries prepared before an abort are dropped.
    generation: AtomicU64,
    events: broadcast::Sender<BrowseEvent>,
    completions: mpsc::UnboundedSender<JobCompletion>,
}

/// Entry point for browsing. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct NetworkController {
    inner: Arc<Inner>,
}

impl NetworkController {
    pub fn builder(enumerator: Arc<dyn DirectoryEnumerator>) -> ControllerBuilder {
        ControllerBuilder {
            enumerator,
            credentials: Arc::new(InMemoryCredentialProvider::new()),
            notifier: Arc::new(TracingNotifier),
            settings: Arc::new(BrowseSettings::default()),
            model: SharedModel::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    // ── Lookups ───────────────────────────────────────────────────

    /// Look up the workgroups and domains of the network neighborhood.
    ///
    /// With wake-on-LAN enabled the magic packets go out first and the
    /// domain lookup starts once the configured wait has passed.
    pub fn lookup_domains(&self) -> JobId {
        let settings = self.inner.settings.settings();
        if settings.enable_wake_on_lan && !settings.wake_on_lan_macs.is_empty() {
            let job = Job::wake_up(
                settings.wake_on_lan_macs.clone(),
                settings.wake_on_lan_wait(),
            );
            return self.submit(job, settings);
        }
        self.submit_lookup(NetworkItem::Network)
    }

    pub fn lookup_domain_members(&self, workgroup: &Workgroup) -> JobId {
        self.submit_lookup(NetworkItem::Workgroup(workgroup.clone()))
    }

    pub fn lookup_shares(&self, host: &Host) -> JobId {
        self.submit_lookup(NetworkItem::Host(host.clone()))
    }

    /// List a share or directory. Plain files fail with `NotADirectory`.
    pub fn lookup_files(&self, item: &NetworkItem) -> Result<JobId> {
        match item {
            NetworkItem::Share(_) | NetworkItem::File(_) => self.lookup(item),
            _ => Err(NetworkError::InvalidAddress.into()),
        }
    }

    /// Look up the children of any item.
    pub fn lookup(&self, item: &NetworkItem) -> Result<JobId> {
        if matches!(item, NetworkItem::Network) {
            return Ok(self.lookup_domains());
        }
        let job = Job::lookup(item.clone())?;
        Ok(self.submit(job, self.inner.settings.settings()))
    }

    /// Send `file` to a printer share.
    pub fn print_file(&self, share: &Share, file: impl Into<PathBuf>, copies: u32) -> Result<JobId> {
        if !share.is_printer() {
            return Err(NetworkError::InvalidAddress.into());
        }
        let job = Job::print(share.clone(), file.into(), copies);
        Ok(self.submit(job, self.inner.settings.settings()))
    }

    fn submit_lookup(&self, item: NetworkItem) -> JobId {
        let settings = self.inner.settings.settings();
        match Job::lookup(item) {
            Ok(job) => self.submit(job, settings),
            // Only plain files have no lookup and they never reach here.
            Err(e) => {
                tracing::error!(error = %e, "Lookup rejected");
                JobId::new()
            }
        }
    }

    fn submit(&self, job: Job, settings: BrowseSettings) -> JobId {
        let id = job.id;
        self.emit(EventPayload::AboutToStart {
            scope: job.target.key(),
            process: job.process,
        });

        let ctx = JobContext {
            enumerator: self.inner.enumerator.clone(),
            credentials: self.inner.credentials.clone(),
            settings,
        };

        // Hold the registry lock across start so the completion loop
        // cannot deregister the job before it is registered.
        let mut jobs = self.inner.jobs.lock();
        self.inner.busy.send_modify(|n| *n += 1);
        let handle = job.start(ctx, self.inner.completions.clone());
        jobs.insert(id, handle);
        id
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        !self.inner.jobs.lock().is_empty()
    }

    /// Scope and process of every in-flight job.
    pub fn running_jobs(&self) -> Vec<(JobId, ItemKey, ProcessKind)> {
        self.inner
            .jobs
            .lock()
            .values()
            .map(|h| (h.id, h.scope.clone(), h.process))
            .collect()
    }

    /// Cancel every in-flight job. Each still reports a completion.
    pub fn abort(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let jobs = self.inner.jobs.lock();
        let mut cancelled = 0;
        for handle in jobs.values().filter(|h| !h.is_cancelled()) {
            handle.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "Aborted running jobs");
        }
    }

    /// Resolve once no job is in flight and no retry is pending.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.busy.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Refresh the shares of every known host, wait for the lookups and
    /// return the shares whose name contains `term`, ignoring case.
    pub async fn search(&self, term: &str) -> Vec<Share> {
        let hosts: Vec<Host> = self
            .inner
            .model
            .read()
            .all_hosts()
            .into_iter()
            .cloned()
            .collect();
        tracing::info!(term = %term, hosts = hosts.len(), "Searching shares");

        for host in &hosts {
            self.lookup_shares(host);
        }
        self.wait_until_idle().await;

        let needle = term.to_uppercase();
        self.inner
            .model
            .read()
            .all_shares()
            .into_iter()
            .filter(|s| s.name.to_uppercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrowseEvent> {
        self.inner.events.subscribe()
    }

    pub fn retry_state(&self, key: &ItemKey) -> RetryState {
        self.inner.retry.state(key)
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn model(&self) -> SharedModel {
        self.inner.model.clone()
    }

    /// Attach a directly addressed item and its missing ancestors, so it can
    /// be looked up without browsing down to it first.
    pub fn seed(&self, item: NetworkItem) -> usize {
        let mut model = self.inner.model.write();
        self.inner.reconciler.seed(&mut model, item)
    }

    pub fn snapshot(&self) -> NetworkModel {
        self.inner.model.snapshot()
    }

    pub fn workgroups(&self) -> Vec<Workgroup> {
        self.inner
            .model
            .read()
            .workgroups()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn hosts(&self, workgroup: &str) -> Vec<Host> {
        self.inner
            .model
            .read()
            .hosts(workgroup)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn shares(&self, workgroup: &str, host: &str) -> Vec<Share> {
        self.inner
            .model
            .read()
            .shares(workgroup, host)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn files(&self, parent: &ItemKey) -> Vec<FileItem> {
        self.inner
            .model
            .read()
            .files(parent)
            .into_iter()
            .cloned()
            .collect()
    }

    // ── Completion handling ───────────────────────────────────────

    fn emit(&self, payload: EventPayload) {
        // No subscribers is fine.
        let _ = self.inner.events.send(BrowseEvent::new(payload));
    }

    fn handle_completion(&self, completion: JobCompletion) {
        let JobCompletion {
            id,
            target,
            process,
            attempt,
            retry_of,
            follow_up,
            action,
            outcome,
        } = completion;
        let scope = target.key();
        let episode = retry_of.unwrap_or_else(|| scope.clone());

        match outcome {
            JobOutcome::Completed(JobResult::Items(items)) => {
                self.reconcile(id, &target, process, items);
                if attempt > 0 {
                    match follow_up {
                        Some(item) => self.resubmit_follow_up(item, episode),
                        None => self.inner.retry.resolve(&episode),
                    }
                }
            }
            JobOutcome::Completed(JobResult::Printed) => {
                tracing::info!(job_id = %id, printer = %scope, "Print job sent");
                if attempt > 0 {
                    self.inner.retry.resolve(&episode);
                }
            }
            JobOutcome::Completed(JobResult::WokeUp) => {
                if self.was_aborted(id) {
                    tracing::info!(job_id = %id, "Aborted after wake-up, skipping domain lookup");
                } else {
                    self.submit_lookup(NetworkItem::Network);
                }
            }
            JobOutcome::Failed(error) => {
                self.handle_failure(id, target, action, attempt, episode, error);
            }
            JobOutcome::Cancelled => {
                tracing::info!(job_id = %id, scope = %scope, process = %process, "Job cancelled");
                if attempt > 0 {
                    self.inner.retry.give_up(&episode, None);
                }
            }
        }

        self.emit(EventPayload::Finished {
            scope,
            process,
        });
        self.inner.jobs.lock().remove(&id);
        self.inner.busy.send_modify(|n| *n = n.saturating_sub(1));
    }

    fn reconcile(&self, id: JobId, target: &NetworkItem, process: ProcessKind, items: Vec<NetworkItem>) {
        let applied = {
            let mut model = self.inner.model.write();
            self.inner.reconciler.apply(&mut model, target, items)
        };

        match applied {
            Some((summary, payload)) => {
                tracing::info!(
                    job_id = %id,
                    scope = %target.key(),
                    process = %process,
                    added = summary.added,
                    updated = summary.updated,
                    removed = summary.removed,
                    "Reconciled job result"
                );
                self.emit(payload);
            }
            None => {
                tracing::info!(
                    job_id = %id,
                    scope = %target.key(),
                    "Discarding result for a scope no longer in the model"
                );
            }
        }
    }

    fn resubmit_follow_up(&self, item: NetworkItem, episode: ItemKey) {
        match Job::lookup(item) {
            Ok(job) => {
                let job = job.as_retry(episode, None);
                self.submit(job, self.inner.settings.settings());
            }
            Err(e) => self.inner.retry.give_up(&episode, Some(e.to_string())),
        }
    }

    /// Whether `abort` reached this job before its completion was handled.
    fn was_aborted(&self, id: JobId) -> bool {
        self.inner
            .jobs
            .lock()
            .get(&id)
            .is_some_and(JobHandle::is_cancelled)
    }

    fn handle_failure(
        &self,
        id: JobId,
        target: NetworkItem,
        action: JobAction,
        attempt: u8,
        episode: ItemKey,
        error: DiscoverError,
    ) {
        let scope = target.key();
        tracing::warn!(
            job_id = %id,
            scope = %scope,
            action = ?action,
            attempt,
            error = %error,
            "Job failed"
        );

        if error.is_access_denied() {
            match (&target, attempt) {
                // The network root has no login to prompt for.
                (NetworkItem::Network, _) => self.notify_failure(&scope, &error),
                (_, 0) => self.spawn_retry(target, action),
                _ => self.inner.retry.give_up(&episode, Some(error.to_string())),
            }
            return;
        }

        if attempt > 0 {
            self.inner.retry.give_up(&episode, None);
        }
        if matches!(action, JobAction::WakeUp { .. }) {
            // Waking is best effort; browse anyway.
            self.notify_failure(&scope, &error);
            if !self.was_aborted(id) {
                self.submit_lookup(NetworkItem::Network);
            }
            return;
        }
        self.notify_failure(&scope, &error);

        let clears = error
            .network()
            .map_or(true, |e| e.category() != ErrorCategory::Permission);
        if clears {
            self.clear_failed_scope(&target);
        }
    }

    fn notify_failure(&self, scope: &ItemKey, error: &DiscoverError) {
        let notification = match error {
            DiscoverError::CommandNotFound { command } => Notification::CommandNotFound {
                command: command.clone(),
            },
            DiscoverError::UnsupportedMimetype { mimetype } => Notification::MimetypeUnsupported {
                mimetype: mimetype.clone(),
            },
            other => Notification::CommunicationFailed {
                scope: scope.clone(),
                details: other.to_string(),
            },
        };
        self.inner.notifier.notify(notification);
    }

    /// A failed domain lookup forgets every domain; a failed workgroup or
    /// host lookup forgets only that scope's children.
    fn clear_failed_scope(&self, target: &NetworkItem) {
        let scope = target.key();
        let payload = match target {
            NetworkItem::Network => EventPayload::WorkgroupsChanged,
            NetworkItem::Workgroup(_) => EventPayload::HostsChanged {
                workgroup: scope.clone(),
            },
            NetworkItem::Host(_) => EventPayload::SharesChanged { host: scope.clone() },
            NetworkItem::Share(_) | NetworkItem::File(_) => return,
        };

        let removed = {
            let mut model = self.inner.model.write();
            self.inner.reconciler.clear_scope(&mut model, &scope)
        };
        if removed > 0 {
            tracing::info!(scope = %scope, removed, "Cleared children of failed scope");
            self.emit(payload);
        }
    }

    fn spawn_retry(&self, target: NetworkItem, action: JobAction) {
        // Counted as busy until the retry job is registered or abandoned.
        self.inner.busy.send_modify(|n| *n += 1);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let controller = self.clone();

        tokio::spawn(async move {
            let key = target.key();
            let retry = controller.inner.retry.clone();
            if let Some(plan) = retry.on_access_denied(&target).await {
                if controller.inner.generation.load(Ordering::SeqCst) != generation {
                    tracing::info!(item = %key, "Retry dropped after abort");
                    retry.give_up(&key, None);
                } else {
                    match retry_job(action, plan, key.clone()) {
                        Ok(job) => {
                            controller.submit(job, controller.inner.settings.settings());
                        }
                        Err(e) => retry.give_up(&key, Some(e.to_string())),
                    }
                }
            }
            controller.inner.busy.send_modify(|n| *n = n.saturating_sub(1));
        });
    }
}

/// Redo the refused work with the prompted credentials: the same print for a
/// print job, a lookup of the plan's target otherwise.
fn retry_job(action: JobAction, plan: RetryPlan, original: ItemKey) -> Result<Job> {
    let job = match action {
        JobAction::Print { file, copies } => match plan.target {
            NetworkItem::Share(share) => Job::print(share, file, copies),
            _ => return Err(NetworkError::InvalidAddress.into()),
        },
        JobAction::Lookup | JobAction::WakeUp { .. } => Job::lookup(plan.target)?,
    };
    Ok(job
        .with_credentials(plan.credentials)
        .as_retry(original, plan.follow_up))
}

async fn completion_loop(inner: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<JobCompletion>) {
    while let Some(completion) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        NetworkController { inner }.handle_completion(completion);
    }
    tracing::debug!("Completion loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::enumerator::{EnumerationRequest, Entry, PrintRequest};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl DirectoryEnumerator for Counter {
        async fn enumerate(&self, _request: &EnumerationRequest) -> Result<Vec<Entry>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn resolve_address(&self, _name: &str) -> Option<std::net::IpAddr> {
            None
        }

        async fn print(&self, _request: &PrintRequest) -> Result<()> {
            Ok(())
        }
    }

    /// Register a wake-up job by hand and return the completion it would send.
    fn registered_wake_up(controller: &NetworkController, outcome: JobOutcome) -> JobCompletion {
        let job = Job::wake_up(Vec::new(), Duration::ZERO);
        controller.inner.jobs.lock().insert(job.id, job.handle());
        controller.inner.busy.send_modify(|n| *n += 1);
        JobCompletion {
            id: job.id,
            target: job.target,
            process: job.process,
            attempt: 0,
            retry_of: None,
            follow_up: None,
            action: job.action,
            outcome,
        }
    }

    #[tokio::test]
    async fn test_wake_up_completion_starts_domain_lookup() {
        let counter = Arc::new(Counter::default());
        let controller = NetworkController::builder(counter.clone()).spawn();
        let completion =
            registered_wake_up(&controller, JobOutcome::Completed(JobResult::WokeUp));

        controller.handle_completion(completion);
        assert!(controller.is_running());
        controller.wait_until_idle().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wake_up_completion_after_abort_does_not_browse() {
        let counter = Arc::new(Counter::default());
        let controller = NetworkController::builder(counter.clone()).spawn();

        for outcome in [
            JobOutcome::Completed(JobResult::WokeUp),
            JobOutcome::Failed(std::io::Error::other("no broadcast route").into()),
        ] {
            let completion = registered_wake_up(&controller, outcome);
            controller.abort();
            controller.handle_completion(completion);
            assert!(!controller.is_running());
        }

        controller.wait_until_idle().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
